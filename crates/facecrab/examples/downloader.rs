use facecrab::{AssetRegistry, AssetStore};
use futures::channel::mpsc;
use futures::StreamExt;
use rusty_swap_core::protocol::AssetEvent;
use std::error::Error;

#[async_std::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let registry = AssetRegistry::from_env()?;
    let urls: Vec<String> = match std::env::args().nth(1) {
        Some(url) => vec![url],
        None => registry.default_urls(),
    };

    println!("--- Mode 1: Simple One-Shot ---");
    let store = AssetStore::from_registry(&registry)?;
    let outcome = store.fetch_all(&urls, registry.model_dir(), false).await;
    for asset in &outcome.downloaded {
        println!(
            "{} ready at {} (sha256 {}, skipped: {})",
            asset.url, asset.path, asset.sha256, asset.skipped
        );
    }
    for failure in &outcome.errors {
        eprintln!("{} failed: {}", failure.url, failure.error);
    }

    println!("\n--- Mode 2: Event-Based Streaming (forced) ---");
    let (tx, mut events) = mpsc::unbounded();
    let store = AssetStore::from_registry(&registry)?.with_events(tx);
    let dir = registry.model_dir().to_path_buf();
    async_std::task::spawn(async move {
        let _ = store.fetch_all(&urls, &dir, true).await;
    });

    while let Some(event) = events.next().await {
        match event {
            AssetEvent::Started(url) => println!("Started download of: {}", url),
            AssetEvent::Progress(current, total) => {
                let pct = if total > 0 {
                    (current as f64 / total as f64) * 100.0
                } else {
                    0.0
                };
                print!("\rDownload Progress: {:.1}% ({}/{})", pct, current, total);
                let _ = std::io::Write::flush(&mut std::io::stdout());
            }
            AssetEvent::Complete(path) => println!("\nSuccessfully completed: {}", path),
            AssetEvent::Error(err) => eprintln!("\nAsset Error: {}", err),
        }
    }

    Ok(())
}
