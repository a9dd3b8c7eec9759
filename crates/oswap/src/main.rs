//! # oswap
//! Warm face swap worker. `serve` keeps one dispatcher alive behind an HTTP
//! endpoint, `invoke` answers a single request envelope, and `download`
//! pre-fetches model assets into `MODEL_DIR`.

mod api;
mod progress;

use anyhow::{bail, Context, Result};
use api::ApiState;
use async_std::task;
use clap::{Parser, Subcommand};
use colored::*;
use facecrab::{AssetRegistry, AssetStore};
use futures::channel::mpsc;
use rusty_swap_core::protocol::{ResponseEnvelope, Status};
use rusty_swap_stem::Dispatcher;
use serde_json::{json, Value};
use std::io::Read;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve request envelopes over HTTP
    Serve {
        /// HTTP server address
        #[arg(long, default_value = "0.0.0.0:8000")]
        addr: String,
        /// Construct resources before accepting requests
        #[arg(long)]
        preload: bool,
    },
    /// Dispatch a single request envelope and print the response
    Invoke {
        /// Envelope JSON, e.g. '{"input":{"op":"health"}}'. Read from stdin when omitted
        #[arg(long)]
        input: Option<String>,
    },
    /// Download model assets into MODEL_DIR
    Download {
        /// Asset URLs (the built-in list when omitted)
        urls: Vec<String>,
        /// Download again even if the file is already present
        #[arg(long)]
        force: bool,
    },
}

#[async_std::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { addr, preload } => serve(addr, preload).await,
        Commands::Invoke { input } => invoke(input).await,
        Commands::Download { urls, force } => download(urls, force).await,
    }
}

async fn serve(addr: String, preload: bool) -> Result<()> {
    let dispatcher = Arc::new(Dispatcher::from_env()?);
    println!("🚀 Starting worker at {}", addr.cyan());
    println!(
        "📦 Models in {}",
        dispatcher.registry().model_dir().display().to_string().cyan()
    );

    if preload {
        println!("⏳ Warming up resources...");
        dispatcher.warm_up().await;
    }

    let mut app = tide::with_state(ApiState { dispatcher });
    app.at("/run").post(api::run);
    app.at("/health").get(api::health);

    app.listen(addr).await?;
    Ok(())
}

async fn invoke(input: Option<String>) -> Result<()> {
    let raw = match input {
        Some(raw) => raw,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read envelope from stdin")?;
            buf
        }
    };
    let envelope: Value = if raw.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(&raw).context("Envelope is not valid JSON")?
    };

    let dispatcher = Dispatcher::from_env()?;
    let response = dispatcher.dispatch(&envelope).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if response.status() == Status::Error {
        bail!("request failed");
    }
    Ok(())
}

async fn download(urls: Vec<String>, force: bool) -> Result<()> {
    let registry = AssetRegistry::from_env()?;
    let (events_tx, events_rx) = mpsc::unbounded();
    let store = AssetStore::from_registry(&registry)?.with_events(events_tx);
    let dispatcher = Dispatcher::with_store(registry, store);

    println!(
        "📥 Downloading into {}",
        dispatcher.registry().model_dir().display().to_string().cyan()
    );

    let envelope = json!({
        "input": { "op": "download_models", "model_url": urls, "force": force }
    });
    // The event stream ends when the dispatcher (and its store) is dropped.
    let worker = task::spawn(async move { dispatcher.dispatch(&envelope).await });
    progress::render(events_rx).await;
    let response = worker.await;

    match &response {
        ResponseEnvelope::Download(report) => {
            for asset in &report.downloaded {
                let verb = if asset.skipped { "Kept" } else { "Stored" };
                println!(
                    "✅ {} {} ({} bytes, sha256 {})",
                    verb,
                    asset.path.green(),
                    asset.size,
                    asset.sha256
                );
            }
            for failure in &report.errors {
                eprintln!("❌ {}: {}", failure.url, failure.error.red());
            }
        }
        ResponseEnvelope::Error(e) => eprintln!("❌ {}", e.error.red()),
        _ => {}
    }

    if response.status() == Status::Error {
        bail!("no assets were downloaded");
    }
    Ok(())
}
