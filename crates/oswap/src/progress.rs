use futures::channel::mpsc;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use rusty_swap_core::protocol::AssetEvent;
use std::time::Duration;

fn download_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Draws one bar per fetch until the store drops its event sender.
pub async fn render(mut events: mpsc::UnboundedReceiver<AssetEvent>) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = events.next().await {
        match event {
            AssetEvent::Started(url) => {
                let pb = spinner();
                pb.set_message(url);
                bar = Some(pb);
            }
            AssetEvent::Progress(current, total) => {
                if let Some(pb) = &bar {
                    // Switch from spinner to a byte bar once the size is known.
                    if total > 0 && pb.length() != Some(total) {
                        pb.set_style(download_bar_style());
                        pb.set_length(total);
                    }
                    pb.set_position(current);
                }
            }
            AssetEvent::Complete(path) => {
                if let Some(pb) = bar.take() {
                    pb.finish_with_message(path);
                }
            }
            AssetEvent::Error(e) => {
                if let Some(pb) = bar.take() {
                    pb.abandon_with_message(e);
                }
            }
        }
    }
}
