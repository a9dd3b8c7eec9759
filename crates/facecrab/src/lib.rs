//! # Facecrab: The Supplier
//!
//! **Asset acquisition and local model storage for the rusty-swap worker.**
//!
//! Facecrab owns the flat model directory of a warm worker. It fetches large
//! binary assets (model weights, request images) over the network exactly once,
//! writes them atomically and reports a SHA-256 digest computed from what ended
//! up on disk.
//!
//! ## Core Features
//!
//! - **Idempotent fetches**: an asset already present is never transferred again
//!   unless `force` is set.
//! - **Atomic writes**: bodies stream into a unique `.part` sibling in 256 KiB chunks
//!   and are renamed into place only when complete. A failed transfer leaves nothing behind.
//! - **Batch downloads**: every locator is attempted independently and failures
//!   are reported per item.
//! - **Bounded network calls**: requests and body reads are both subject to a timeout.
//!
//! ## Usage
//!
//! ### 1. Fetching the default assets
//!
//! ```no_run
//! use facecrab::{AssetRegistry, AssetStore};
//!
//! #[async_std::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = AssetRegistry::from_env()?;
//!     let store = AssetStore::from_registry(&registry)?;
//!
//!     let outcome = store
//!         .fetch_all(&registry.default_urls(), registry.model_dir(), false)
//!         .await;
//!
//!     for asset in &outcome.downloaded {
//!         println!("{} -> {} ({})", asset.url, asset.path, asset.sha256);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### 2. Event-Based Download (Progress Tracking)
//!
//! ```no_run
//! use facecrab::{AssetRegistry, AssetStore};
//! use futures::channel::mpsc;
//! use futures::StreamExt;
//! use rusty_swap_core::protocol::AssetEvent;
//!
//! #[async_std::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = AssetRegistry::from_env()?;
//!     let (tx, mut events) = mpsc::unbounded();
//!     let store = AssetStore::from_registry(&registry)?.with_events(tx);
//!
//!     let urls = registry.default_urls();
//!     let dir = registry.model_dir().to_path_buf();
//!     async_std::task::spawn(async move {
//!         let _ = store.fetch_all(&urls, &dir, false).await;
//!     });
//!
//!     while let Some(event) = events.next().await {
//!         match event {
//!             AssetEvent::Started(url) => println!("Starting download: {}", url),
//!             AssetEvent::Progress(current, total) => print!("\r{}/{}", current, total),
//!             AssetEvent::Complete(path) => println!("\nStored at {}", path),
//!             AssetEvent::Error(err) => eprintln!("Error: {}", err),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

/// Fetching, verifying and atomically storing assets.
pub mod assets;

/// Model directory, timeouts and the built-in asset list.
pub mod registry;

/// Network transport behind the store.
pub mod transport;

pub use assets::{derive_filename, file_digest, AssetStore};
pub use registry::{AssetEntry, AssetRegistry, FACE_SWAP_ASSET};
pub use transport::{Fetcher, HttpFetcher, RemoteBody};
