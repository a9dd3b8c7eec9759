use crate::registry::AssetRegistry;
use crate::transport::{Fetcher, HttpFetcher, RemoteBody};
use async_std::{fs, io, task};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::channel::mpsc;
use futures::{AsyncReadExt, AsyncWriteExt};
use log::{debug, info, warn};
use rusty_swap_core::manifest::{AssetDescriptor, DownloadFailure, DownloadOutcome};
use rusty_swap_core::protocol::AssetEvent;
use rusty_swap_core::DownloadError;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Read/write granularity for transfers and hashing.
pub const CHUNK_SIZE: usize = 256 * 1024;

static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Downloads assets into a flat directory, exactly once and atomically.
pub struct AssetStore {
    fetcher: Arc<dyn Fetcher>,
    idle_timeout: Duration,
    events: Option<mpsc::UnboundedSender<AssetEvent>>,
}

impl AssetStore {
    pub fn new(fetcher: Arc<dyn Fetcher>, idle_timeout: Duration) -> Self {
        Self {
            fetcher,
            idle_timeout,
            events: None,
        }
    }

    /// HTTP-backed store using the registry's timeout.
    pub fn from_registry(registry: &AssetRegistry) -> Result<Self, DownloadError> {
        let fetcher = HttpFetcher::new(registry.fetch_timeout())?;
        Ok(Self::new(Arc::new(fetcher), registry.fetch_timeout()))
    }

    /// Report per-fetch lifecycle events on `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<AssetEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn emit(&self, event: AssetEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.unbounded_send(event);
        }
    }

    /// Fetches `url` into `dest_dir`. An existing file is reused unless `force`.
    pub async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        force: bool,
    ) -> Result<AssetDescriptor, DownloadError> {
        fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(derive_filename(url));

        if !force && is_file(&dest).await {
            debug!("{} already present at {:?}, skipping transfer", url, dest);
            let (sha256, size) = file_digest(&dest).await?;
            return Ok(AssetDescriptor {
                url: url.to_string(),
                path: dest.to_string_lossy().to_string(),
                sha256,
                size,
                skipped: true,
            });
        }

        self.emit(AssetEvent::Started(url.to_string()));
        info!("Downloading {} to {:?}", url, dest);

        let tmp = part_path(&dest);
        if let Err(e) = self.transfer(url, &tmp, &dest).await {
            if let Err(rm) = fs::remove_file(&tmp).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!("could not remove partial file {:?}: {}", tmp, rm);
                }
            }
            self.emit(AssetEvent::Error(e.to_string()));
            return Err(e);
        }

        let (sha256, size) = file_digest(&dest).await?;
        info!("Stored {:?} ({} bytes, sha256 {})", dest, size, sha256);
        self.emit(AssetEvent::Complete(dest.to_string_lossy().to_string()));

        Ok(AssetDescriptor {
            url: url.to_string(),
            path: dest.to_string_lossy().to_string(),
            sha256,
            size,
            skipped: false,
        })
    }

    /// Streams the body into `tmp` and renames it onto `dest` once complete.
    async fn transfer(&self, url: &str, tmp: &Path, dest: &Path) -> Result<(), DownloadError> {
        let RemoteBody { mut reader, len } = self.fetcher.open(url).await?;
        let mut file = fs::File::create(tmp).await?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;

        loop {
            let n = io::timeout(self.idle_timeout, reader.read(&mut buf))
                .await
                .map_err(DownloadError::from_transfer)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            written += n as u64;
            self.emit(AssetEvent::Progress(written, len.unwrap_or(0)));
        }

        if let Some(expected) = len {
            if written != expected {
                return Err(DownloadError::Network(format!(
                    "body ended after {} of {} bytes",
                    written, expected
                )));
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(tmp, dest).await?;
        Ok(())
    }

    /// Fetches every locator independently; one failure never aborts the rest.
    pub async fn fetch_all(&self, urls: &[String], dest_dir: &Path, force: bool) -> DownloadOutcome {
        let mut outcome = DownloadOutcome::default();
        for url in urls {
            match self.fetch(url, dest_dir, force).await {
                Ok(descriptor) => outcome.downloaded.push(descriptor),
                Err(e) => {
                    warn!("Download of {} failed: {}", url, e);
                    outcome.errors.push(DownloadFailure {
                        url: url.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        outcome
    }

    /// Reads a small payload (a request image) into memory, refusing anything
    /// larger than `limit`. `data:<mime>;base64,` locators are decoded locally.
    pub async fn fetch_bytes(&self, url: &str, limit: u64) -> Result<Vec<u8>, DownloadError> {
        if let Some(payload) = url.strip_prefix("data:") {
            return decode_data_url(payload, limit);
        }

        let RemoteBody { mut reader, len } = self.fetcher.open(url).await?;
        if matches!(len, Some(n) if n > limit) {
            return Err(DownloadError::TooLarge { limit });
        }

        let mut bytes = Vec::with_capacity(len.unwrap_or(0) as usize);
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = io::timeout(self.idle_timeout, reader.read(&mut buf))
                .await
                .map_err(DownloadError::from_transfer)?;
            if n == 0 {
                break;
            }
            if (bytes.len() + n) as u64 > limit {
                return Err(DownloadError::TooLarge { limit });
            }
            bytes.extend_from_slice(&buf[..n]);
        }
        Ok(bytes)
    }
}

/// Local filename for a locator: last path segment without query or
/// fragment, or `model_<unix-seconds>` when there is none.
pub fn derive_filename(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let name = path.rsplit('/').next().unwrap_or_default().trim();

    if name.is_empty() || name == "." || name == ".." || name.contains('\\') {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        format!("model_{}", secs)
    } else {
        name.to_string()
    }
}

/// Unique sibling temp path, so concurrent fetches never share a partial file.
fn part_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let n = PART_COUNTER.fetch_add(1, Ordering::Relaxed);
    dest.with_file_name(format!(".{}.{}-{}.part", name, std::process::id(), n))
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// SHA-256 (lower-case hex) and byte size of a file, read from disk.
pub async fn file_digest(path: &Path) -> std::io::Result<(String, u64)> {
    let path = path.to_path_buf();
    task::spawn_blocking(move || -> std::io::Result<(String, u64)> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut size = 0u64;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        Ok((format!("{:x}", hasher.finalize()), size))
    })
    .await
}

fn decode_data_url(payload: &str, limit: u64) -> Result<Vec<u8>, DownloadError> {
    let (meta, data) = payload
        .split_once(',')
        .ok_or_else(|| DownloadError::Decode("data URL has no ',' separator".into()))?;
    if !meta.ends_with(";base64") {
        return Err(DownloadError::Decode(
            "only base64 data URLs are supported".into(),
        ));
    }
    // base64 inflates by 4/3; reject early before decoding.
    if (data.len() as u64) / 4 * 3 > limit + 3 {
        return Err(DownloadError::TooLarge { limit });
    }
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| DownloadError::Decode(e.to_string()))?;
    if bytes.len() as u64 > limit {
        return Err(DownloadError::TooLarge { limit });
    }
    Ok(bytes)
}
