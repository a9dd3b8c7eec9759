use crate::orchestrator::{Orchestrator, SwapRequest};
use anyhow::Result;
use async_std::task;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use facecrab::{AssetRegistry, AssetStore, FACE_SWAP_ASSET};
use futures::FutureExt;
use image::RgbImage;
use log::{debug, info, warn};
use rusty_swap_core::protocol::{
    DownloadParams, DownloadResponse, ErrorResponse, HealthResponse, Operation, ResponseEnvelope,
    Status, SwapParams, SwapResponse, VersionResponse,
};
use rusty_swap_core::{DownloadError, WorkerError};
use rusty_swap_cortex::{create_pool, ResourcePool};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Wire protocol revision reported by `version`.
pub const API_VERSION: &str = "1";

/// Longest locator echoed back in error messages.
const MAX_ECHOED_URL: usize = 96;

/// Entry point for every request the worker handles. Owns the long-lived
/// state (asset store, resource pool) shared by all requests.
pub struct Dispatcher {
    registry: AssetRegistry,
    store: AssetStore,
    pool: Arc<ResourcePool>,
    orchestrator: Orchestrator,
    started: Instant,
}

impl Dispatcher {
    pub fn new(registry: AssetRegistry, store: AssetStore, pool: Arc<ResourcePool>) -> Self {
        Self {
            registry,
            store,
            orchestrator: Orchestrator::new(pool.clone()),
            pool,
            started: Instant::now(),
        }
    }

    /// HTTP store and the built-in backend, both configured from `registry`.
    pub fn from_registry(registry: AssetRegistry) -> Result<Self> {
        let store = AssetStore::from_registry(&registry)?;
        Ok(Self::with_store(registry, store))
    }

    /// Built-in backend over a caller-supplied store.
    pub fn with_store(registry: AssetRegistry, store: AssetStore) -> Self {
        let swap_model = registry
            .asset_path(FACE_SWAP_ASSET)
            .unwrap_or_else(|| registry.model_dir().join("inswapper_128.onnx"));
        let pool = Arc::new(create_pool(swap_model));
        Self::new(registry, store, pool)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_registry(AssetRegistry::from_env()?)
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    /// Constructs every resource whose inputs are already on disk so the first
    /// request does not pay for it. Failures are logged and retried on demand.
    pub async fn warm_up(&self) {
        if let Err(e) = self.pool.acquire_analyzer().await {
            warn!("face analysis not ready: {}", e);
        }
        if let Err(e) = self.pool.acquire_swapper().await {
            warn!("face swap not ready: {}", e);
        }
    }

    /// Handles one request envelope. Never fails and never panics: every
    /// problem, including a panic inside a handler, comes back as an error
    /// response and the worker keeps serving.
    pub async fn dispatch(&self, envelope: &Value) -> ResponseEnvelope {
        match AssertUnwindSafe(self.route(envelope)).catch_unwind().await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("Request failed ({}): {}", e.kind(), e);
                ResponseEnvelope::Error(ErrorResponse::from(&e))
            }
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                warn!("Handler panicked: {}", msg);
                ResponseEnvelope::Error(ErrorResponse::new(
                    "internal",
                    format!("unexpected failure: {}", msg),
                ))
            }
        }
    }

    async fn route(&self, envelope: &Value) -> Result<ResponseEnvelope, WorkerError> {
        let op = Operation::from_envelope(envelope)?;
        debug!("Dispatching '{}'", op.name());

        match op {
            Operation::Health => Ok(ResponseEnvelope::Health(self.health())),
            Operation::Version => Ok(ResponseEnvelope::Version(self.version())),
            Operation::DownloadModels(params) => {
                Ok(ResponseEnvelope::Download(self.download_models(params).await))
            }
            Operation::Swap(params) => Ok(ResponseEnvelope::Swap(self.swap(params).await?)),
            Operation::Unknown(name) => Err(WorkerError::Dispatch(name)),
        }
    }

    fn health(&self) -> HealthResponse {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        HealthResponse {
            status: Status::Ok,
            uptime: self.started.elapsed().as_secs(),
            timestamp,
        }
    }

    fn version(&self) -> VersionResponse {
        let mut versions = BTreeMap::new();
        versions.insert("api".to_string(), API_VERSION.to_string());
        versions.insert("worker".to_string(), env!("CARGO_PKG_VERSION").to_string());
        versions.extend(self.pool.probe_all());
        VersionResponse {
            status: Status::Ok,
            versions,
        }
    }

    async fn download_models(&self, params: DownloadParams) -> DownloadResponse {
        let urls = if params.urls.is_empty() {
            self.registry.default_urls()
        } else {
            params.urls
        };
        let dest = self.registry.model_dir();
        info!("Fetching {} asset(s) into {:?}", urls.len(), dest);

        let outcome = self.store.fetch_all(&urls, dest, params.force).await;
        let status = outcome.status();
        let error = (status == Status::Error)
            .then(|| format!("all {} download(s) failed", outcome.errors.len()));

        DownloadResponse {
            status,
            dest: dest.to_string_lossy().to_string(),
            downloaded: outcome.downloaded,
            errors: outcome.errors,
            error,
        }
    }

    async fn swap(&self, params: SwapParams) -> Result<SwapResponse, WorkerError> {
        // Fail before touching the network when the model is not installed.
        self.pool.acquire_swapper().await?;

        let limit = self.registry.max_image_bytes();
        let (source, target) = futures::try_join!(
            self.load_image(&params.source_url, limit),
            self.load_image(&params.target_url, limit)
        )?;

        let result = self
            .orchestrator
            .swap(SwapRequest {
                source,
                target,
                source_face: params.source_face,
                target_face: params.target_face,
            })
            .await?;

        Ok(SwapResponse {
            status: Status::Ok,
            image_base64: STANDARD.encode(&result.image),
            source_face_index: result.source_face_index,
            target_face_index: result.target_face_index,
        })
    }

    async fn load_image(&self, url: &str, limit: u64) -> Result<RgbImage, WorkerError> {
        let label = shorten(url);
        let bytes = self
            .store
            .fetch_bytes(url, limit)
            .await
            .map_err(|e| WorkerError::download(label.clone(), e))?;

        task::spawn_blocking(move || image::load_from_memory(&bytes).map(|img| img.to_rgb8()))
            .await
            .map_err(|e| WorkerError::download(label, DownloadError::Decode(e.to_string())))
    }
}

fn shorten(url: &str) -> String {
    match url.char_indices().nth(MAX_ECHOED_URL) {
        Some((cut, _)) => format!("{}...", &url[..cut]),
        None => url.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_locators_are_shortened() {
        let data = format!("data:image/png;base64,{}", "A".repeat(500));
        let short = shorten(&data);
        assert!(short.ends_with("..."));
        assert_eq!(short.len(), MAX_ECHOED_URL + 3);
        assert_eq!(shorten("https://x/y.png"), "https://x/y.png");
    }

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert!(panic_message(boxed.as_ref()).contains("non-string"));
    }
}
