//! Lazy, single-flight construction of shared inference resources.
//!
//! Each resource key owns a [`LazyResource`]: an async gate that admits one
//! constructor at a time plus a write-once cell holding the ready value. Once a
//! resource is ready it is handed out without touching the gate again. A failed
//! construction is recorded but not cached, so a later acquire retries (the
//! backing file may have been downloaded in the meantime).

use crate::{Capability, FaceAnalyzer, FaceSwapper, ResourceKey};
use async_std::sync::Mutex;
use futures::FutureExt;
use log::{info, warn};
use rusty_swap_core::ResourceError;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Instant;

/// Reported for capabilities whose probe fails.
pub const NOT_INSTALLED: &str = "not-installed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    Unconstructed,
    Constructing,
    Ready,
    Failed(String),
}

pub struct LazyResource<T: ?Sized + Send + Sync + 'static> {
    capability: Box<dyn Capability<Resource = T>>,
    gate: Mutex<()>,
    ready: OnceLock<Arc<T>>,
    state: RwLock<ResourceState>,
}

impl<T: ?Sized + Send + Sync + 'static> LazyResource<T> {
    pub fn new(capability: Box<dyn Capability<Resource = T>>) -> Self {
        Self {
            capability,
            gate: Mutex::new(()),
            ready: OnceLock::new(),
            state: RwLock::new(ResourceState::Unconstructed),
        }
    }

    pub fn key(&self) -> ResourceKey {
        self.capability.key()
    }

    /// Returns the shared resource, constructing it first if needed.
    /// Concurrent callers wait on the in-flight construction.
    pub async fn acquire(&self) -> Result<Arc<T>, ResourceError> {
        if let Some(resource) = self.ready.get() {
            return Ok(resource.clone());
        }

        let _gate = self.gate.lock().await;
        if let Some(resource) = self.ready.get() {
            return Ok(resource.clone());
        }

        let key = self.key();
        self.set_state(ResourceState::Constructing);
        info!("Constructing resource '{}'", key);
        let started = Instant::now();

        let constructed = AssertUnwindSafe(self.capability.construct())
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(ResourceError::Construction {
                    key: key.to_string(),
                    reason: "constructor panicked".to_string(),
                })
            });

        match constructed {
            Ok(resource) => {
                let resource = self.ready.get_or_init(|| resource).clone();
                self.set_state(ResourceState::Ready);
                info!("Resource '{}' ready in {:?}", key, started.elapsed());
                Ok(resource)
            }
            Err(e) => {
                warn!("Resource '{}' failed to construct: {}", key, e);
                self.set_state(ResourceState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn state(&self) -> ResourceState {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Backend version, or [`NOT_INSTALLED`] if the probe errors or panics.
    pub fn probe(&self) -> String {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.capability.probe())) {
            Ok(Ok(version)) => version,
            Ok(Err(e)) => {
                warn!("Probe for '{}' failed: {}", self.key(), e);
                NOT_INSTALLED.to_string()
            }
            Err(_) => {
                warn!("Probe for '{}' panicked", self.key());
                NOT_INSTALLED.to_string()
            }
        }
    }

    fn set_state(&self, state: ResourceState) {
        *self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }
}

/// The worker's long-lived resources, one slot per [`ResourceKey`].
pub struct ResourcePool {
    analysis: LazyResource<dyn FaceAnalyzer>,
    swap: LazyResource<dyn FaceSwapper>,
}

impl ResourcePool {
    pub fn new(
        analysis: Box<dyn Capability<Resource = dyn FaceAnalyzer>>,
        swap: Box<dyn Capability<Resource = dyn FaceSwapper>>,
    ) -> Self {
        Self {
            analysis: LazyResource::new(analysis),
            swap: LazyResource::new(swap),
        }
    }

    pub async fn acquire_analyzer(&self) -> Result<Arc<dyn FaceAnalyzer>, ResourceError> {
        self.analysis.acquire().await
    }

    pub async fn acquire_swapper(&self) -> Result<Arc<dyn FaceSwapper>, ResourceError> {
        self.swap.acquire().await
    }

    pub fn state(&self, key: ResourceKey) -> ResourceState {
        match key {
            ResourceKey::FaceAnalysis => self.analysis.state(),
            ResourceKey::FaceSwap => self.swap.state(),
        }
    }

    /// Capability name to version; never fails and never constructs anything.
    pub fn probe_all(&self) -> BTreeMap<String, String> {
        let mut versions = BTreeMap::new();
        versions.insert(self.analysis.key().to_string(), self.analysis.probe());
        versions.insert(self.swap.key().to_string(), self.swap.probe());
        versions
    }
}
