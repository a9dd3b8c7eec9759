use anyhow::Result;
use async_trait::async_trait;
use rusty_swap_core::manifest::DetectedFace;
use rusty_swap_core::ResourceError;
use std::fmt;
use std::sync::Arc;

pub mod backend;
pub mod pool;

pub use backend::create_pool;
pub use image::RgbImage;
pub use pool::{LazyResource, ResourcePool, ResourceState, NOT_INSTALLED};

/// Identity of a lazily constructed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    FaceAnalysis,
    FaceSwap,
}

impl ResourceKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKey::FaceAnalysis => "face-analysis",
            ResourceKey::FaceSwap => "face-swap-model",
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finds faces and their identity embeddings. Implementations are shared
/// read-only across requests, so `detect` takes `&self`.
pub trait FaceAnalyzer: Send + Sync {
    /// Faces in detector order; callers must not re-sort.
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>>;
}

pub trait FaceSwapper: Send + Sync {
    /// Applies `source`'s identity to `target_face` and returns the whole
    /// target image with the result pasted back.
    fn swap(
        &self,
        target: &RgbImage,
        target_face: &DetectedFace,
        source: &DetectedFace,
    ) -> Result<RgbImage>;
}

/// Something that can report whether it is installed and build a resource on
/// demand. Neither call may have global side effects.
#[async_trait]
pub trait Capability: Send + Sync {
    type Resource: ?Sized + Send + Sync + 'static;

    fn key(&self) -> ResourceKey;

    /// Version of the backing implementation.
    fn probe(&self) -> Result<String>;

    /// Expensive construction; may block for the duration of a model load.
    async fn construct(&self) -> std::result::Result<Arc<Self::Resource>, ResourceError>;
}
