mod engine_stub;

pub use engine_stub::{
    PinkyAnalysisCapability, PinkyAnalyzer, PinkySwapCapability, PinkySwapper, MIN_FACE_SIDE,
    PINKY_VERSION,
};

use crate::pool::ResourcePool;
use std::path::PathBuf;

/// Pool wired to the built-in backend. `swap_model` is the on-disk asset the
/// swapper is constructed from; it is only checked on first use.
pub fn create_pool(swap_model: PathBuf) -> ResourcePool {
    ResourcePool::new(
        Box::new(PinkyAnalysisCapability),
        Box::new(PinkySwapCapability::new(swap_model)),
    )
}
