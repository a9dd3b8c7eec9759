use anyhow::{anyhow, Result};
use async_std::task;
use async_trait::async_trait;
use futures::future::join_all;
use rusty_swap_core::manifest::DetectedFace;
use rusty_swap_core::ResourceError;
use rusty_swap_cortex::{
    Capability, FaceAnalyzer, FaceSwapper, ResourceKey, ResourcePool, ResourceState, RgbImage,
    NOT_INSTALLED,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct NoFaces;

impl FaceAnalyzer for NoFaces {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<DetectedFace>> {
        Ok(Vec::new())
    }
}

struct Identity;

impl FaceSwapper for Identity {
    fn swap(&self, target: &RgbImage, _: &DetectedFace, _: &DetectedFace) -> Result<RgbImage> {
        Ok(target.clone())
    }
}

/// Slow analyzer constructor that counts how often it runs and can be told to fail.
#[derive(Clone, Default)]
struct CountingAnalysis {
    constructions: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl Capability for CountingAnalysis {
    type Resource = dyn FaceAnalyzer;

    fn key(&self) -> ResourceKey {
        ResourceKey::FaceAnalysis
    }

    fn probe(&self) -> Result<String> {
        Ok("counting-1".into())
    }

    async fn construct(&self) -> Result<Arc<dyn FaceAnalyzer>, ResourceError> {
        self.constructions.fetch_add(1, Ordering::SeqCst);
        task::sleep(Duration::from_millis(100)).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(ResourceError::Construction {
                key: self.key().to_string(),
                reason: "weights unreadable".into(),
            });
        }
        Ok(Arc::new(NoFaces))
    }
}

struct BrokenSwap;

#[async_trait]
impl Capability for BrokenSwap {
    type Resource = dyn FaceSwapper;

    fn key(&self) -> ResourceKey {
        ResourceKey::FaceSwap
    }

    fn probe(&self) -> Result<String> {
        Err(anyhow!("runtime library not found"))
    }

    async fn construct(&self) -> Result<Arc<dyn FaceSwapper>, ResourceError> {
        panic!("constructor exploded");
    }
}

struct PanickyProbe;

#[async_trait]
impl Capability for PanickyProbe {
    type Resource = dyn FaceSwapper;

    fn key(&self) -> ResourceKey {
        ResourceKey::FaceSwap
    }

    fn probe(&self) -> Result<String> {
        panic!("probe exploded");
    }

    async fn construct(&self) -> Result<Arc<dyn FaceSwapper>, ResourceError> {
        Ok(Arc::new(Identity))
    }
}

#[async_std::test]
async fn concurrent_acquire_constructs_once() -> Result<()> {
    let analysis = CountingAnalysis::default();
    let pool = Arc::new(ResourcePool::new(
        Box::new(analysis.clone()),
        Box::new(BrokenSwap),
    ));

    let handles = (0..8).map(|_| {
        let pool = pool.clone();
        task::spawn(async move { pool.acquire_analyzer().await })
    });
    let resources = join_all(handles)
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    assert_eq!(analysis.constructions.load(Ordering::SeqCst), 1);
    let first = &resources[0];
    assert!(resources.iter().all(|r| Arc::ptr_eq(r, first)));
    assert_eq!(pool.state(ResourceKey::FaceAnalysis), ResourceState::Ready);

    // Later acquirers reuse the same instance without constructing again.
    let again = pool.acquire_analyzer().await?;
    assert!(Arc::ptr_eq(&again, first));
    assert_eq!(analysis.constructions.load(Ordering::SeqCst), 1);
    Ok(())
}

#[async_std::test]
async fn failed_construction_is_retried() -> Result<()> {
    let analysis = CountingAnalysis::default();
    analysis.fail.store(true, Ordering::SeqCst);
    let pool = ResourcePool::new(Box::new(analysis.clone()), Box::new(BrokenSwap));

    assert!(pool.acquire_analyzer().await.is_err());
    assert_eq!(
        pool.state(ResourceKey::FaceAnalysis),
        ResourceState::Failed("failed to construct resource 'face-analysis': weights unreadable".into())
    );

    analysis.fail.store(false, Ordering::SeqCst);
    pool.acquire_analyzer().await?;

    assert_eq!(analysis.constructions.load(Ordering::SeqCst), 2);
    assert_eq!(pool.state(ResourceKey::FaceAnalysis), ResourceState::Ready);
    Ok(())
}

#[async_std::test]
async fn panicking_constructor_becomes_an_error() -> Result<()> {
    let pool = ResourcePool::new(Box::new(CountingAnalysis::default()), Box::new(BrokenSwap));

    let err = pool.acquire_swapper().await.err().expect("construction must fail");

    assert!(matches!(err, ResourceError::Construction { .. }));
    assert!(matches!(
        pool.state(ResourceKey::FaceSwap),
        ResourceState::Failed(_)
    ));
    // The other slot is unaffected.
    pool.acquire_analyzer().await?;
    Ok(())
}

#[test]
fn probes_never_fail() {
    let erroring = ResourcePool::new(Box::new(CountingAnalysis::default()), Box::new(BrokenSwap));
    let versions = erroring.probe_all();
    assert_eq!(versions["face-analysis"], "counting-1");
    assert_eq!(versions["face-swap-model"], NOT_INSTALLED);

    let panicking = ResourcePool::new(Box::new(CountingAnalysis::default()), Box::new(PanickyProbe));
    assert_eq!(panicking.probe_all()["face-swap-model"], NOT_INSTALLED);
}

#[test]
fn probing_constructs_nothing() {
    let analysis = CountingAnalysis::default();
    let pool = ResourcePool::new(Box::new(analysis.clone()), Box::new(BrokenSwap));

    let _ = pool.probe_all();

    assert_eq!(analysis.constructions.load(Ordering::SeqCst), 0);
    assert_eq!(pool.state(ResourceKey::FaceAnalysis), ResourceState::Unconstructed);
}
