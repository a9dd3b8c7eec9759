use anyhow::Result;
use image::{Rgb, RgbImage};
use rusty_swap_core::ResourceError;
use rusty_swap_cortex::backend::{PinkyAnalyzer, MIN_FACE_SIDE};
use rusty_swap_cortex::{create_pool, FaceAnalyzer, ResourceKey, ResourceState};

fn gradient(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 90]))
}

#[test]
fn pinky_finds_one_central_face() -> Result<()> {
    let faces = PinkyAnalyzer.detect(&gradient(120, 80))?;

    assert_eq!(faces.len(), 1);
    let face = &faces[0];
    assert_eq!(face.index, 0);
    assert_eq!((face.bbox.x1, face.bbox.x2), (30.0, 90.0));
    assert_eq!(face.embedding.len(), 6);
    assert!(face.landmarks.is_some());
    Ok(())
}

#[test]
fn pinky_sees_nothing_in_tiny_images() -> Result<()> {
    let faces = PinkyAnalyzer.detect(&gradient(MIN_FACE_SIDE - 1, 200))?;
    assert!(faces.is_empty());
    Ok(())
}

#[async_std::test]
async fn swap_pastes_back_into_full_image() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let model = dir.path().join("inswapper_128.onnx");
    std::fs::write(&model, b"weights")?;
    let pool = create_pool(model);

    let analyzer = pool.acquire_analyzer().await?;
    let swapper = pool.acquire_swapper().await?;

    let source = RgbImage::from_pixel(64, 64, Rgb([220, 40, 40]));
    let target = RgbImage::from_pixel(100, 60, Rgb([30, 30, 200]));
    let source_face = analyzer.detect(&source)?.remove(0);
    let target_face = analyzer.detect(&target)?.remove(0);

    let out = swapper.swap(&target, &target_face, &source_face)?;

    assert_eq!(out.dimensions(), target.dimensions());
    // Corners sit outside the face ellipse and are untouched.
    assert_eq!(out.get_pixel(0, 0), target.get_pixel(0, 0));
    assert_eq!(out.get_pixel(99, 59), target.get_pixel(99, 59));
    // The face centre takes on the source colour.
    assert_eq!(*out.get_pixel(50, 30), Rgb([220, 40, 40]));
    Ok(())
}

#[async_std::test]
async fn swapper_requires_model_on_disk() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pool = create_pool(dir.path().join("inswapper_128.onnx"));

    let err = pool.acquire_swapper().await.err().expect("missing model must fail");

    assert!(matches!(err, ResourceError::MissingAsset { .. }));
    assert!(err.to_string().contains("download_models"));
    assert!(matches!(
        pool.state(ResourceKey::FaceSwap),
        ResourceState::Failed(_)
    ));
    // No download was attempted on our behalf.
    assert!(!dir.path().join("inswapper_128.onnx").exists());
    Ok(())
}

#[async_std::test]
async fn swapper_rejects_empty_model_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let model = dir.path().join("inswapper_128.onnx");
    std::fs::write(&model, b"")?;

    let err = create_pool(model).acquire_swapper().await.err().expect("empty model");
    assert!(matches!(err, ResourceError::Construction { .. }));
    Ok(())
}

#[test]
fn probes_report_backend_version() {
    let pool = create_pool("/nonexistent/inswapper_128.onnx".into());
    let versions = pool.probe_all();

    assert_eq!(versions.len(), 2);
    assert!(versions["face-analysis"].starts_with("pinky-"));
    assert!(versions["face-swap-model"].starts_with("pinky-"));
    assert_eq!(pool.state(ResourceKey::FaceSwap), ResourceState::Unconstructed);
}
