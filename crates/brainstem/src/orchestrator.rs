use anyhow::Context;
use async_std::task;
use image::{DynamicImage, ImageFormat, RgbImage};
use log::debug;
use rusty_swap_core::WorkerError;
use rusty_swap_cortex::ResourcePool;
use std::io::Cursor;
use std::sync::Arc;

/// Two decoded images and the faces the caller asked for. Indices are taken
/// as given and clamped during the swap.
pub struct SwapRequest {
    pub source: RgbImage,
    pub target: RgbImage,
    pub source_face: i64,
    pub target_face: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapResult {
    /// PNG-encoded composite.
    pub image: Vec<u8>,
    pub source_face_index: usize,
    pub target_face_index: usize,
}

/// Resolves a requested face index into `[0, count - 1]`. Negative indices go
/// to the first face and indices past the end go to the last one.
pub fn clamp_face_index(requested: i64, count: usize) -> usize {
    if count == 0 || requested <= 0 {
        return 0;
    }
    (requested as u64).min(count as u64 - 1) as usize
}

/// Runs detect -> select -> swap -> encode against the pooled resources.
pub struct Orchestrator {
    pool: Arc<ResourcePool>,
}

impl Orchestrator {
    pub fn new(pool: Arc<ResourcePool>) -> Self {
        Self { pool }
    }

    pub async fn swap(&self, request: SwapRequest) -> Result<SwapResult, WorkerError> {
        let analyzer = self.pool.acquire_analyzer().await?;
        let swapper = self.pool.acquire_swapper().await?;

        let SwapRequest {
            source,
            target,
            source_face,
            target_face,
        } = request;

        let (source_faces, target_faces, target) = task::spawn_blocking(move || {
            let source_faces = analyzer.detect(&source).context("source image")?;
            let target_faces = analyzer.detect(&target).context("target image")?;
            anyhow::Ok((source_faces, target_faces, target))
        })
        .await
        .map_err(|e| WorkerError::Internal(format!("face detection failed: {:#}", e)))?;

        debug!(
            "detected {} source and {} target faces",
            source_faces.len(),
            target_faces.len()
        );
        if source_faces.is_empty() {
            return Err(WorkerError::validation("no face detected in source image"));
        }
        if target_faces.is_empty() {
            return Err(WorkerError::validation("no face detected in target image"));
        }

        let source_index = clamp_face_index(source_face, source_faces.len());
        let target_index = clamp_face_index(target_face, target_faces.len());
        if source_index as i64 != source_face || target_index as i64 != target_face {
            debug!(
                "face indices ({}, {}) resolved to ({}, {})",
                source_face, target_face, source_index, target_index
            );
        }

        let chosen_source = source_faces[source_index].clone();
        let chosen_target = target_faces[target_index].clone();

        let image = task::spawn_blocking(move || {
            let composite = swapper
                .swap(&target, &chosen_target, &chosen_source)
                .context("face swap")?;
            encode_png(composite)
        })
        .await
        .map_err(|e| WorkerError::Internal(format!("{:#}", e)))?;

        Ok(SwapResult {
            image,
            source_face_index: source_index,
            target_face_index: target_index,
        })
    }
}

pub fn encode_png(image: RgbImage) -> anyhow::Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, ImageFormat::Png)
        .context("encoding PNG")?;
    Ok(buffer.into_inner())
}
