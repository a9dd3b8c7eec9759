use crate::{Capability, FaceAnalyzer, FaceSwapper, ResourceKey};
use anyhow::{anyhow, Result};
use async_std::fs;
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use log::debug;
use rusty_swap_core::manifest::{BoundingBox, DetectedFace};
use rusty_swap_core::ResourceError;
use std::path::PathBuf;
use std::sync::Arc;

pub const PINKY_VERSION: &str = concat!("pinky-", env!("CARGO_PKG_VERSION"));

/// Images smaller than this on either side yield no detections.
pub const MIN_FACE_SIDE: u32 = 32;

/// Length of the identity embedding: per-channel mean then standard deviation.
const EMBEDDING_LEN: usize = 6;

/// Canonical five-point layout (eyes, nose, mouth corners) relative to the box.
const LANDMARKS: [(f32, f32); 5] = [
    (0.35, 0.40),
    (0.65, 0.40),
    (0.50, 0.55),
    (0.38, 0.75),
    (0.62, 0.75),
];

/// Reference analyzer: reports a single face over the central region of the
/// image, with colour statistics of that region as its identity.
#[derive(Debug, Default)]
pub struct PinkyAnalyzer;

impl FaceAnalyzer for PinkyAnalyzer {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>> {
        let (w, h) = image.dimensions();
        if w < MIN_FACE_SIDE || h < MIN_FACE_SIDE {
            debug!("Pinky: {}x{} is too small for a face", w, h);
            return Ok(Vec::new());
        }

        let (wf, hf) = (w as f32, h as f32);
        let bbox = BoundingBox {
            x1: wf * 0.25,
            y1: hf * 0.20,
            x2: wf * 0.75,
            y2: hf * 0.80,
        };
        let landmarks = LANDMARKS.map(|(lx, ly)| {
            (
                bbox.x1 + lx * bbox.width(),
                bbox.y1 + ly * bbox.height(),
            )
        });

        Ok(vec![DetectedFace {
            index: 0,
            bbox,
            score: 0.99,
            landmarks: Some(landmarks),
            embedding: region_stats(image, &bbox).to_vec(),
        }])
    }
}

/// Reference swapper: transfers the source identity's colour statistics onto
/// the target face inside a feathered ellipse, then pastes the region back.
#[derive(Debug)]
pub struct PinkySwapper {
    model_bytes: u64,
}

impl PinkySwapper {
    pub fn model_bytes(&self) -> u64 {
        self.model_bytes
    }
}

impl FaceSwapper for PinkySwapper {
    fn swap(
        &self,
        target: &RgbImage,
        target_face: &DetectedFace,
        source: &DetectedFace,
    ) -> Result<RgbImage> {
        if source.embedding.len() < EMBEDDING_LEN {
            return Err(anyhow!(
                "Pinky Error: identity embedding has {} values, expected {}",
                source.embedding.len(),
                EMBEDDING_LEN
            ));
        }

        let (w, h) = target.dimensions();
        let bbox = target_face.bbox.clamp_to(w, h);
        if bbox.width() < 1.0 || bbox.height() < 1.0 {
            return Err(anyhow!("Pinky Error: target face box is empty"));
        }

        let target_stats = region_stats(target, &bbox);
        let (cx, cy) = bbox.center();
        let (rx, ry) = (bbox.width() / 2.0, bbox.height() / 2.0);

        let mut out = target.clone();
        for y in bbox.y1.floor() as u32..(bbox.y2.ceil() as u32).min(h) {
            for x in bbox.x1.floor() as u32..(bbox.x2.ceil() as u32).min(w) {
                let dx = (x as f32 + 0.5 - cx) / rx;
                let dy = (y as f32 + 0.5 - cy) / ry;
                let weight = feather((dx * dx + dy * dy).sqrt());
                if weight <= 0.0 {
                    continue;
                }

                let Rgb(px) = *target.get_pixel(x, y);
                let mut blended = [0u8; 3];
                for c in 0..3 {
                    let v = px[c] as f32 / 255.0;
                    let t_std = target_stats[c + 3].max(1e-3);
                    let moved = (v - target_stats[c]) / t_std * source.embedding[c + 3]
                        + source.embedding[c];
                    let mixed = v * (1.0 - weight) + moved * weight;
                    blended[c] = (mixed.clamp(0.0, 1.0) * 255.0).round() as u8;
                }
                out.put_pixel(x, y, Rgb(blended));
            }
        }

        Ok(out)
    }
}

/// Mask weight for a normalised elliptical distance: solid core, linear edge.
fn feather(d: f32) -> f32 {
    const CORE: f32 = 0.8;
    if d <= CORE {
        1.0
    } else if d >= 1.0 {
        0.0
    } else {
        (1.0 - d) / (1.0 - CORE)
    }
}

/// Per-channel mean and standard deviation (0..1) of the pixels inside `bbox`.
fn region_stats(image: &RgbImage, bbox: &BoundingBox) -> [f32; EMBEDDING_LEN] {
    let (w, h) = image.dimensions();
    let b = bbox.clamp_to(w, h);
    let mut sum = [0f64; 3];
    let mut sq = [0f64; 3];
    let mut n = 0f64;

    for y in b.y1 as u32..(b.y2 as u32).min(h) {
        for x in b.x1 as u32..(b.x2 as u32).min(w) {
            let Rgb(px) = image.get_pixel(x, y);
            for c in 0..3 {
                let v = px[c] as f64 / 255.0;
                sum[c] += v;
                sq[c] += v * v;
            }
            n += 1.0;
        }
    }

    let mut stats = [0f32; EMBEDDING_LEN];
    if n == 0.0 {
        return stats;
    }
    for c in 0..3 {
        let mean = sum[c] / n;
        stats[c] = mean as f32;
        stats[c + 3] = (sq[c] / n - mean * mean).max(0.0).sqrt() as f32;
    }
    stats
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PinkyAnalysisCapability;

#[async_trait]
impl Capability for PinkyAnalysisCapability {
    type Resource = dyn FaceAnalyzer;

    fn key(&self) -> ResourceKey {
        ResourceKey::FaceAnalysis
    }

    fn probe(&self) -> Result<String> {
        Ok(PINKY_VERSION.to_string())
    }

    async fn construct(&self) -> Result<Arc<dyn FaceAnalyzer>, ResourceError> {
        Ok(Arc::new(PinkyAnalyzer))
    }
}

/// Builds the swapper from its on-disk model. Never downloads: a missing file
/// is reported so the caller can run the download operation first.
#[derive(Debug, Clone)]
pub struct PinkySwapCapability {
    model_path: PathBuf,
}

impl PinkySwapCapability {
    pub fn new(model_path: PathBuf) -> Self {
        Self { model_path }
    }
}

#[async_trait]
impl Capability for PinkySwapCapability {
    type Resource = dyn FaceSwapper;

    fn key(&self) -> ResourceKey {
        ResourceKey::FaceSwap
    }

    fn probe(&self) -> Result<String> {
        Ok(PINKY_VERSION.to_string())
    }

    async fn construct(&self) -> Result<Arc<dyn FaceSwapper>, ResourceError> {
        let key = self.key().to_string();
        let meta = match fs::metadata(&self.model_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ResourceError::MissingAsset {
                    key,
                    path: self.model_path.display().to_string(),
                })
            }
            Err(e) => {
                return Err(ResourceError::Construction {
                    key,
                    reason: e.to_string(),
                })
            }
        };

        if !meta.is_file() || meta.len() == 0 {
            return Err(ResourceError::Construction {
                key,
                reason: format!("{} is not a usable model file", self.model_path.display()),
            });
        }

        Ok(Arc::new(PinkySwapper {
            model_bytes: meta.len(),
        }))
    }
}
