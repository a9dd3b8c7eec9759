use crate::protocol::Status;
use serde::{Deserialize, Serialize};

/// A fetched (or already present) asset. Built once per fetch attempt and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub url: String,
    pub path: String,
    pub sha256: String,
    pub size: u64,
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadFailure {
    pub url: String,
    pub error: String,
}

/// Result of a batch fetch. Every requested locator lands in exactly one of
/// `downloaded` or `errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    pub downloaded: Vec<AssetDescriptor>,
    pub errors: Vec<DownloadFailure>,
}

impl DownloadOutcome {
    pub fn status(&self) -> Status {
        match (self.downloaded.is_empty(), self.errors.is_empty()) {
            (_, true) => Status::Ok,
            (false, false) => Status::Partial,
            (true, false) => Status::Error,
        }
    }
}

/// Axis-aligned face box in pixel coordinates of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Restricts the box to an image of the given dimensions.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }
}

/// One detection. Lives only for the duration of the request that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    /// Position in the detector's own ranking.
    pub index: usize,
    pub bbox: BoundingBox,
    pub score: f32,
    pub landmarks: Option<[(f32, f32); 5]>,
    pub embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(url: &str) -> AssetDescriptor {
        AssetDescriptor {
            url: url.to_string(),
            path: format!("/models/{}", url),
            sha256: "00".into(),
            size: 1,
            skipped: false,
        }
    }

    fn failure(url: &str) -> DownloadFailure {
        DownloadFailure {
            url: url.to_string(),
            error: "boom".into(),
        }
    }

    #[test]
    fn batch_status_follows_failure_count() {
        let ok = DownloadOutcome {
            downloaded: vec![descriptor("a")],
            errors: vec![],
        };
        assert_eq!(ok.status(), Status::Ok);

        let partial = DownloadOutcome {
            downloaded: vec![descriptor("a")],
            errors: vec![failure("b")],
        };
        assert_eq!(partial.status(), Status::Partial);

        let failed = DownloadOutcome {
            downloaded: vec![],
            errors: vec![failure("a"), failure("b")],
        };
        assert_eq!(failed.status(), Status::Error);
    }

    #[test]
    fn bbox_clamps_into_image() {
        let b = BoundingBox {
            x1: -4.0,
            y1: 2.0,
            x2: 120.0,
            y2: 50.0,
        }
        .clamp_to(100, 40);
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (0.0, 2.0, 100.0, 40.0));
        assert_eq!(b.width(), 100.0);
    }
}
