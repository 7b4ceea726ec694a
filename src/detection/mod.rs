pub mod preprocessing;
pub mod segments;
pub mod steps;
pub mod crops;
pub mod strategy;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::models::{CanisterId, CanisterStatus};
use crate::pipeline::{DebugConfig, Pipeline};
use segments::{LineSegment, SegmentOptions};

pub use crops::CropPlanner;
pub use strategy::{AutomatedInspection, DetectionStrategy, FlagMap, InspectionRequest, ManualInspection, ViewImage};

/// Tuning of the rim-level detector. Defaults were tuned on ~700x300 crops
/// taken from 4608x2592 frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// A rim is level when |angle| is strictly below this, in degrees.
    pub angle_tolerance_deg: f32,
    pub blur_sigma: f32,
    /// Radius of the opening kernel (1 = 3x3).
    pub open_radius: u8,
    pub canny_low: f32,
    pub canny_high: f32,
    pub reference_width: u32,
    pub reference_height: u32,
    pub base_min_line_length: f32,
    pub base_vote_threshold: f32,
    /// Lower bound for both scaled line parameters.
    pub param_floor: u32,
    pub max_line_gap: f32,
    /// Vertical band, as fractions of crop height, that both segment
    /// endpoints must fall in.
    pub band_top: f32,
    pub band_bottom: f32,
    /// Segments steeper than this (degrees from horizontal) are rejected.
    pub max_abs_angle_deg: f32,
    /// Standard deviation of candidate angles above which the rim is curved.
    pub curvature_std_deg: f32,
    pub min_curvature_candidates: usize,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            angle_tolerance_deg: 2.5,
            blur_sigma: 1.1,
            open_radius: 1,
            canny_low: 20.0,
            canny_high: 60.0,
            reference_width: 700,
            reference_height: 300,
            base_min_line_length: 25.0,
            base_vote_threshold: 20.0,
            param_floor: 10,
            max_line_gap: 5.0,
            band_top: 0.2,
            band_bottom: 0.6,
            max_abs_angle_deg: 30.0,
            curvature_std_deg: 5.0,
            min_curvature_candidates: 2,
        }
    }
}

/// Line-extractor parameters adapted to one crop size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledParams {
    pub scale: f32,
    pub min_line_length: u32,
    pub vote_threshold: u32,
}

impl DetectionParams {
    pub fn scaled_for(&self, width: u32, height: u32) -> ScaledParams {
        let scale = (width as f32 / self.reference_width.max(1) as f32)
            .min(height as f32 / self.reference_height.max(1) as f32);
        let scaled = |base: f32| ((base * scale).floor().max(0.0) as u32).max(self.param_floor);
        ScaledParams {
            scale,
            min_line_length: scaled(self.base_min_line_length),
            vote_threshold: scaled(self.base_vote_threshold),
        }
    }
}

/// Build the preprocessing pipeline: intensity, smoothing, Otsu binarization,
/// speckle removal and edge extraction.
pub fn build_preprocessing_pipeline(params: &DetectionParams) -> Pipeline {
    use std::sync::Arc;
    use steps::*;

    Pipeline::new()
        .add_step(Arc::new(GrayscaleStep))
        .add_step(Arc::new(BlurStep { sigma: params.blur_sigma }))
        .add_step(Arc::new(OtsuBinarizeStep))
        .add_step(Arc::new(MorphOpenStep { radius: params.open_radius }))
        .add_step(Arc::new(EdgeDetectionStep {
            low_threshold: params.canny_low,
            high_threshold: params.canny_high,
        }))
}

/// Classifies a cropped container image as level, tilted or curved.
#[derive(Clone)]
pub struct LevelDetector {
    params: DetectionParams,
    pipeline: Pipeline,
}

impl LevelDetector {
    pub fn new(params: DetectionParams) -> Self {
        let pipeline = build_preprocessing_pipeline(&params);
        Self { params, pipeline }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.pipeline = self.pipeline.with_verbose(verbose);
        self
    }

    /// Save every preprocessing stage under `debug` (one directory per canister).
    pub fn with_debug(mut self, debug: Option<DebugConfig>) -> Self {
        self.pipeline = self.pipeline.with_debug(debug);
        self
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Run the full detection on one crop.
    pub fn detect(&self, id: CanisterId, crop: &DynamicImage) -> anyhow::Result<CanisterStatus> {
        let (width, height) = (crop.width(), crop.height());
        if width == 0 || height == 0 {
            anyhow::bail!("empty crop for canister {}", id);
        }

        let processed = self.pipeline.run(crop.clone(), &format!("canister_{id}"))?;
        let edges = processed.image.to_luma8();

        let scaled = self.params.scaled_for(width, height);
        let segments = segments::extract_segments(
            &edges,
            &SegmentOptions {
                vote_threshold: scaled.vote_threshold,
                min_length: scaled.min_line_length as f32,
                max_gap: self.params.max_line_gap,
                ..SegmentOptions::default()
            },
        );
        tracing::debug!(
            canister = id,
            scale = scaled.scale,
            min_line_length = scaled.min_line_length,
            vote_threshold = scaled.vote_threshold,
            segments = segments.len(),
            "line extraction"
        );

        Ok(self.classify(id, &segments, height))
    }

    /// Turn extracted segments into a verdict: band and orientation filter,
    /// longest-segment selection, tolerance check and curvature override.
    pub fn classify(&self, id: CanisterId, segments: &[LineSegment], crop_height: u32) -> CanisterStatus {
        if segments.is_empty() {
            tracing::info!(canister = id, "no lines detected; assuming level");
            return CanisterStatus::no_edge(id);
        }

        let top = crop_height as f32 * self.params.band_top;
        let bottom = crop_height as f32 * self.params.band_bottom;
        let in_band = |y: f32| y >= top && y <= bottom;

        let candidates: Vec<&LineSegment> = segments
            .iter()
            .filter(|s| in_band(s.y1) && in_band(s.y2))
            .filter(|s| s.angle_deg().abs() <= self.params.max_abs_angle_deg)
            .collect();

        // Longest wins; first encountered keeps ties.
        let mut best: Option<&LineSegment> = None;
        for segment in &candidates {
            if best.is_none_or(|b| segment.length() > b.length()) {
                best = Some(segment);
            }
        }
        let Some(best) = best else {
            tracing::info!(canister = id, "no suitable horizontal lines; assuming level");
            return CanisterStatus::no_edge(id);
        };

        let angle = best.angle_deg();
        let mut status = CanisterStatus {
            id,
            is_level: angle.abs() < self.params.angle_tolerance_deg,
            angle_deg: angle,
            has_edge: true,
            is_curved: false,
        };

        if candidates.len() >= self.params.min_curvature_candidates.max(2) {
            let angles: Vec<f32> = candidates.iter().map(|s| s.angle_deg()).collect();
            let spread = std_dev(&angles);
            if spread > self.params.curvature_std_deg {
                tracing::debug!(canister = id, spread, "rim edge spread exceeds curvature threshold");
                status.is_curved = true;
                status.is_level = false;
            }
        }

        status
    }
}

impl Default for LevelDetector {
    fn default() -> Self {
        Self::new(DetectionParams::default())
    }
}

/// Population standard deviation.
fn std_dev(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
    var.sqrt()
}
