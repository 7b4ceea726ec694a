use crate::pipeline::{PipelineData, PipelineStep, PipelineContext, MetadataValue};
use crate::detection::preprocessing;
use anyhow::Result;
use image::DynamicImage;

/// Metadata key under which [`OtsuBinarizeStep`] records its threshold.
pub const OTSU_LEVEL_KEY: &str = "otsu_level";

/// Convert image to grayscale
pub struct GrayscaleStep;

impl PipelineStep for GrayscaleStep {
    fn process(&self, data: PipelineData, _context: &PipelineContext) -> Result<PipelineData> {
        let gray = preprocessing::to_grayscale(&data.image);
        Ok(data.with_image(DynamicImage::ImageLuma8(gray)))
    }

    fn name(&self) -> &str {
        "Grayscale Conversion"
    }
}

/// Apply Gaussian blur
pub struct BlurStep {
    pub sigma: f32,
}

impl PipelineStep for BlurStep {
    fn process(&self, data: PipelineData, _context: &PipelineContext) -> Result<PipelineData> {
        let gray = data.image.to_luma8();
        let blurred = preprocessing::apply_blur(&gray, self.sigma);
        Ok(data.with_image(DynamicImage::ImageLuma8(blurred)))
    }

    fn name(&self) -> &str {
        "Gaussian Blur"
    }
}

/// Binarize with an automatic (Otsu) threshold
pub struct OtsuBinarizeStep;

impl PipelineStep for OtsuBinarizeStep {
    fn process(&self, data: PipelineData, context: &PipelineContext) -> Result<PipelineData> {
        let gray = data.image.to_luma8();
        let (binary, level) = preprocessing::binarize_otsu(&gray);
        if context.verbose {
            tracing::debug!(level, "otsu threshold");
        }
        Ok(data
            .with_image(DynamicImage::ImageLuma8(binary))
            .with_metadata(OTSU_LEVEL_KEY, MetadataValue::Int(level as i32)))
    }

    fn name(&self) -> &str {
        "Otsu Binarize"
    }
}

/// Remove small foreground speckles with a morphological opening
pub struct MorphOpenStep {
    pub radius: u8,
}

impl PipelineStep for MorphOpenStep {
    fn process(&self, data: PipelineData, _context: &PipelineContext) -> Result<PipelineData> {
        let binary = data.image.to_luma8();
        let cleaned = preprocessing::remove_speckles(&binary, self.radius);
        Ok(data.with_image(DynamicImage::ImageLuma8(cleaned)))
    }

    fn name(&self) -> &str {
        "Morphological Open"
    }
}

/// Detect edges using Canny
pub struct EdgeDetectionStep {
    pub low_threshold: f32,
    pub high_threshold: f32,
}

impl PipelineStep for EdgeDetectionStep {
    fn process(&self, data: PipelineData, _context: &PipelineContext) -> Result<PipelineData> {
        let gray = data.image.to_luma8();
        let edges = preprocessing::detect_edges(&gray, self.low_threshold, self.high_threshold);
        Ok(data.with_image(DynamicImage::ImageLuma8(edges)))
    }

    fn name(&self) -> &str {
        "Edge Detection"
    }
}
