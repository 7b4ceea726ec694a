use image::DynamicImage;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use anyhow::Result;

/// Data that flows through the pipeline.
/// Each PipelineData represents one cropped container image with associated metadata
#[derive(Clone)]
pub struct PipelineData {
    /// The image data (color on entry, single-channel after the first step)
    pub image: DynamicImage,

    /// Metadata recorded by the steps (e.g. "otsu_level")
    pub metadata: HashMap<String, MetadataValue>,
}

/// Metadata value types
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Int(i32),
}

impl PipelineData {
    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            image,
            metadata: HashMap::new(),
        }
    }

    /// Replace the image, keeping metadata
    pub fn with_image(self, image: DynamicImage) -> Self {
        Self {
            image,
            metadata: self.metadata,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.metadata.get(key) {
            Some(MetadataValue::Int(v)) => Some(*v),
            _ => None,
        }
    }
}

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    pub enabled: bool,
}

impl DebugConfig {
    /// Debug output rooted at `output_dir`.
    /// The directory must be empty or non-existent
    pub fn new(output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        Ok(Self {
            output_dir,
            enabled: true,
        })
    }

    /// Same root, nested one directory deeper (e.g. per camera view).
    pub fn nested(&self, name: &str) -> Self {
        Self {
            output_dir: self.output_dir.join(name),
            enabled: self.enabled,
        }
    }
}

/// Context available to all pipeline steps
#[derive(Clone, Default)]
pub struct PipelineContext {
    pub verbose: bool,
    pub debug: Option<DebugConfig>,
}

/// Trait that all pipeline steps must implement
pub trait PipelineStep: Send + Sync {
    /// Transform one item into the next stage
    fn process(&self, data: PipelineData, context: &PipelineContext) -> Result<PipelineData>;

    /// Human-readable name for this step (used in verbose output and debug folder names)
    fn name(&self) -> &str;
}

/// Composable pipeline builder
#[derive(Clone)]
pub struct Pipeline {
    steps: Vec<Arc<dyn PipelineStep>>,
    context: PipelineContext,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            context: PipelineContext::default(),
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.context.verbose = verbose;
        self
    }

    /// Enable debug mode with output directory
    pub fn with_debug(mut self, debug: Option<DebugConfig>) -> Self {
        self.context.debug = debug;
        self
    }

    /// Add a processing step to the pipeline
    pub fn add_step(mut self, step: Arc<dyn PipelineStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order on `input`. `label` names the debug
    /// subdirectory for this run (e.g. "canister_3").
    pub fn run(&self, input: DynamicImage, label: &str) -> Result<PipelineData> {
        self.save_debug(label, 0, "input", &input)?;

        let mut data = PipelineData::from_image(input);

        for (step_idx, step) in self.steps.iter().enumerate() {
            if self.context.verbose {
                tracing::debug!(step = step.name(), label, "running pipeline step");
            }

            data = step.process(data, &self.context)?;
            self.save_debug(label, step_idx + 1, step.name(), &data.image)?;
        }

        Ok(data)
    }

    /// Run the pipeline but stop at an intermediate step (useful for debugging)
    pub fn run_partial(&self, input: DynamicImage, num_steps: usize) -> Result<PipelineData> {
        let mut data = PipelineData::from_image(input);

        for step in self.steps.iter().take(num_steps) {
            data = step.process(data, &self.context)?;
        }

        Ok(data)
    }

    fn save_debug(&self, label: &str, index: usize, step_name: &str, image: &DynamicImage) -> Result<()> {
        let Some(debug_config) = &self.context.debug else {
            return Ok(());
        };
        if !debug_config.enabled {
            return Ok(());
        }

        let dir = debug_config.output_dir.join(label);
        std::fs::create_dir_all(&dir)?;

        let filename = format!("{:02}_{}.png", index, step_name.to_lowercase().replace(' ', "_"));
        let output_path = dir.join(&filename);
        image
            .save(&output_path)
            .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))?;

        if self.context.verbose {
            tracing::debug!(path = %output_path.display(), "saved debug image");
        }

        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
