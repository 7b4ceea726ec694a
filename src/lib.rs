pub mod config;
pub mod core;
pub mod detection;
pub mod models;
pub mod pipeline;
pub mod station;
pub mod telemetry;

pub use config::{Config, ConfigError, StrategyKind};
pub use models::{CameraSide, CanisterId, CanisterStatus, CropRegion};
pub use detection::{DetectionParams, DetectionStrategy, LevelDetector};
pub use pipeline::{
    Pipeline, PipelineData, PipelineStep, PipelineContext,
    MetadataValue, DebugConfig
};
