//! Assembly of a complete inspection station from a [`Config`].

use std::sync::Arc;

use crate::config::{Config, StrategyKind};
use crate::core::{CaptureScheduler, FileCamera, HandshakeController, RegisterBank, RegisterStore};
use crate::detection::{AutomatedInspection, DetectionStrategy, LevelDetector, ManualInspection};
use crate::pipeline::DebugConfig;

/// The strategy named in the config. Manual inspection prompts on the
/// process terminal.
pub fn build_strategy(cfg: &Config, debug: Option<DebugConfig>) -> Box<dyn DetectionStrategy> {
    match cfg.strategy {
        StrategyKind::Automated => Box::new(
            AutomatedInspection::new(LevelDetector::new(cfg.detection.clone()), cfg.crop_planner()).with_debug(debug),
        ),
        StrategyKind::Manual => Box::new(ManualInspection::stdio()),
    }
}

pub fn build_camera(cfg: &Config) -> FileCamera {
    FileCamera::new(&cfg.camera.first, &cfg.camera.second).with_save_dir(cfg.camera.save_dir.clone())
}

/// A zeroed register bank sized for the configured map.
pub fn build_bank(cfg: &Config) -> Arc<RegisterStore> {
    Arc::new(RegisterStore::new(cfg.registers.bank_size))
}

pub fn build_controller(
    cfg: &Config,
    bank: Arc<dyn RegisterBank>,
    strategy: Box<dyn DetectionStrategy>,
) -> HandshakeController {
    let scheduler = CaptureScheduler::new(Arc::new(build_camera(cfg)));
    HandshakeController::new(bank, cfg.registers.clone(), scheduler, strategy, cfg.controller_options())
}
