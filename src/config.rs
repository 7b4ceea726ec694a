//! Station configuration, read from a TOML file.
//!
//! Every field has a default, so an empty or missing file describes the
//! deployed station. `RIMLEVEL_*` environment variables are applied on top.
//!
//! | Variable | Config field |
//! |---|---|
//! | `RIMLEVEL_ANGLE_TOLERANCE` | `detection.angle_tolerance_deg` |
//! | `RIMLEVEL_CANNY_LOW` | `detection.canny_low` |
//! | `RIMLEVEL_CANNY_HIGH` | `detection.canny_high` |
//! | `RIMLEVEL_IMAGE_FIRST` | `camera.first` |
//! | `RIMLEVEL_IMAGE_SECOND` | `camera.second` |
//! | `RIMLEVEL_SAVE_DIR` | `camera.save_dir` |
//! | `RIMLEVEL_TICK_MS` | `tick_ms` |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::{ControllerOptions, RegisterMap, ViewPlan};
use crate::detection::crops::CropOverride;
use crate::detection::{CropPlanner, DetectionParams};
use crate::models::CameraSide;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Automated,
    Manual,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::Automated => write!(f, "automated"),
            StrategyKind::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Sample image returned for the first view.
    pub first: PathBuf,
    /// Sample image returned for the second view.
    pub second: PathBuf,
    /// Copy every capture here under a timestamped name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_dir: Option<PathBuf>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            first: PathBuf::from("images/first_view.jpg"),
            second: PathBuf::from("images/second_view.jpg"),
            save_dir: None,
        }
    }
}

/// Per-side crop overrides in pixels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    pub front: Vec<CropOverride>,
    pub back: Vec<CropOverride>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Poll period of the handshake loop.
    pub tick_ms: u64,
    /// Outstanding captures are abandoned after this long; 0 disables.
    pub capture_timeout_ms: u64,
    pub strategy: StrategyKind,
    pub registers: RegisterMap,
    pub detection: DetectionParams,
    pub camera: CameraConfig,
    pub views: ViewPlan,
    pub crops: CropConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            capture_timeout_ms: 30_000,
            strategy: StrategyKind::default(),
            registers: RegisterMap::default(),
            detection: DetectionParams::default(),
            camera: CameraConfig::default(),
            views: ViewPlan::default(),
            crops: CropConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file does not
    /// exist. Environment overrides are applied and the result validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut cfg = match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                Self::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; unparseable numbers are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("RIMLEVEL_ANGLE_TOLERANCE")
            && let Ok(tol) = v.parse::<f32>()
        {
            self.detection.angle_tolerance_deg = tol;
        }
        if let Some(v) = lookup("RIMLEVEL_CANNY_LOW")
            && let Ok(low) = v.parse::<f32>()
        {
            self.detection.canny_low = low;
        }
        if let Some(v) = lookup("RIMLEVEL_CANNY_HIGH")
            && let Ok(high) = v.parse::<f32>()
        {
            self.detection.canny_high = high;
        }
        if let Some(v) = lookup("RIMLEVEL_IMAGE_FIRST") {
            self.camera.first = PathBuf::from(v);
        }
        if let Some(v) = lookup("RIMLEVEL_IMAGE_SECOND") {
            self.camera.second = PathBuf::from(v);
        }
        if let Some(v) = lookup("RIMLEVEL_SAVE_DIR") {
            self.camera.save_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("RIMLEVEL_TICK_MS")
            && let Ok(ms) = v.parse::<u64>()
        {
            self.tick_ms = ms;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick_ms must be positive".into()));
        }
        let d = &self.detection;
        if !(0.0..=1.0).contains(&d.band_top) || !(0.0..=1.0).contains(&d.band_bottom) || d.band_top >= d.band_bottom {
            return Err(ConfigError::Invalid(format!(
                "detection band {}..{} must satisfy 0 <= top < bottom <= 1",
                d.band_top, d.band_bottom
            )));
        }
        if d.canny_low > d.canny_high {
            return Err(ConfigError::Invalid(format!(
                "canny_low ({}) exceeds canny_high ({})",
                d.canny_low, d.canny_high
            )));
        }
        if d.angle_tolerance_deg <= 0.0 {
            return Err(ConfigError::Invalid("angle_tolerance_deg must be positive".into()));
        }
        self.registers.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            tick: Duration::from_millis(self.tick_ms),
            capture_timeout: (self.capture_timeout_ms > 0).then(|| Duration::from_millis(self.capture_timeout_ms)),
            plan: self.views.clone(),
        }
    }

    pub fn crop_planner(&self) -> CropPlanner {
        CropPlanner::new()
            .with_overrides(CameraSide::Front, &self.crops.front)
            .with_overrides(CameraSide::Back, &self.crops.back)
    }
}
