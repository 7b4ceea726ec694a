use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::detection::{CropPlanner, LevelDetector};
use crate::models::{CameraSide, CanisterId};
use crate::pipeline::DebugConfig;

/// Correction flag per processed container (`true` = needs correction).
/// Containers missing from the map were not processed.
pub type FlagMap = BTreeMap<CanisterId, bool>;

/// One captured camera view and the containers it should be judged for.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewImage {
    pub side: CameraSide,
    pub active_ids: Vec<CanisterId>,
    /// `None` when the capture failed.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InspectionRequest {
    pub session_id: u16,
    pub views: Vec<ViewImage>,
}

impl InspectionRequest {
    pub fn active_ids(&self) -> Vec<CanisterId> {
        let mut ids: Vec<CanisterId> = self.views.iter().flat_map(|v| v.active_ids.iter().copied()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Something that turns captured views into correction flags.
pub trait DetectionStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Judge every active container. An `Err` means no result could be
    /// produced at all; per-container failures are left out of the map.
    fn inspect(&self, request: &InspectionRequest) -> Result<FlagMap>;
}

/// Automated inspection: crop each view and run the level detector.
pub struct AutomatedInspection {
    detector: LevelDetector,
    planner: CropPlanner,
    debug: Option<DebugConfig>,
}

impl AutomatedInspection {
    pub fn new(detector: LevelDetector, planner: CropPlanner) -> Self {
        Self {
            detector,
            planner,
            debug: None,
        }
    }

    /// Save preprocessing stages under `session_<id>/<side>/canister_<n>/`.
    pub fn with_debug(mut self, debug: Option<DebugConfig>) -> Self {
        self.debug = debug;
        self
    }

    fn inspect_view(&self, session_id: u16, view: &ViewImage, flags: &mut FlagMap) {
        let Some(path) = &view.path else {
            tracing::warn!(side = %view.side, ids = ?view.active_ids, "capture failed; view not processed");
            return;
        };

        let img = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to load image; view not processed");
                return;
            }
        };

        let detector = match &self.debug {
            Some(debug) => self
                .detector
                .clone()
                .with_debug(Some(debug.nested(&format!("session_{session_id}")).nested(&view.side.to_string()))),
            None => self.detector.clone(),
        };

        let regions = self.planner.regions_for(view.side, &view.active_ids, img.width(), img.height());
        for (id, region) in regions {
            let Some(crop) = region.extract(&img) else {
                tracing::warn!(canister = id, "empty crop");
                continue;
            };

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| detector.detect(id, &crop)));
            match outcome {
                Ok(Ok(status)) => {
                    if !status.has_edge {
                        tracing::info!(canister = id, "no top edge detected; assuming level");
                    } else if status.is_curved {
                        tracing::info!(canister = id, "off level: curved rim");
                    } else {
                        tracing::info!(
                            canister = id,
                            level = status.is_level,
                            angle_deg = format!("{:.2}", status.angle_deg),
                            "rim measured"
                        );
                    }
                    flags.insert(id, status.needs_correction());
                }
                Ok(Err(e)) => tracing::warn!(canister = id, error = %e, "detection failed"),
                Err(_) => tracing::error!(canister = id, "detection panicked"),
            }
        }
    }
}

impl DetectionStrategy for AutomatedInspection {
    fn name(&self) -> &str {
        "automated"
    }

    fn inspect(&self, request: &InspectionRequest) -> Result<FlagMap> {
        let mut flags = FlagMap::new();
        for view in &request.views {
            self.inspect_view(request.session_id, view, &mut flags);
        }
        Ok(flags)
    }
}

/// Operator-driven inspection over a line-oriented terminal.
pub struct ManualInspection {
    io: Mutex<(Box<dyn BufRead + Send>, Box<dyn Write + Send>)>,
}

impl ManualInspection {
    pub fn new(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            io: Mutex::new((input, output)),
        }
    }

    pub fn stdio() -> Self {
        Self::new(
            Box::new(std::io::BufReader::new(std::io::stdin())),
            Box::new(std::io::stdout()),
        )
    }
}

impl DetectionStrategy for ManualInspection {
    fn name(&self) -> &str {
        "manual"
    }

    fn inspect(&self, request: &InspectionRequest) -> Result<FlagMap> {
        let mut guard = self.io.lock().map_err(|_| anyhow::anyhow!("operator terminal lock poisoned"))?;
        let (input, output) = &mut *guard;

        writeln!(output, "Inspection {}: mark containers that need correction", request.session_id)?;
        let mut flags = FlagMap::new();
        for id in request.active_ids() {
            write!(output, "C{id} needs correction? [y/N] ")?;
            output.flush()?;

            let mut line = String::new();
            let read = input.read_line(&mut line).context("failed to read operator answer")?;
            if read == 0 {
                anyhow::bail!("operator input closed");
            }
            let answer = line.trim().to_ascii_lowercase();
            flags.insert(id, answer == "y" || answer == "yes");
        }
        Ok(flags)
    }
}
