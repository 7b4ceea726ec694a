use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::models::{CameraSide, CanisterId, CropRegion};

// Default layout as fractions of the frame: one shared vertical band, a left
// and a right container slot.
const BAND_Y: (f64, f64) = (0.30, 0.55);
const LEFT_X: (f64, f64) = (0.24, 0.50);
const RIGHT_X: (f64, f64) = (0.60, 0.85);

/// Pixel crop for one container, as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropOverride {
    pub id: CanisterId,
    pub y1: u32,
    pub y2: u32,
    pub x1: u32,
    pub x2: u32,
}

impl CropOverride {
    pub fn region(&self) -> CropRegion {
        CropRegion {
            y1: self.y1,
            y2: self.y2,
            x1: self.x1,
            x2: self.x2,
        }
    }
}

/// Maps (camera side, active containers) to regions of interest.
///
/// Without overrides the front view exposes containers 3 (left) and 4
/// (right) and the back view exposes 1 (left) and 2 (right). Overrides for a
/// side replace that side's default set.
#[derive(Debug, Clone, Default)]
pub struct CropPlanner {
    overrides: HashMap<CameraSide, BTreeMap<CanisterId, CropRegion>>,
}

impl CropPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, side: CameraSide, id: CanisterId, region: CropRegion) -> Self {
        self.overrides.entry(side).or_default().insert(id, region);
        self
    }

    pub fn with_overrides(mut self, side: CameraSide, overrides: &[CropOverride]) -> Self {
        for o in overrides {
            self = self.with_override(side, o.id, o.region());
        }
        self
    }

    /// Default regions for a frame of the given size.
    pub fn default_regions(side: CameraSide, width: u32, height: u32) -> BTreeMap<CanisterId, CropRegion> {
        let px = |frac: f64, extent: u32| (extent as f64 * frac) as u32;
        let slot = |x: (f64, f64)| CropRegion {
            y1: px(BAND_Y.0, height),
            y2: px(BAND_Y.1, height),
            x1: px(x.0, width),
            x2: px(x.1, width),
        };

        let (left, right) = match side {
            CameraSide::Front => (3, 4),
            CameraSide::Back => (1, 2),
        };
        BTreeMap::from([(left, slot(LEFT_X)), (right, slot(RIGHT_X))])
    }

    /// Regions for each active container, clamped to the frame. Containers
    /// without a region, or whose region is empty after clamping, are
    /// skipped with a warning.
    pub fn regions_for(
        &self,
        side: CameraSide,
        active_ids: &[CanisterId],
        width: u32,
        height: u32,
    ) -> BTreeMap<CanisterId, CropRegion> {
        let available = match self.overrides.get(&side) {
            Some(regions) if !regions.is_empty() => regions.clone(),
            _ => Self::default_regions(side, width, height),
        };

        let mut planned = BTreeMap::new();
        for &id in active_ids {
            let Some(region) = available.get(&id) else {
                tracing::warn!(canister = id, %side, "no crop region defined");
                continue;
            };
            let clamped = region.clamp_to(width, height);
            if clamped.is_empty() {
                tracing::warn!(canister = id, %side, ?region, "crop region lies outside the frame");
                continue;
            }
            planned.insert(id, clamped);
        }
        planned
    }
}
