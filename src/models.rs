use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Container ids run from 1 to [`CANISTER_COUNT`].
pub type CanisterId = u8;

pub const CANISTER_COUNT: usize = 4;

/// Which side of the pallet a camera view looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSide {
    Front,
    Back,
}

impl std::fmt::Display for CameraSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraSide::Front => write!(f, "front"),
            CameraSide::Back => write!(f, "back"),
        }
    }
}

/// Rectangular region of interest in pixel coordinates, `y1..y2` by `x1..x2`
/// (end-exclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub y1: u32,
    pub y2: u32,
    pub x1: u32,
    pub x2: u32,
}

impl CropRegion {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Clamp the region to an image of the given size.
    pub fn clamp_to(&self, width: u32, height: u32) -> CropRegion {
        let x1 = self.x1.min(width);
        let y1 = self.y1.min(height);
        CropRegion {
            y1,
            y2: self.y2.min(height).max(y1),
            x1,
            x2: self.x2.min(width).max(x1),
        }
    }

    /// Extract the region as a sub-image. Returns `None` when the clamped
    /// region is empty.
    pub fn extract(&self, img: &DynamicImage) -> Option<DynamicImage> {
        let clamped = self.clamp_to(img.width(), img.height());
        if clamped.is_empty() {
            return None;
        }
        Some(img.crop_imm(clamped.x1, clamped.y1, clamped.width(), clamped.height()))
    }
}

/// Per-container verdict produced by the level detector.
#[derive(Debug, Clone, PartialEq)]
pub struct CanisterStatus {
    pub id: CanisterId,
    pub is_level: bool,
    /// Signed angle of the selected rim edge relative to horizontal, in degrees.
    /// Positive angles descend to the right in image coordinates.
    pub angle_deg: f32,
    pub has_edge: bool,
    pub is_curved: bool,
}

impl CanisterStatus {
    /// Status reported when no usable rim edge was found.
    pub fn no_edge(id: CanisterId) -> Self {
        Self {
            id,
            is_level: true,
            angle_deg: 0.0,
            has_edge: false,
            is_curved: false,
        }
    }

    /// Correction flag published to the external controller.
    pub fn needs_correction(&self) -> bool {
        !self.is_level
    }
}
