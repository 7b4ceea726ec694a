use image::{DynamicImage, GrayImage, Luma};
use rimlevel::core::{Camera, RegisterBank, RegisterError, RegisterSpace, RegisterStore, View};
use rimlevel::detection::{DetectionStrategy, FlagMap, InspectionRequest};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DARK: u8 = 30;
pub const BRIGHT: u8 = 220;

/// Dark above, bright below a straight edge through `(cx, cy)` tilted by
/// `angle_deg` (positive descends to the right).
pub fn tilted_edge(width: u32, height: u32, cx: f32, cy: f32, angle_deg: f32) -> GrayImage {
    let slope = angle_deg.to_radians().tan();
    GrayImage::from_fn(width, height, |x, y| {
        let edge_y = cy + (x as f32 - cx) * slope;
        if (y as f32) >= edge_y { Luma([BRIGHT]) } else { Luma([DARK]) }
    })
}

/// Edge through the crop centre at 40% of the height.
pub fn edge_crop(width: u32, height: u32, angle_deg: f32) -> DynamicImage {
    DynamicImage::ImageLuma8(tilted_edge(width, height, width as f32 / 2.0, height as f32 * 0.4, angle_deg))
}

/// A horizontal rim at y = 120 with a raised spur rising at 25 degrees
/// over x = 200..300, so the rim has two clearly different orientations.
pub fn curved_rim_crop() -> DynamicImage {
    let slope = 25f32.to_radians().tan();
    DynamicImage::ImageLuma8(GrayImage::from_fn(700, 300, |x, y| {
        let mut edge_y = 120.0;
        if (200..300).contains(&x) {
            edge_y -= (x - 200) as f32 * slope;
        }
        if (y as f32) >= edge_y { Luma([BRIGHT]) } else { Luma([DARK]) }
    }))
}

pub fn blank_crop(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([128])))
}

/// Full camera frame whose default container crops each show a level rim.
pub fn level_frame() -> GrayImage {
    // Crops span y = 180..330; the rim sits at 40% of that band.
    tilted_edge(1000, 600, 500.0, 240.0, 0.0)
}

/// Full frame whose right-hand container (x 600..850) is tilted by 8 degrees.
pub fn frame_with_tilted_right() -> GrayImage {
    let slope = 8f32.to_radians().tan();
    GrayImage::from_fn(1000, 600, |x, y| {
        let edge_y = if x >= 560 { 240.0 + (x as f32 - 725.0) * slope } else { 240.0 };
        if (y as f32) >= edge_y { Luma([BRIGHT]) } else { Luma([DARK]) }
    })
}

/// Save `img` as PNG under `dir` and return its path.
pub fn save_png(img: &GrayImage, dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    img.save_with_format(&path, image::ImageFormat::Png)
        .expect("Failed to save test image");
    path
}

/// Camera that returns fixed paths immediately.
pub struct StaticCamera {
    pub first: Option<PathBuf>,
    pub second: Option<PathBuf>,
}

impl Camera for StaticCamera {
    fn id(&self) -> &str {
        "static"
    }

    fn capture(&self, view: View, _session_id: u16) -> anyhow::Result<PathBuf> {
        let path = match view {
            View::First => &self.first,
            View::Second => &self.second,
        };
        path.clone().ok_or_else(|| anyhow::anyhow!("no image for {} view", view))
    }
}

/// Camera that never answers within a test's lifetime.
pub struct StalledCamera;

impl Camera for StalledCamera {
    fn id(&self) -> &str {
        "stalled"
    }

    fn capture(&self, _view: View, _session_id: u16) -> anyhow::Result<PathBuf> {
        std::thread::sleep(Duration::from_secs(5));
        anyhow::bail!("camera offline")
    }
}

/// Strategy that answers a scripted sequence of flag maps and records
/// every request.
#[derive(Clone, Default)]
pub struct ScriptedStrategy {
    pub answers: Arc<Mutex<Vec<anyhow::Result<FlagMap>>>>,
    pub requests: Arc<Mutex<Vec<InspectionRequest>>>,
}

impl ScriptedStrategy {
    pub fn new(answers: Vec<anyhow::Result<FlagMap>>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers)),
            requests: Arc::default(),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl DetectionStrategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn inspect(&self, request: &InspectionRequest) -> anyhow::Result<FlagMap> {
        self.requests.lock().unwrap().push(request.clone());
        let mut answers = self.answers.lock().unwrap();
        if answers.is_empty() {
            return Ok(FlagMap::new());
        }
        answers.remove(0)
    }
}

pub fn flags(pairs: &[(u8, bool)]) -> FlagMap {
    pairs.iter().copied().collect()
}

/// Register bank that logs every status write in order.
pub struct RecordingBank {
    pub inner: RegisterStore,
    pub writes: Mutex<Vec<(u16, u16)>>,
}

impl RecordingBank {
    pub fn new(size: usize) -> Self {
        Self {
            inner: RegisterStore::new(size),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn status_writes(&self) -> Vec<(u16, u16)> {
        self.writes.lock().unwrap().clone()
    }
}

impl RegisterBank for RecordingBank {
    fn read(&self, space: RegisterSpace, addr: u16, count: usize) -> Result<Vec<u16>, RegisterError> {
        self.inner.read(space, addr, count)
    }

    fn write(&self, space: RegisterSpace, addr: u16, values: &[u16]) -> Result<(), RegisterError> {
        self.inner.write(space, addr, values)?;
        if space == RegisterSpace::Status {
            let mut log = self.writes.lock().unwrap();
            for (i, v) in values.iter().enumerate() {
                log.push((addr + i as u16, *v));
            }
        }
        Ok(())
    }
}
