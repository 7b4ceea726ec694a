use anyhow::Context;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::thread;
use time::macros::format_description;
use time::OffsetDateTime;

/// The two camera views of one inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    First,
    Second,
}

impl View {
    pub fn tag(&self) -> &'static str {
        match self {
            View::First => "first",
            View::Second => "second",
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// An image-capture device.
pub trait Camera: Send + Sync {
    /// Stable identifier for this camera, e.g. `"pallet_cam"`.
    fn id(&self) -> &str;

    /// Acquire one image for `view` and return where it was stored.
    fn capture(&self, view: View, session_id: u16) -> anyhow::Result<PathBuf>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured(PathBuf),
    Failed,
}

impl CaptureOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            CaptureOutcome::Captured(path) => Some(path),
            CaptureOutcome::Failed => None,
        }
    }
}

/// Handle to one in-flight capture.
#[derive(Debug, Clone)]
pub struct CaptureTask {
    view: View,
    session_id: u16,
    slot: Arc<OnceLock<CaptureOutcome>>,
}

impl CaptureTask {
    fn new(view: View, session_id: u16) -> Self {
        Self {
            view,
            session_id,
            slot: Arc::new(OnceLock::new()),
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn session_id(&self) -> u16 {
        self.session_id
    }

    pub fn is_done(&self) -> bool {
        self.slot.get().is_some()
    }

    pub fn outcome(&self) -> Option<&CaptureOutcome> {
        self.slot.get()
    }

    pub fn path(&self) -> Option<&Path> {
        self.outcome().and_then(CaptureOutcome::path)
    }

    fn complete(&self, outcome: CaptureOutcome) {
        // Only the first completion counts.
        let _ = self.slot.set(outcome);
    }
}

/// Spawns one worker per capture request. Faults come back as
/// [`CaptureOutcome::Failed`], never as errors.
#[derive(Clone)]
pub struct CaptureScheduler {
    camera: Arc<dyn Camera>,
}

impl CaptureScheduler {
    pub fn new(camera: Arc<dyn Camera>) -> Self {
        Self { camera }
    }

    pub fn camera_id(&self) -> &str {
        self.camera.id()
    }

    /// Start acquiring `view` on a worker thread and return immediately.
    pub fn take_photo_async(&self, view: View, session_id: u16) -> CaptureTask {
        let task = CaptureTask::new(view, session_id);
        let worker_task = task.clone();
        let camera = Arc::clone(&self.camera);

        let spawned = thread::Builder::new()
            .name(format!("capture-{}", view.tag()))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| camera.capture(view, session_id)));
                let outcome = match result {
                    Ok(Ok(path)) => {
                        tracing::info!(%view, session_id, path = %path.display(), "capture complete");
                        CaptureOutcome::Captured(path)
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(%view, session_id, error = %e, "capture failed");
                        CaptureOutcome::Failed
                    }
                    Err(_) => {
                        tracing::error!(%view, session_id, camera = camera.id(), "camera driver panicked");
                        CaptureOutcome::Failed
                    }
                };
                worker_task.complete(outcome);
            });

        if let Err(e) = spawned {
            tracing::error!(%view, session_id, error = %e, "failed to spawn capture worker");
            task.complete(CaptureOutcome::Failed);
        }

        task
    }
}

/// Camera backed by fixed sample images, one per view. With a `save_dir`
/// every capture is copied there under a timestamped name, like a real
/// camera writing a fresh frame.
#[derive(Debug, Clone)]
pub struct FileCamera {
    first: PathBuf,
    second: PathBuf,
    save_dir: Option<PathBuf>,
}

impl FileCamera {
    pub fn new(first: impl Into<PathBuf>, second: impl Into<PathBuf>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
            save_dir: None,
        }
    }

    pub fn with_save_dir(mut self, save_dir: Option<PathBuf>) -> Self {
        self.save_dir = save_dir;
        self
    }

    fn source(&self, view: View) -> &Path {
        match view {
            View::First => &self.first,
            View::Second => &self.second,
        }
    }
}

impl Camera for FileCamera {
    fn id(&self) -> &str {
        "file"
    }

    fn capture(&self, view: View, session_id: u16) -> anyhow::Result<PathBuf> {
        let source = self.source(view);
        if !source.is_file() {
            anyhow::bail!("sample image for {} view not found: {}", view, source.display());
        }

        let Some(dir) = &self.save_dir else {
            return Ok(source.to_path_buf());
        };

        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create capture directory {:?}", dir))?;
        let ext = source.extension().and_then(|e| e.to_str()).unwrap_or("jpg");
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let dest = dir.join(photo_filename(view, session_id, now, ext)?);
        std::fs::copy(source, &dest)
            .with_context(|| format!("Failed to copy {:?} to {:?}", source, dest))?;
        Ok(dest)
    }
}

/// `inspection_<id>_<view>_view_<YYYYmmdd_HHMMSS>.<ext>`
pub fn photo_filename(view: View, session_id: u16, at: OffsetDateTime, ext: &str) -> anyhow::Result<String> {
    let stamp = at.format(format_description!("[year][month][day]_[hour][minute][second]"))?;
    Ok(format!("inspection_{}_{}_view_{}.{}", session_id, view.tag(), stamp, ext))
}
