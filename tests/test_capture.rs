mod common;

use common::*;
use rimlevel::core::capture::photo_filename;
use rimlevel::core::{Camera, CaptureOutcome, FileCamera, View};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::macros::datetime;

fn wait_done(task: &rimlevel::core::CaptureTask) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !task.is_done() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_photo_filename_format() -> anyhow::Result<()> {
    let at = datetime!(2024-03-07 14:05:09 UTC);
    assert_eq!(
        photo_filename(View::First, 12, at, "jpg")?,
        "inspection_12_first_view_20240307_140509.jpg"
    );
    assert_eq!(
        photo_filename(View::Second, 0, at, "png")?,
        "inspection_0_second_view_20240307_140509.png"
    );
    Ok(())
}

#[test]
fn test_file_camera_returns_source_without_save_dir() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let first = save_png(&level_frame(), dir.path(), "a.png");
    let second = save_png(&level_frame(), dir.path(), "b.png");

    let camera = FileCamera::new(&first, &second);
    assert_eq!(camera.capture(View::First, 1)?, first);
    assert_eq!(camera.capture(View::Second, 1)?, second);
    Ok(())
}

#[test]
fn test_file_camera_copies_into_save_dir() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let src = save_png(&level_frame(), dir.path(), "frame.png");
    let save_dir = dir.path().join("captures");

    let camera = FileCamera::new(&src, &src).with_save_dir(Some(save_dir.clone()));
    let path = camera.capture(View::Second, 7)?;

    assert!(path.starts_with(&save_dir));
    assert!(path.is_file());
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("inspection_7_second_view_"), "{name}");
    assert!(name.ends_with(".png"));
    Ok(())
}

#[test]
fn test_file_camera_missing_source_is_an_error() {
    let camera = FileCamera::new("/nonexistent/first.jpg", "/nonexistent/second.jpg");
    assert!(camera.capture(View::First, 1).is_err());
}

#[test]
fn test_scheduler_returns_immediately_and_completes() {
    let camera = StaticCamera {
        first: Some(PathBuf::from("/tmp/first.png")),
        second: None,
    };
    let scheduler = CaptureScheduler::new(Arc::new(camera));

    let task = scheduler.take_photo_async(View::First, 3);
    assert_eq!(task.view(), View::First);
    assert_eq!(task.session_id(), 3);
    wait_done(&task);
    assert_eq!(task.outcome(), Some(&CaptureOutcome::Captured(PathBuf::from("/tmp/first.png"))));

    let failed = scheduler.take_photo_async(View::Second, 3);
    wait_done(&failed);
    assert_eq!(failed.outcome(), Some(&CaptureOutcome::Failed));
    assert!(failed.path().is_none());
}

struct PanickingCamera;

impl Camera for PanickingCamera {
    fn id(&self) -> &str {
        "panicking"
    }

    fn capture(&self, _view: View, _session_id: u16) -> anyhow::Result<PathBuf> {
        panic!("driver fault");
    }
}

#[test]
fn test_camera_panic_becomes_failed_capture() {
    let scheduler = CaptureScheduler::new(Arc::new(PanickingCamera));
    let task = scheduler.take_photo_async(View::First, 1);
    wait_done(&task);
    assert_eq!(task.outcome(), Some(&CaptureOutcome::Failed));
}

#[test]
fn test_stalled_camera_does_not_block_caller() {
    let scheduler = CaptureScheduler::new(Arc::new(StalledCamera));
    let started = Instant::now();
    let task = scheduler.take_photo_async(View::First, 1);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!task.is_done());
}
