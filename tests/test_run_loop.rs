mod common;

use common::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn camera() -> Arc<StaticCamera> {
    Arc::new(StaticCamera {
        first: Some(PathBuf::from("first.png")),
        second: Some(PathBuf::from("second.png")),
    })
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_ticks_until_shutdown() {
    let bank: Arc<dyn RegisterBank> = Arc::new(RegisterStore::new(200));
    let map = RegisterMap::default();
    set_control(&*bank, map.start_trigger, 1);

    let mut controller = make_controller(Arc::clone(&bank), camera(), Box::new(ScriptedStrategy::default()), None);
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        controller.run(rx).await;
        controller
    });

    tokio::time::sleep(Duration::from_millis(55)).await;
    assert_eq!(status(&*bank, map.session_id), 1);

    // Trigger released and pressed again while the loop runs.
    set_control(&*bank, map.start_trigger, 0);
    tokio::time::sleep(Duration::from_millis(30)).await;
    set_control(&*bank, map.start_trigger, 1);
    tokio::time::sleep(Duration::from_millis(30)).await;

    tx.send(true).unwrap();
    let controller = handle.await.unwrap();
    assert_eq!(controller.session().id, 2);
    assert_eq!(status(&*bank, map.session_id), 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_survives_failing_ticks() {
    // Bank too small for the default map: every tick fails.
    let bank: Arc<dyn RegisterBank> = Arc::new(RegisterStore::new(64));
    let mut controller = make_controller(Arc::clone(&bank), camera(), Box::new(ScriptedStrategy::default()), None);
    assert!(controller.tick().is_err());

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { controller.run(rx).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!handle.is_finished());

    drop(tx);
    handle.await.unwrap();
}
