#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from rimlevel for tests
pub use rimlevel::core::{
    CaptureScheduler, ControllerOptions, HandshakeController, Phase, RegisterBank, RegisterMap,
    RegisterSpace, RegisterStore, RobotProgram,
};
use std::sync::Arc;
use std::time::Duration;

/// Controller over `bank` with the default map and a fast tick.
pub fn make_controller(
    bank: Arc<dyn RegisterBank>,
    camera: Arc<dyn rimlevel::core::Camera>,
    strategy: Box<dyn rimlevel::DetectionStrategy>,
    capture_timeout: Option<Duration>,
) -> HandshakeController {
    HandshakeController::new(
        bank,
        RegisterMap::default(),
        CaptureScheduler::new(camera),
        strategy,
        ControllerOptions {
            tick: Duration::from_millis(10),
            capture_timeout,
            ..ControllerOptions::default()
        },
    )
}

pub fn status(bank: &dyn RegisterBank, addr: u16) -> u16 {
    bank.read_one(RegisterSpace::Status, addr).expect("status read")
}

pub fn set_control(bank: &dyn RegisterBank, addr: u16, value: u16) {
    bank.write_one(RegisterSpace::Control, addr, value).expect("control write");
}

pub fn flag_registers(bank: &dyn RegisterBank) -> [u16; 4] {
    let map = RegisterMap::default();
    map.flags.map(|addr| status(bank, addr))
}

/// Tick until `done` holds, sleeping briefly so capture workers can finish.
pub fn tick_until(
    controller: &mut HandshakeController,
    max_ticks: usize,
    mut done: impl FnMut(&HandshakeController) -> bool,
) -> bool {
    for _ in 0..max_ticks {
        controller.tick().expect("tick");
        if done(controller) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
