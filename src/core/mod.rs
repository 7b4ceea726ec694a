pub mod capture;
pub mod controller;
pub mod registers;
pub mod robot;
pub mod session;

pub use capture::{Camera, CaptureOutcome, CaptureScheduler, CaptureTask, FileCamera, View};
pub use controller::{ControllerOptions, HandshakeController, ViewAssignment, ViewPlan};
pub use registers::{RegisterBank, RegisterError, RegisterMap, RegisterSpace, RegisterStore};
pub use robot::{RobotProgram, RobotReport, RobotStage};
pub use session::{InspectionSession, Phase};
