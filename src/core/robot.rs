use std::sync::Arc;

use crate::core::registers::{RegisterBank, RegisterError, RegisterMap, RegisterSpace};
use crate::core::session::Phase;
use crate::models::CANISTER_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotStage {
    PulseTrigger,
    ReleaseTrigger,
    RequestFirstView,
    AwaitFirstView,
    AwaitResults,
    Finished,
}

/// Flags read back after a commit, `true` = needs correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotReport {
    pub session_id: u16,
    pub version: u16,
    pub flags: [bool; CANISTER_COUNT],
}

/// Scripted stand-in for the external controller: pulse the trigger, present
/// each view in turn, then read the flags once the results version moves.
pub struct RobotProgram {
    bank: Arc<dyn RegisterBank>,
    map: RegisterMap,
    stage: RobotStage,
    baseline_version: u16,
    report: Option<RobotReport>,
}

impl RobotProgram {
    pub fn new(bank: Arc<dyn RegisterBank>, map: RegisterMap) -> Self {
        Self {
            bank,
            map,
            stage: RobotStage::PulseTrigger,
            baseline_version: 0,
            report: None,
        }
    }

    pub fn stage(&self) -> RobotStage {
        self.stage
    }

    pub fn is_finished(&self) -> bool {
        self.stage == RobotStage::Finished
    }

    pub fn report(&self) -> Option<&RobotReport> {
        self.report.as_ref()
    }

    /// Start another cycle from the top.
    pub fn restart(&mut self) {
        self.stage = RobotStage::PulseTrigger;
        self.report = None;
    }

    /// Advance by at most one stage.
    pub fn step(&mut self) -> Result<RobotStage, RegisterError> {
        self.stage = match self.stage {
            RobotStage::PulseTrigger => {
                self.baseline_version = self.status(self.map.results_version)?;
                self.control(self.map.step_request, 0)?;
                self.control(self.map.start_trigger, 1)?;
                RobotStage::ReleaseTrigger
            }
            RobotStage::ReleaseTrigger => {
                self.control(self.map.start_trigger, 0)?;
                RobotStage::RequestFirstView
            }
            RobotStage::RequestFirstView => {
                self.control(self.map.step_request, 1)?;
                RobotStage::AwaitFirstView
            }
            RobotStage::AwaitFirstView => {
                if Phase::from_register(self.status(self.map.phase)?) == Some(Phase::FirstCaptured) {
                    self.control(self.map.step_request, 2)?;
                    RobotStage::AwaitResults
                } else {
                    RobotStage::AwaitFirstView
                }
            }
            RobotStage::AwaitResults => {
                let version = self.status(self.map.results_version)?;
                if version != self.baseline_version {
                    let mut flags = [false; CANISTER_COUNT];
                    for (flag, addr) in flags.iter_mut().zip(self.map.flags) {
                        *flag = self.status(addr)? != 0;
                    }
                    let session_id = self.status(self.map.session_id)?;
                    tracing::debug!(session_id, version, ?flags, "robot read results");
                    self.report = Some(RobotReport {
                        session_id,
                        version,
                        flags,
                    });
                    RobotStage::Finished
                } else {
                    RobotStage::AwaitResults
                }
            }
            RobotStage::Finished => RobotStage::Finished,
        };
        Ok(self.stage)
    }

    fn status(&self, addr: u16) -> Result<u16, RegisterError> {
        self.bank.read_one(RegisterSpace::Status, addr)
    }

    fn control(&self, addr: u16, value: u16) -> Result<(), RegisterError> {
        self.bank.write_one(RegisterSpace::Control, addr, value)
    }
}
