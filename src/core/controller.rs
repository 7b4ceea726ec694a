use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::core::capture::{CaptureOutcome, CaptureScheduler, CaptureTask, View};
use crate::core::registers::{RegisterBank, RegisterMap, RegisterSpace};
use crate::core::session::{InspectionSession, Phase};
use crate::detection::{DetectionStrategy, InspectionRequest, ViewImage};
use crate::models::{CameraSide, CanisterId, CANISTER_COUNT};

/// Step-request values written by the external controller.
const STEP_FIRST_VIEW: u16 = 1;
const STEP_SECOND_VIEW: u16 = 2;

/// Which side a view looks at and which containers it is judged for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewAssignment {
    pub side: CameraSide,
    pub canisters: Vec<CanisterId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewPlan {
    pub first: ViewAssignment,
    pub second: ViewAssignment,
}

impl Default for ViewPlan {
    fn default() -> Self {
        Self {
            first: ViewAssignment {
                side: CameraSide::Front,
                canisters: vec![3, 4],
            },
            second: ViewAssignment {
                side: CameraSide::Back,
                canisters: vec![1, 2],
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub tick: Duration,
    /// Outstanding captures older than this are abandoned as failed.
    pub capture_timeout: Option<Duration>,
    pub plan: ViewPlan,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            capture_timeout: Some(Duration::from_secs(30)),
            plan: ViewPlan::default(),
        }
    }
}

impl ControllerOptions {
    fn timeout_ticks(&self) -> Option<u64> {
        let timeout = self.capture_timeout?;
        let tick = self.tick.as_millis().max(1);
        Some((timeout.as_millis().div_ceil(tick) as u64).max(1))
    }
}

/// Capture state of one view within the current session.
#[derive(Debug, Default)]
struct ViewSlot {
    task: Option<CaptureTask>,
    requested_at: u64,
    outcome: Option<CaptureOutcome>,
}

impl ViewSlot {
    fn is_idle(&self) -> bool {
        self.task.is_none() && self.outcome.is_none()
    }

    fn start(&mut self, task: CaptureTask, now: u64) {
        self.task = Some(task);
        self.requested_at = now;
    }

    /// Returns true once an outcome is available.
    fn poll(&mut self, now: u64, timeout_ticks: Option<u64>) -> bool {
        if self.outcome.is_some() {
            return true;
        }
        let Some(task) = &self.task else {
            return false;
        };

        if let Some(outcome) = task.outcome() {
            self.outcome = Some(outcome.clone());
        } else if timeout_ticks.is_some_and(|limit| now.saturating_sub(self.requested_at) >= limit) {
            tracing::warn!(view = %task.view(), session_id = task.session_id(), "capture timed out; abandoning");
            self.outcome = Some(CaptureOutcome::Failed);
        } else {
            return false;
        }
        self.task = None;
        true
    }

    fn path(&self) -> Option<std::path::PathBuf> {
        self.outcome.as_ref().and_then(|o| o.path()).map(|p| p.to_path_buf())
    }
}

/// Advances `Idle -> FirstCaptured -> SecondCaptured` as the step-request
/// register asks for each view. Detection runs once, at commit, which writes
/// the flag registers first and bumps the results version last.
pub struct HandshakeController {
    bank: Arc<dyn RegisterBank>,
    map: RegisterMap,
    scheduler: CaptureScheduler,
    strategy: Box<dyn DetectionStrategy>,
    options: ControllerOptions,
    session: InspectionSession,
    /// Last committed flags; these are what the status registers show.
    committed: [bool; CANISTER_COUNT],
    prev_trigger: u16,
    first: ViewSlot,
    second: ViewSlot,
    ticks: u64,
}

impl HandshakeController {
    pub fn new(
        bank: Arc<dyn RegisterBank>,
        map: RegisterMap,
        scheduler: CaptureScheduler,
        strategy: Box<dyn DetectionStrategy>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            bank,
            map,
            scheduler,
            strategy,
            options,
            session: InspectionSession::default(),
            committed: [false; CANISTER_COUNT],
            prev_trigger: 0,
            first: ViewSlot::default(),
            second: ViewSlot::default(),
            ticks: 0,
        }
    }

    pub fn session(&self) -> &InspectionSession {
        &self.session
    }

    pub fn committed_flags(&self) -> [bool; CANISTER_COUNT] {
        self.committed
    }

    /// One poll cycle. Errors are per-tick; the caller logs them and ticks
    /// again.
    pub fn tick(&mut self) -> anyhow::Result<()> {
        self.ticks += 1;

        self.publish()?;

        let trigger = self.read_control(self.map.start_trigger)?;
        let rising = trigger == 1 && self.prev_trigger == 0;
        self.prev_trigger = trigger;
        if rising {
            self.start_session()?;
        }

        let step = self.read_control(self.map.step_request)?;
        self.first_view_step(step)?;
        self.second_view_step(step)?;
        Ok(())
    }

    /// Drive [`tick`](Self::tick) at the configured cadence until `shutdown`
    /// turns true or its sender is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.options.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            tick_ms = self.options.tick.as_millis() as u64,
            strategy = self.strategy.name(),
            camera = self.scheduler.camera_id(),
            "inspection loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        tracing::error!(error = %e, "tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("inspection loop stopped");
    }

    fn read_control(&self, addr: u16) -> anyhow::Result<u16> {
        Ok(self.bank.read_one(RegisterSpace::Control, addr)?)
    }

    fn write_status(&self, addr: u16, value: u16) -> anyhow::Result<()> {
        Ok(self.bank.write_one(RegisterSpace::Status, addr, value)?)
    }

    /// Write the full snapshot. Flags go before the version so a publish can
    /// never expose a version ahead of its flags.
    fn publish(&self) -> anyhow::Result<()> {
        self.write_status(self.map.session_id, self.session.id)?;
        self.write_status(self.map.phase, self.session.phase.as_register())?;
        for (addr, flag) in self.map.flags.iter().zip(self.committed) {
            self.write_status(*addr, flag as u16)?;
        }
        self.write_status(self.map.results_version, self.session.version)?;
        Ok(())
    }

    fn start_session(&mut self) -> anyhow::Result<()> {
        if !self.first.is_idle() || !self.second.is_idle() {
            tracing::info!(session_id = self.session.id, "discarding in-flight session state");
        }
        self.session = self.session.next();
        self.first = ViewSlot::default();
        self.second = ViewSlot::default();

        self.write_status(self.map.session_id, self.session.id)?;
        self.write_status(self.map.phase, self.session.phase.as_register())?;
        tracing::info!(session_id = self.session.id, "new inspection requested");
        Ok(())
    }

    fn first_view_step(&mut self, step: u16) -> anyhow::Result<()> {
        if self.session.phase != Phase::Idle {
            return Ok(());
        }

        if step == STEP_FIRST_VIEW && self.first.is_idle() {
            tracing::info!(session_id = self.session.id, side = %self.options.plan.first.side, "first view ready; capturing");
            let task = self.scheduler.take_photo_async(View::First, self.session.id);
            self.first.start(task, self.ticks);
        } else if step == STEP_SECOND_VIEW && self.first.is_idle() {
            tracing::debug!(session_id = self.session.id, "second view requested before first; ignoring");
        }

        if self.first.poll(self.ticks, self.options.timeout_ticks()) {
            self.session.phase = Phase::FirstCaptured;
            self.write_status(self.map.phase, self.session.phase.as_register())?;
            tracing::info!(session_id = self.session.id, captured = self.first.path().is_some(), "first view complete");
        }
        Ok(())
    }

    fn second_view_step(&mut self, step: u16) -> anyhow::Result<()> {
        if self.session.phase != Phase::FirstCaptured {
            return Ok(());
        }

        if step == STEP_SECOND_VIEW && self.second.is_idle() {
            tracing::info!(session_id = self.session.id, side = %self.options.plan.second.side, "second view ready; capturing");
            let task = self.scheduler.take_photo_async(View::Second, self.session.id);
            self.second.start(task, self.ticks);
        }

        if !self.second.poll(self.ticks, self.options.timeout_ticks()) {
            return Ok(());
        }

        // Re-read: only commit against a request that is still standing.
        let confirm = self.read_control(self.map.step_request)?;
        if confirm != STEP_SECOND_VIEW {
            tracing::debug!(session_id = self.session.id, step = confirm, "second view ready but request withdrawn; holding");
            return Ok(());
        }
        self.commit()
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        let plan = &self.options.plan;
        let request = InspectionRequest {
            session_id: self.session.id,
            views: vec![
                ViewImage {
                    side: plan.first.side,
                    active_ids: plan.first.canisters.clone(),
                    path: self.first.path(),
                },
                ViewImage {
                    side: plan.second.side,
                    active_ids: plan.second.canisters.clone(),
                    path: self.second.path(),
                },
            ],
        };

        let flags = self.strategy.inspect(&request)?;
        for (id, needs_correction) in flags {
            if !self.session.set_flag(id, needs_correction) {
                tracing::warn!(canister = id, "result for unknown container ignored");
            }
        }

        let mut next = self.committed;
        for (i, flag) in self.session.flags.iter().enumerate() {
            if let Some(flag) = flag {
                next[i] = *flag;
            }
        }

        for (addr, flag) in self.map.flags.iter().zip(next) {
            self.write_status(*addr, flag as u16)?;
        }
        self.committed = next;

        self.write_status(self.map.phase, Phase::SecondCaptured.as_register())?;
        let version = self.session.version.wrapping_add(1);
        self.write_status(self.map.results_version, version)?;
        self.session.version = version;
        self.session.phase = Phase::SecondCaptured;

        let unjudged: Vec<usize> = self
            .session
            .flags
            .iter()
            .enumerate()
            .filter(|(_, flag)| flag.is_none())
            .map(|(i, _)| i + 1)
            .collect();
        tracing::info!(
            session_id = self.session.id,
            version,
            flags = ?self.committed,
            kept_previous = ?unjudged,
            "results committed"
        );
        Ok(())
    }
}
