use crate::models::{CanisterId, CANISTER_COUNT};

/// Progress within one inspection, as published in the phase register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    FirstCaptured,
    /// Second view captured and results committed.
    SecondCaptured,
}

impl Phase {
    pub fn as_register(&self) -> u16 {
        match self {
            Phase::Idle => 0,
            Phase::FirstCaptured => 1,
            Phase::SecondCaptured => 2,
        }
    }

    pub fn from_register(value: u16) -> Option<Self> {
        match value {
            0 => Some(Phase::Idle),
            1 => Some(Phase::FirstCaptured),
            2 => Some(Phase::SecondCaptured),
            _ => None,
        }
    }
}

/// One trigger-to-commit inspection cycle. Replaced wholesale by
/// [`InspectionSession::next`] on every new trigger.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InspectionSession {
    pub id: u16,
    pub phase: Phase,
    /// Correction flags judged in this session; `None` until judged.
    pub flags: [Option<bool>; CANISTER_COUNT],
    /// Results version; carried across sessions, bumped once per commit.
    pub version: u16,
}

impl InspectionSession {
    /// Fresh session following this one. Counters wrap at 16 bits.
    pub fn next(&self) -> Self {
        Self {
            id: self.id.wrapping_add(1),
            phase: Phase::Idle,
            flags: [None; CANISTER_COUNT],
            version: self.version,
        }
    }

    pub fn set_flag(&mut self, id: CanisterId, needs_correction: bool) -> bool {
        match flag_index(id) {
            Some(i) => {
                self.flags[i] = Some(needs_correction);
                true
            }
            None => false,
        }
    }
}

/// Array index of a container id (1-based ids).
pub fn flag_index(id: CanisterId) -> Option<usize> {
    let i = (id as usize).checked_sub(1)?;
    (i < CANISTER_COUNT).then_some(i)
}
