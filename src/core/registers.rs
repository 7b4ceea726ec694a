use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::models::CANISTER_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterSpace {
    Control,
    Status,
}

impl std::fmt::Display for RegisterSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterSpace::Control => write!(f, "control"),
            RegisterSpace::Status => write!(f, "status"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("{space} register range {addr}+{count} exceeds bank size {size}")]
    OutOfRange {
        space: RegisterSpace,
        addr: u16,
        count: usize,
        size: usize,
    },

    #[error("empty {space} register access at {addr}")]
    EmptyAccess { space: RegisterSpace, addr: u16 },
}

/// Word-addressed access to a register bank.
pub trait RegisterBank: Send + Sync {
    fn read(&self, space: RegisterSpace, addr: u16, count: usize) -> Result<Vec<u16>, RegisterError>;

    fn write(&self, space: RegisterSpace, addr: u16, values: &[u16]) -> Result<(), RegisterError>;

    fn read_one(&self, space: RegisterSpace, addr: u16) -> Result<u16, RegisterError> {
        self.read(space, addr, 1)?
            .into_iter()
            .next()
            .ok_or(RegisterError::EmptyAccess { space, addr })
    }

    fn write_one(&self, space: RegisterSpace, addr: u16, value: u16) -> Result<(), RegisterError> {
        self.write(space, addr, &[value])
    }
}

struct Banks {
    control: Vec<u16>,
    status: Vec<u16>,
}

impl Banks {
    fn space_mut(&mut self, space: RegisterSpace) -> &mut Vec<u16> {
        match space {
            RegisterSpace::Control => &mut self.control,
            RegisterSpace::Status => &mut self.status,
        }
    }
}

/// In-memory register bank, zero-initialised. Both spaces sit behind one
/// mutex, so a multi-word access is never torn.
pub struct RegisterStore {
    banks: Mutex<Banks>,
    size: usize,
}

impl RegisterStore {
    /// Create a bank with `size` words in each space.
    pub fn new(size: usize) -> Self {
        Self {
            banks: Mutex::new(Banks {
                control: vec![0; size],
                status: vec![0; size],
            }),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Non-zero registers in `addr..addr+count` as `(address, value)` pairs.
    pub fn dump(&self, space: RegisterSpace, addr: u16, count: usize) -> Result<Vec<(u16, u16)>, RegisterError> {
        let values = self.read(space, addr, count)?;
        Ok(values
            .into_iter()
            .enumerate()
            .filter(|(_, v)| *v != 0)
            .map(|(i, v)| (addr + i as u16, v))
            .collect())
    }

    fn lock(&self) -> MutexGuard<'_, Banks> {
        // Words stay valid even if a holder panicked mid-access.
        self.banks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, space: RegisterSpace, addr: u16, count: usize) -> Result<std::ops::Range<usize>, RegisterError> {
        if count == 0 {
            return Err(RegisterError::EmptyAccess { space, addr });
        }
        let start = addr as usize;
        let end = start
            .checked_add(count)
            .filter(|end| *end <= self.size)
            .ok_or(RegisterError::OutOfRange {
                space,
                addr,
                count,
                size: self.size,
            })?;
        Ok(start..end)
    }
}

impl RegisterBank for RegisterStore {
    fn read(&self, space: RegisterSpace, addr: u16, count: usize) -> Result<Vec<u16>, RegisterError> {
        let range = self.check(space, addr, count)?;
        let mut banks = self.lock();
        Ok(banks.space_mut(space)[range].to_vec())
    }

    fn write(&self, space: RegisterSpace, addr: u16, values: &[u16]) -> Result<(), RegisterError> {
        let range = self.check(space, addr, values.len())?;
        let mut banks = self.lock();
        banks.space_mut(space)[range].copy_from_slice(values);
        Ok(())
    }
}

/// Addresses of every register in the handshake. Defaults follow the
/// deployed controller program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterMap {
    pub bank_size: usize,
    pub session_id: u16,
    pub phase: u16,
    pub results_version: u16,
    /// Correction flags for containers 1..=4.
    pub flags: [u16; CANISTER_COUNT],
    pub start_trigger: u16,
    pub step_request: u16,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            bank_size: 200,
            session_id: 128,
            phase: 129,
            results_version: 130,
            flags: [131, 132, 133, 134],
            start_trigger: 135,
            step_request: 136,
        }
    }
}

impl RegisterMap {
    pub fn status_addresses(&self) -> Vec<u16> {
        let mut addrs = vec![self.session_id, self.phase, self.results_version];
        addrs.extend(self.flags);
        addrs
    }

    pub fn control_addresses(&self) -> Vec<u16> {
        vec![self.start_trigger, self.step_request]
    }

    /// Every address must fit the bank and no two registers in one space may
    /// share an address.
    pub fn validate(&self) -> Result<(), String> {
        for (space, addrs) in [
            (RegisterSpace::Status, self.status_addresses()),
            (RegisterSpace::Control, self.control_addresses()),
        ] {
            for (i, addr) in addrs.iter().enumerate() {
                if *addr as usize >= self.bank_size {
                    return Err(format!(
                        "{space} register {addr} is outside the bank (size {})",
                        self.bank_size
                    ));
                }
                if addrs[..i].contains(addr) {
                    return Err(format!("{space} register {addr} is assigned twice"));
                }
            }
        }
        Ok(())
    }
}
