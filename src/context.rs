//
// simgdb
//
// Copyright 2025- Manos Pitsidianakis
//
// This file is part of simgdb.
//
// simgdb is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// simgdb is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with simgdb. If not, see <http://www.gnu.org/licenses/>.
//
// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later


//! The execution contexts a debugger can inspect and control.

use std::{cell::RefCell, rc::Rc};

use thiserror::Error;

use crate::{
    events::EventQueue,
    memory::{Address, MemoryAccessError, MemoryRegionDescription},
};

/// Stable identifier of an execution context within a simulated system.
///
/// On the wire a context is named by thread id `id + 1`, since thread id `0`
/// means "any thread" and `-1` means "all threads".
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct ContextId(pub u32);

impl ContextId {
    #[inline]
    pub const fn thread_id(self) -> u64 {
        self.0 as u64 + 1
    }

    /// Returns `None` for the reserved thread ids `0` and `-1`.
    pub fn from_thread_id(tid: i64) -> Option<Self> {
        if tid <= 0 {
            return None;
        }
        u32::try_from(tid - 1).ok().map(Self)
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "ctx{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ContextStatus {
    #[default]
    Unallocated,
    Active,
    Suspended,
    Halted,
}

impl ContextStatus {
    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Unallocated -> Active <-> Suspended -> Halted`, contexts may be
    /// deallocated unless halted, and `Halted` is terminal.
    pub const fn can_become(self, next: Self) -> bool {
        use ContextStatus::*;

        matches!(
            (self, next),
            (Unallocated, Active)
                | (Active, Suspended)
                | (Suspended, Active)
                | (Active | Suspended, Halted)
                | (Active | Suspended, Unallocated)
        )
    }
}

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("{id} cannot go from {from:?} to {to:?}")]
pub struct LifecycleError {
    pub id: ContextId,
    pub from: ContextStatus,
    pub to: ContextStatus,
}

/// A simulated hardware thread.
pub trait ExecutionContext: std::fmt::Debug {
    fn id(&self) -> ContextId;

    fn status(&self) -> ContextStatus;

    /// Sets the status without validation. Use the lifecycle helpers instead.
    fn set_status(&mut self, status: ContextStatus);

    /// Reads register `index` in the architecture's register numbering.
    fn read_reg(&self, index: usize) -> u64;

    fn write_reg(&mut self, index: usize, value: u64);

    fn read_mem(&self, addr: Address, buf: &mut [u8]) -> Result<(), MemoryAccessError>;

    fn write_mem(&mut self, addr: Address, data: &[u8]) -> Result<(), MemoryAccessError>;

    fn single_step(&self) -> bool;

    fn set_single_step(&mut self, value: bool);

    fn event_queue(&mut self) -> &mut dyn EventQueue;

    /// Physical memory layout as seen by this context.
    fn memory_map(&self) -> Vec<MemoryRegionDescription> {
        vec![]
    }

    fn transition(&mut self, to: ContextStatus) -> Result<(), LifecycleError> {
        let from = self.status();
        if from == to {
            return Ok(());
        }
        if !from.can_become(to) {
            return Err(LifecycleError {
                id: self.id(),
                from,
                to,
            });
        }
        log::debug!(target: "gdb::thread", "{}: {:?} -> {:?}", self.id(), from, to);
        self.set_status(to);
        Ok(())
    }

    fn activate(&mut self) -> Result<(), LifecycleError> {
        self.transition(ContextStatus::Active)
    }

    fn suspend(&mut self) -> Result<(), LifecycleError> {
        self.transition(ContextStatus::Suspended)
    }

    fn halt(&mut self) -> Result<(), LifecycleError> {
        self.transition(ContextStatus::Halted)
    }

    fn deallocate(&mut self) -> Result<(), LifecycleError> {
        self.transition(ContextStatus::Unallocated)
    }
}

pub type ContextHandle = Rc<RefCell<dyn ExecutionContext>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id_mapping() {
        assert_eq!(ContextId(0).thread_id(), 1);
        assert_eq!(ContextId::from_thread_id(1), Some(ContextId(0)));
        assert_eq!(ContextId::from_thread_id(0x10), Some(ContextId(0xf)));
        assert_eq!(ContextId::from_thread_id(0), None);
        assert_eq!(ContextId::from_thread_id(-1), None);
    }

    #[test]
    fn test_lifecycle() {
        use ContextStatus::*;

        assert!(Unallocated.can_become(Active));
        assert!(Active.can_become(Suspended));
        assert!(Suspended.can_become(Active));
        assert!(Suspended.can_become(Halted));
        assert!(!Unallocated.can_become(Suspended));
        assert!(!Halted.can_become(Active));
        assert!(!Halted.can_become(Unallocated));
    }
}
