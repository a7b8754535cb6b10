// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the simgdb project.

//! Software and hardware breakpoint bookkeeping.
//!
//! Breakpoints form a set keyed by `(address, length, kind)`: inserting one
//! that already exists and removing one that does not are both no-ops.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::{
    arch::TargetArch,
    context::ExecutionContext,
    memory::{Address, MemoryAccessError},
};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BreakpointKind {
    /// Trap instruction written over guest memory.
    Soft,
    /// Address hook checked on instruction fetch.
    Hard,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Breakpoint {
    pub addr: Address,
    pub len: usize,
    pub kind: BreakpointKind,
}

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum BreakpointError {
    #[error("invalid breakpoint length {0}")]
    InvalidLength(usize),
    #[error(transparent)]
    Memory(#[from] MemoryAccessError),
}

#[derive(Debug, Default)]
pub struct Breakpoints {
    /// Soft breakpoints own the bytes they replaced.
    entries: FxHashMap<Breakpoint, Vec<u8>>,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, bp: &Breakpoint) -> bool {
        self.entries.contains_key(bp)
    }

    pub fn insert_soft(
        &mut self,
        arch: &dyn TargetArch,
        ctx: &mut dyn ExecutionContext,
        addr: Address,
        len: usize,
    ) -> Result<(), BreakpointError> {
        let trap = arch
            .breakpoint_instruction(len)
            .ok_or(BreakpointError::InvalidLength(len))?;
        let bp = Breakpoint {
            addr,
            len,
            kind: BreakpointKind::Soft,
        };
        if self.entries.contains_key(&bp) {
            return Ok(());
        }
        let mut original = vec![0; len];
        ctx.read_mem(addr, &mut original)?;
        ctx.write_mem(addr, trap)?;
        log::debug!(target: "gdb::breakpoint", "inserted soft breakpoint at {} len {}", addr, len);
        self.entries.insert(bp, original);
        Ok(())
    }

    pub fn remove_soft(
        &mut self,
        arch: &dyn TargetArch,
        ctx: &mut dyn ExecutionContext,
        addr: Address,
        len: usize,
    ) -> Result<(), BreakpointError> {
        if !arch.check_bp_len(len) {
            return Err(BreakpointError::InvalidLength(len));
        }
        let bp = Breakpoint {
            addr,
            len,
            kind: BreakpointKind::Soft,
        };
        let Some(original) = self.entries.get(&bp) else {
            return Ok(());
        };
        ctx.write_mem(addr, original)?;
        self.entries.remove(&bp);
        log::debug!(target: "gdb::breakpoint", "removed soft breakpoint at {} len {}", addr, len);
        Ok(())
    }

    pub fn insert_hard(
        &mut self,
        arch: &dyn TargetArch,
        addr: Address,
        len: usize,
    ) -> Result<(), BreakpointError> {
        if !arch.check_bp_len(len) {
            return Err(BreakpointError::InvalidLength(len));
        }
        let bp = Breakpoint {
            addr,
            len,
            kind: BreakpointKind::Hard,
        };
        if self.entries.insert(bp, vec![]).is_none() {
            log::debug!(target: "gdb::breakpoint", "inserted hard breakpoint at {} len {}", addr, len);
        }
        Ok(())
    }

    pub fn remove_hard(
        &mut self,
        arch: &dyn TargetArch,
        addr: Address,
        len: usize,
    ) -> Result<(), BreakpointError> {
        if !arch.check_bp_len(len) {
            return Err(BreakpointError::InvalidLength(len));
        }
        let bp = Breakpoint {
            addr,
            len,
            kind: BreakpointKind::Hard,
        };
        if self.entries.remove(&bp).is_some() {
            log::debug!(target: "gdb::breakpoint", "removed hard breakpoint at {} len {}", addr, len);
        }
        Ok(())
    }

    /// Whether fetching from `pc` hits a hardware breakpoint.
    pub fn hard_hit(&self, pc: Address) -> bool {
        self.entries
            .keys()
            .any(|bp| bp.kind == BreakpointKind::Hard && bp.addr == pc)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.entries.keys()
    }
}
