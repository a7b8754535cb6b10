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


//! Architecture capabilities: register cache encoding, trap instructions and
//! target descriptions.

pub mod aarch64;
pub mod riscv;

use std::borrow::Cow;

pub use aarch64::Aarch64;
pub use riscv::Riscv64;
use serde_derive::Deserialize;
use thiserror::Error;

use crate::context::ExecutionContext;

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum RegCacheError {
    #[error("register blob is {got} bytes, {arch} expects {expected}")]
    Size {
        arch: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Converts between a context's register file and the raw register blob of the
/// `g`/`G` packets.
pub trait RegCache {
    fn name(&self) -> &'static str;

    /// Size in bytes of the register blob.
    fn size(&self) -> usize;

    fn get_regs(&self, ctx: &dyn ExecutionContext) -> Vec<u8>;

    fn set_regs(&self, ctx: &mut dyn ExecutionContext, blob: &[u8]) -> Result<(), RegCacheError>;
}

pub trait TargetArch: std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn reg_cache(&self) -> &dyn RegCache;

    /// Number of registers in the context's register numbering.
    fn num_regs(&self) -> usize;

    fn pc_index(&self) -> usize;

    /// The instruction written over memory by a software breakpoint of length
    /// `len`, or `None` if `len` is not a valid breakpoint kind.
    fn breakpoint_instruction(&self, len: usize) -> Option<&'static [u8]>;

    /// The canonical trap instruction.
    fn trap_instruction(&self) -> &'static [u8];

    fn check_bp_len(&self, len: usize) -> bool {
        self.breakpoint_instruction(len).is_some()
    }

    /// Extra `qSupported` features.
    fn available_features(&self) -> Vec<String> {
        vec!["qXfer:features:read+".to_string()]
    }

    /// Contents of the `qXfer:features:read` object named `annex`.
    fn xfer_features_read(&self, annex: &str) -> Option<Cow<'static, str>>;

    fn pc(&self, ctx: &dyn ExecutionContext) -> u64 {
        ctx.read_reg(self.pc_index())
    }

    fn set_pc(&self, ctx: &mut dyn ExecutionContext, value: u64) {
        ctx.write_reg(self.pc_index(), value);
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ArchKind {
    #[default]
    Aarch64,
    Riscv64,
}

impl ArchKind {
    pub fn build(self) -> Box<dyn TargetArch> {
        match self {
            Self::Aarch64 => Box::new(Aarch64),
            Self::Riscv64 => Box::new(Riscv64),
        }
    }
}

/// Size of the blob produced by serializing `regs`.
fn serialized_len<R: gdbstub::arch::Registers>(regs: &R) -> usize {
    let mut len = 0;
    regs.gdb_serialize(|_| len += 1);
    len
}

fn serialize<R: gdbstub::arch::Registers>(regs: &R) -> Vec<u8> {
    let mut out = Vec::new();
    // Unavailable registers are sent as zeroes.
    regs.gdb_serialize(|byte| out.push(byte.unwrap_or(0)));
    out
}
