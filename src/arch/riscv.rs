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


use std::borrow::Cow;

use gdbstub::arch::{Arch, Registers};
use gdbstub_arch::riscv::reg::RiscvCoreRegs;

use super::{serialize, serialized_len, RegCache, RegCacheError, TargetArch};
use crate::context::ExecutionContext;

/// `ebreak`
pub const EBREAK: [u8; 4] = [0x73, 0x00, 0x10, 0x00];
/// `c.ebreak`
pub const C_EBREAK: [u8; 2] = [0x02, 0x90];

pub const PC: usize = 32;
pub const NUM_REGS: usize = PC + 1;

#[derive(Clone, Copy, Debug, Default)]
pub struct Riscv64;

impl RegCache for Riscv64 {
    fn name(&self) -> &'static str {
        "riscv64"
    }

    fn size(&self) -> usize {
        serialized_len(&RiscvCoreRegs::<u64>::default())
    }

    fn get_regs(&self, ctx: &dyn ExecutionContext) -> Vec<u8> {
        let mut regs = RiscvCoreRegs::<u64>::default();
        for (i, x) in regs.x.iter_mut().enumerate() {
            *x = ctx.read_reg(i);
        }
        // x0 is hardwired to zero.
        regs.x[0] = 0;
        regs.pc = ctx.read_reg(PC);
        serialize(&regs)
    }

    fn set_regs(&self, ctx: &mut dyn ExecutionContext, blob: &[u8]) -> Result<(), RegCacheError> {
        let size_err = RegCacheError::Size {
            arch: RegCache::name(self),
            expected: self.size(),
            got: blob.len(),
        };
        if blob.len() != self.size() {
            return Err(size_err);
        }
        let mut regs = RiscvCoreRegs::<u64>::default();
        regs.gdb_deserialize(blob).map_err(|()| size_err)?;
        for (i, x) in regs.x.iter().enumerate().skip(1) {
            ctx.write_reg(i, *x);
        }
        ctx.write_reg(PC, regs.pc);
        Ok(())
    }
}

impl TargetArch for Riscv64 {
    fn name(&self) -> &'static str {
        "riscv64"
    }

    fn reg_cache(&self) -> &dyn RegCache {
        self
    }

    fn num_regs(&self) -> usize {
        NUM_REGS
    }

    fn pc_index(&self) -> usize {
        PC
    }

    fn breakpoint_instruction(&self, len: usize) -> Option<&'static [u8]> {
        match len {
            2 => Some(&C_EBREAK),
            4 => Some(&EBREAK),
            _ => None,
        }
    }

    fn trap_instruction(&self) -> &'static [u8] {
        &EBREAK
    }

    fn xfer_features_read(&self, annex: &str) -> Option<Cow<'static, str>> {
        match annex {
            "target.xml" => {
                gdbstub_arch::riscv::Riscv64::target_description_xml().map(Cow::Borrowed)
            }
            _ => None,
        }
    }
}
