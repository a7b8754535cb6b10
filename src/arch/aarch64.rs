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
use gdbstub_arch::aarch64::reg::AArch64CoreRegs;

use super::{serialize, serialized_len, RegCache, RegCacheError, TargetArch};
use crate::context::ExecutionContext;

/// `BRK #0`
pub const BRK: [u8; 4] = [0x00, 0x00, 0x20, 0xd4];

pub const SP: usize = 31;
pub const PC: usize = 32;
pub const CPSR: usize = 33;
/// Vector registers are exposed as pairs of 64-bit halves, low half first.
pub const V_BASE: usize = 34;
pub const FPSR: usize = V_BASE + 64;
pub const FPCR: usize = FPSR + 1;
pub const NUM_REGS: usize = FPCR + 1;

#[derive(Clone, Copy, Debug, Default)]
pub struct Aarch64;

impl Aarch64 {
    fn read(ctx: &dyn ExecutionContext) -> AArch64CoreRegs {
        let mut regs = AArch64CoreRegs::default();
        for (i, x) in regs.x.iter_mut().enumerate() {
            *x = ctx.read_reg(i);
        }
        regs.sp = ctx.read_reg(SP);
        regs.pc = ctx.read_reg(PC);
        regs.cpsr = ctx.read_reg(CPSR) as u32;
        for (i, v) in regs.v.iter_mut().enumerate() {
            let lo = ctx.read_reg(V_BASE + 2 * i);
            let hi = ctx.read_reg(V_BASE + 2 * i + 1);
            *v = (u128::from(hi) << 64) | u128::from(lo);
        }
        regs.fpsr = ctx.read_reg(FPSR) as u32;
        regs.fpcr = ctx.read_reg(FPCR) as u32;
        regs
    }

    fn write(ctx: &mut dyn ExecutionContext, regs: &AArch64CoreRegs) {
        for (i, x) in regs.x.iter().enumerate() {
            ctx.write_reg(i, *x);
        }
        ctx.write_reg(SP, regs.sp);
        ctx.write_reg(PC, regs.pc);
        ctx.write_reg(CPSR, u64::from(regs.cpsr));
        for (i, v) in regs.v.iter().enumerate() {
            ctx.write_reg(V_BASE + 2 * i, *v as u64);
            ctx.write_reg(V_BASE + 2 * i + 1, (*v >> 64) as u64);
        }
        ctx.write_reg(FPSR, u64::from(regs.fpsr));
        ctx.write_reg(FPCR, u64::from(regs.fpcr));
    }
}

impl RegCache for Aarch64 {
    fn name(&self) -> &'static str {
        "aarch64"
    }

    fn size(&self) -> usize {
        serialized_len(&AArch64CoreRegs::default())
    }

    fn get_regs(&self, ctx: &dyn ExecutionContext) -> Vec<u8> {
        serialize(&Self::read(ctx))
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
        let mut regs = AArch64CoreRegs::default();
        regs.gdb_deserialize(blob).map_err(|()| size_err)?;
        Self::write(ctx, &regs);
        Ok(())
    }
}

impl TargetArch for Aarch64 {
    fn name(&self) -> &'static str {
        "aarch64"
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
        (len == BRK.len()).then_some(&BRK)
    }

    fn trap_instruction(&self) -> &'static [u8] {
        &BRK
    }

    fn xfer_features_read(&self, annex: &str) -> Option<Cow<'static, str>> {
        match annex {
            "target.xml" => {
                gdbstub_arch::aarch64::AArch64::target_description_xml().map(Cow::Borrowed)
            }
            _ => None,
        }
    }
}
