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


//! Guest physical memory.

mod map;
mod region;

mod address;
mod size;

pub use address::*;
pub use map::*;
pub use region::*;
pub use size::*;

use thiserror::Error;

/// Default guest physical address to load a program to.
pub const KERNEL_ADDRESS: u64 = 0x4008_0000;

// Default starting offset of DRAM inside the physical address space.
pub const PHYS_MEM_START: u64 = 0x4000_0000;

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum MemoryAccessError {
    #[error("address {address} is not mapped")]
    Unmapped { address: Address },
    #[error("address {address} is read-only")]
    ReadOnly { address: Address },
    #[error("access of {len} bytes at {address} overflows the address space")]
    Overflow { address: Address, len: usize },
}

impl MemoryAccessError {
    pub const fn address(&self) -> Address {
        match self {
            Self::Unmapped { address }
            | Self::ReadOnly { address }
            | Self::Overflow { address, .. } => *address,
        }
    }
}
