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


use std::{borrow::Cow, num::NonZero, path::PathBuf};

use clap::Parser;
use simgdb::{
    arch::ArchKind,
    connection::ListenAddress,
    logging::TraceItem,
    memory::{Address, MemorySize, KERNEL_ADDRESS},
};

fn maybe_hex(s: &str) -> Result<Address, Cow<'static, str>> {
    const HEX_PREFIX: &str = "0x";
    const HEX_PREFIX_UPPER: &str = "0X";
    const HEX_PREFIX_LEN: usize = HEX_PREFIX.len();

    let result = if s.starts_with(HEX_PREFIX) || s.starts_with(HEX_PREFIX_UPPER) {
        u64::from_str_radix(&s[HEX_PREFIX_LEN..], 16)
    } else {
        s.parse::<u64>()
    };

    result
        .map(Address)
        .map_err(|err| Cow::Owned(err.to_string()))
}

fn memory_size(s: &str) -> Result<MemorySize, Cow<'static, str>> {
    const SUFFIXES: &[(&str, u64)] = &[
        ("KiB", MemorySize::KiB.get()),
        ("K", MemorySize::KiB.get()),
        ("MiB", MemorySize::MiB.get()),
        ("M", MemorySize::MiB.get()),
        ("GiB", MemorySize::GiB.get()),
        ("G", MemorySize::GiB.get()),
        ("B", 1),
    ];

    fn err<A>(_: A) -> Cow<'static, str> {
        Cow::Borrowed(
            "Expected decimal or hexadecimal value, with optional suffixes: B (bytes), K/KiB \
             (Kibibytes), M/MiB (Mibibytes) or G/GiB. (A kibibyte is 1024 bytes)",
        )
    }

    let (value, unit) = match maybe_hex(s) {
        Ok(num) => (num.0, 1),
        Err(_) => {
            let &(suffix, unit) = SUFFIXES
                .iter()
                .find(|(suffix, _)| s.ends_with(suffix))
                .ok_or_else(|| err(()))?;
            (maybe_hex(&s[..s.len() - suffix.len()]).map_err(err)?.0, unit)
        }
    };
    let bytes = value
        .checked_mul(unit)
        .ok_or_else(|| Cow::Owned(format!("{s} is too large be represented in 64 bits")))?;
    MemorySize::new(bytes).ok_or(Cow::Borrowed("Memory size must be non-zero"))
}

const DEFAULT_MEMORY_SIZE: MemorySize = MemorySize(match NonZero::new(128 * MemorySize::MiB.get()) {
    Some(v) => v,
    None => unreachable!(),
});

/// Instruction-count driven simulator with a GDB remote serial protocol server
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Target architecture, determines register layout and breakpoint
    /// instructions.
    #[arg(long, value_enum, default_value_t = ArchKind::Aarch64)]
    pub arch: ArchKind,
    /// Hexadecimal or decimal value of the address to load the binary in to.
    #[arg(long, default_value_t = Address(KERNEL_ADDRESS), value_parser=maybe_hex)]
    pub start_address: Address,
    /// Non-zero hexadecimal or decimal value of the size of available physical
    /// memory to the VM.
    #[arg(long, default_value_t = DEFAULT_MEMORY_SIZE, value_parser=memory_size)]
    pub memory: MemorySize,
    /// Map a read-only region of this size at address zero.
    #[arg(long, value_parser=memory_size)]
    pub rom: Option<MemorySize>,
    /// Number of simulated CPUs.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub cpus: u32,
    /// Listen for a GDB connection on this TCP port of localhost.
    #[arg(long, conflicts_with = "gdb_socket")]
    pub gdb_port: Option<u16>,
    /// Listen for a GDB connection on this Unix domain socket path.
    #[arg(long)]
    pub gdb_socket: Option<PathBuf>,
    /// Do not start running until a debugger attaches.
    #[arg(long)]
    pub wait_gdb: bool,
    /// JSON file with debugger server settings.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Log every message of these subsystems.
    #[arg(long, value_enum, value_delimiter = ',')]
    pub trace: Vec<TraceItem>,
    /// Write log messages to this file instead of standard error.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
    /// Stop after this many committed instructions.
    #[arg(long)]
    pub max_insns: Option<u64>,

    /// Path to a raw binary image (NOT an ELF file!)
    #[arg(value_name = "BINARY")]
    pub binary: PathBuf,
}

impl Args {
    /// Parse command-line arguments from the process environment.
    pub fn parse() -> Result<Self, String> {
        let retval = <Self as clap::Parser>::parse();
        let ram = simgdb::memory::PHYS_MEM_START..simgdb::memory::PHYS_MEM_START + retval.memory.get();
        if !ram.contains(&retval.start_address.0) {
            return Err(format!(
                "Invalid arguments: Given start address {} is out of range for given memory size \
                 {}.",
                retval.start_address, retval.memory
            ));
        }
        Ok(retval)
    }

    pub fn listen_address(&self) -> Option<ListenAddress> {
        match (&self.gdb_port, &self.gdb_socket) {
            (Some(port), _) => Some(ListenAddress::Tcp(*port)),
            (None, Some(path)) => Some(ListenAddress::Unix(path.clone())),
            (None, None) => None,
        }
    }
}
