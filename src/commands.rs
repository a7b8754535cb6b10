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


//! Command and query dispatch tables.
//!
//! Top-level commands are keyed by their first byte. `q` and `Q` packets are
//! further dispatched by query name: the longest registered name that prefixes
//! the packet wins, provided it ends at a delimiter (`:`, `;`, `,`) or at the
//! end of the packet. The tables are built once and shared.

use indexmap::IndexMap;
use nix::errno::Errno;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::{
    arch::RegCacheError, breakpoints::BreakpointError, hex::HexError,
    memory::MemoryAccessError,
};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CommandKind {
    ReadRegs,
    WriteRegs,
    ReadMem,
    WriteMem,
    WriteMemBinary,
    Continue,
    ContinueSignal,
    Step,
    StepSignal,
    InsertBreak,
    RemoveBreak,
    SetThread,
    ThreadAlive,
    LastSignal,
    Detach,
    Kill,
    Query,
    Set,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Command {
    pub name: &'static str,
    pub kind: CommandKind,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum QueryKind {
    Supported,
    CurrentThread,
    Xfer,
    FirstThreadInfo,
    SubsequentThreadInfo,
    Attached,
    Symbol,
    StartNoAckMode,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct QuerySetCommand {
    pub name: &'static str,
    pub kind: QueryKind,
    /// Splits the arguments following the name, if any.
    pub sep: Option<u8>,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unsupported command")]
    Unsupported,
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
    #[error(transparent)]
    Hex(#[from] HexError),
    #[error(transparent)]
    Memory(#[from] MemoryAccessError),
    #[error(transparent)]
    Breakpoint(#[from] BreakpointError),
    #[error(transparent)]
    RegCache(#[from] RegCacheError),
    #[error("no execution context selected")]
    NoContext,
    #[error("unknown thread id {0}")]
    UnknownThread(i64),
    #[error("unknown annex {0:?}")]
    UnknownAnnex(String),
}

impl CommandError {
    pub fn errno(&self) -> Errno {
        match self {
            Self::Unsupported => Errno::ENOSYS,
            Self::Malformed(_) | Self::Hex(_) | Self::RegCache(_) => Errno::EINVAL,
            Self::Memory(_) | Self::Breakpoint(BreakpointError::Memory(_)) => Errno::EFAULT,
            Self::Breakpoint(BreakpointError::InvalidLength(_)) => Errno::EINVAL,
            Self::NoContext | Self::UnknownThread(_) => Errno::ESRCH,
            Self::UnknownAnnex(_) => Errno::ENOENT,
        }
    }

    /// The reply payload: empty for unsupported commands, `E<nn>` otherwise.
    pub fn reply(&self) -> Vec<u8> {
        match self {
            Self::Unsupported => vec![],
            other => format!("E{:02x}", other.errno() as i32 as u8).into_bytes(),
        }
    }
}

#[derive(Debug)]
pub struct CommandTable {
    commands: FxHashMap<u8, Command>,
    queries: IndexMap<&'static str, QuerySetCommand>,
    sets: IndexMap<&'static str, QuerySetCommand>,
}

impl Default for CommandTable {
    fn default() -> Self {
        use CommandKind::*;

        let commands = [
            (b'g', "read registers", ReadRegs),
            (b'G', "write registers", WriteRegs),
            (b'm', "read memory", ReadMem),
            (b'M', "write memory", WriteMem),
            (b'X', "write binary memory", WriteMemBinary),
            (b'c', "continue", Continue),
            (b'C', "continue with signal", ContinueSignal),
            (b's', "step", Step),
            (b'S', "step with signal", StepSignal),
            (b'Z', "insert breakpoint", InsertBreak),
            (b'z', "remove breakpoint", RemoveBreak),
            (b'H', "set thread", SetThread),
            (b'T', "thread alive", ThreadAlive),
            (b'?', "last signal", LastSignal),
            (b'D', "detach", Detach),
            (b'k', "kill", Kill),
            (b'q', "query", Query),
            (b'Q', "set", Set),
        ]
        .into_iter()
        .map(|(byte, name, kind)| (byte, Command { name, kind }))
        .collect();

        let queries = [
            ("Supported", QueryKind::Supported, Some(b';')),
            ("C", QueryKind::CurrentThread, None),
            ("Xfer", QueryKind::Xfer, Some(b':')),
            ("fThreadInfo", QueryKind::FirstThreadInfo, None),
            ("sThreadInfo", QueryKind::SubsequentThreadInfo, None),
            ("Attached", QueryKind::Attached, None),
            ("Symbol", QueryKind::Symbol, Some(b':')),
        ];
        let sets = [("StartNoAckMode", QueryKind::StartNoAckMode, None)];
        let table = |entries: &[(&'static str, QueryKind, Option<u8>)]| {
            entries
                .iter()
                .map(|&(name, kind, sep)| (name, QuerySetCommand { name, kind, sep }))
                .collect()
        };
        Self {
            commands,
            queries: table(&queries),
            sets: table(&sets),
        }
    }
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, byte: u8) -> Option<&Command> {
        self.commands.get(&byte)
    }

    /// Resolves a `q` packet body (without the leading `q`) to its entry and
    /// arguments.
    pub fn lookup_query<'p>(
        &self,
        body: &'p [u8],
    ) -> Option<(&QuerySetCommand, Vec<&'p [u8]>)> {
        Self::lookup_in(&self.queries, body)
    }

    /// Resolves a `Q` packet body (without the leading `Q`).
    pub fn lookup_set<'p>(&self, body: &'p [u8]) -> Option<(&QuerySetCommand, Vec<&'p [u8]>)> {
        Self::lookup_in(&self.sets, body)
    }

    fn lookup_in<'t, 'p>(
        table: &'t IndexMap<&'static str, QuerySetCommand>,
        body: &'p [u8],
    ) -> Option<(&'t QuerySetCommand, Vec<&'p [u8]>)> {
        let entry = table
            .values()
            .filter(|entry| {
                body.strip_prefix(entry.name.as_bytes())
                    .is_some_and(|rest| matches!(rest.first().copied(), None | Some(b':' | b';' | b',')))
            })
            .max_by_key(|entry| entry.name.len())?;
        let rest = &body[entry.name.len()..];
        let rest = rest.get(1..).unwrap_or_default();
        let args = match entry.sep {
            _ if rest.is_empty() => vec![],
            Some(sep) => rest.split(|b| *b == sep).collect(),
            None => vec![rest],
        };
        Some((entry, args))
    }
}
