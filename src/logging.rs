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


//! Logger setup.
//!
//! The server logs through the `log` facade under one target per subsystem.
//! Selected targets can be forced to `trace` regardless of the base level.

use std::collections::BTreeSet;

pub use log::LevelFilter;

#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Debug, clap::ValueEnum)]
pub enum TraceItem {
    Packet,
    Command,
    Breakpoint,
    Thread,
    Event,
}

impl TraceItem {
    pub const POSSIBLE_VALUES: &[Self] = &[
        Self::Packet,
        Self::Command,
        Self::Breakpoint,
        Self::Thread,
        Self::Event,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Packet => "packet",
            Self::Command => "command",
            Self::Breakpoint => "breakpoint",
            Self::Thread => "thread",
            Self::Event => "event",
        }
    }

    /// The `log` target this item's messages are emitted under.
    pub const fn target(&self) -> &'static str {
        match self {
            Self::Packet => "gdb::packet",
            Self::Command => "gdb::command",
            Self::Breakpoint => "gdb::breakpoint",
            Self::Thread => "gdb::thread",
            Self::Event => "gdb::event",
        }
    }
}

impl std::fmt::Display for TraceItem {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.as_str())
    }
}

impl std::str::FromStr for TraceItem {
    type Err = Box<dyn std::error::Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for i in Self::POSSIBLE_VALUES.iter() {
            if i.as_str() == s {
                return Ok(*i);
            }
        }
        Err(Box::<dyn std::error::Error>::from(format!(
            "Expected one of {}",
            Self::POSSIBLE_VALUES
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<&str>>()
                .join(", ")
        )))
    }
}

#[derive(Debug)]
pub enum Output {
    Stdout,
    Stderr,
    File(std::fs::File),
}

/// Maps the number of `-v` flags to a base level.
pub const fn level_from_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn builder(log_level: LevelFilter, events: &BTreeSet<TraceItem>) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(log_level);
    // `RUST_LOG` overrides the base level but not explicitly traced items.
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    for item in events {
        builder.filter_module(item.target(), LevelFilter::Trace);
    }
    builder
}

pub fn init(
    log_level: LevelFilter,
    output: Output,
    events: BTreeSet<TraceItem>,
) -> Result<(), log::SetLoggerError> {
    let mut builder = builder(log_level, &events);
    builder.target(match output {
        Output::Stdout => env_logger::Target::Stdout,
        Output::Stderr => env_logger::Target::Stderr,
        Output::File(file) => env_logger::Target::Pipe(Box::new(file)),
    });
    builder.try_init()
}
