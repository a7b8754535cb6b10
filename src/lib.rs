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


//! A GDB remote serial protocol server for simulators that advance by
//! instruction count.
//!
//! The protocol engine lives in [`remote_gdb`]; it drives execution contexts
//! through the [`context::ExecutionContext`] trait and their instruction-count
//! event queues ([`events`]). [`machine`] provides a small reference simulator
//! to host it.

pub mod arch;
pub mod breakpoints;
pub mod commands;
pub mod config;
pub mod connection;
pub mod context;
pub mod events;
pub mod hex;
pub mod logging;
pub mod machine;
pub mod memory;
pub mod packet;
pub mod registry;
pub mod remote_gdb;
pub mod transport;
