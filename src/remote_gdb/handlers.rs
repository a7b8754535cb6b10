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


//! Command and query handlers.

use std::{fmt::Write, sync::Arc};

use super::{Reply, RemoteGdb};
use crate::{
    commands::{CommandError, CommandKind, QueryKind},
    context::{ContextHandle, ContextId, ContextStatus},
    hex,
    memory::{Address, MemoryRegionDescription},
    packet,
};

type CommandResult = Result<Reply, CommandError>;

/// Splits `addr,len` into its parts.
fn parse_addr_len(args: &[u8]) -> Result<(Address, usize), CommandError> {
    let mut parts = args.splitn(2, |b| *b == b',');
    let (Some(addr), Some(len)) = (parts.next(), parts.next()) else {
        return Err(CommandError::Malformed("expected addr,length"));
    };
    Ok((Address(hex::parse_u64(addr)?), hex::parse_usize(len)?))
}

/// Splits `addr,len:data` into its parts.
fn parse_addr_len_data(args: &[u8]) -> Result<(Address, usize, &[u8]), CommandError> {
    let colon = args
        .iter()
        .position(|b| *b == b':')
        .ok_or(CommandError::Malformed("expected addr,length:data"))?;
    let (addr, len) = parse_addr_len(&args[..colon])?;
    Ok((addr, len, &args[colon + 1..]))
}

/// Parses the optional resume address of `c`/`s`, or the `sig;addr` argument
/// of `C`/`S`.
fn parse_resume_addr(args: &[u8], with_signal: bool) -> Result<Option<Address>, CommandError> {
    let addr = if with_signal {
        let mut parts = args.splitn(2, |b| *b == b';');
        let signal = parts.next().unwrap_or_default();
        hex::parse_u64(signal)?;
        parts.next()
    } else {
        Some(args).filter(|args| !args.is_empty())
    };
    addr.map(|addr| hex::parse_u64(addr).map(Address))
        .transpose()
        .map_err(CommandError::from)
}

/// Serves `[offset, offset + len)` of `object` as a `qXfer` reply.
pub(super) fn encode_xfer_response(object: &[u8], offset: usize, len: usize) -> Vec<u8> {
    if offset >= object.len() {
        return b"l".to_vec();
    }
    let end = offset.saturating_add(len).min(object.len());
    let mut reply = vec![if end < object.len() { b'm' } else { b'l' }];
    reply.extend(packet::escape(&object[offset..end]));
    reply
}

pub(super) fn memory_map_xml(regions: &[MemoryRegionDescription]) -> String {
    let mut memory_entries = String::new();
    for region in regions {
        let range = region.into_range();
        _ = writeln!(
            &mut memory_entries,
            "    <memory type=\"{type}\" start=\"0x{start:x}\" length=\"0x{length:x}\"/>",
            r#type = if region.read_only { "rom" } else { "ram" },
            start = range.start.0,
            length = range.end.0 - range.start.0,
        );
    }
    format!(
        r#"<?xml version="1.0"?>
<!DOCTYPE memory-map
    PUBLIC "+//IDN gnu.org//DTD GDB Memory Map V1.0//EN"
            "http://sourceware.org/gdb/gdb-memory-map.dtd">
<memory-map>
{memory_entries}</memory-map>
"#
    )
}

impl RemoteGdb {
    pub(super) fn dispatch(&mut self, payload: &[u8]) -> CommandResult {
        let Some((&first, args)) = payload.split_first() else {
            return Err(CommandError::Unsupported);
        };
        let Some(command) = self.commands.lookup(first).copied() else {
            log::debug!(target: "gdb::command", "unsupported command {:?}", String::from_utf8_lossy(payload));
            return Err(CommandError::Unsupported);
        };
        log::debug!(target: "gdb::command", "{}: {:?}", command.name, String::from_utf8_lossy(args));
        match command.kind {
            CommandKind::ReadRegs => self.cmd_reg_r(),
            CommandKind::WriteRegs => self.cmd_reg_w(args),
            CommandKind::ReadMem => self.cmd_mem_r(args),
            CommandKind::WriteMem => self.cmd_mem_w(args),
            CommandKind::WriteMemBinary => self.cmd_mem_w_binary(args),
            CommandKind::Continue => self.cmd_cont(args, false),
            CommandKind::ContinueSignal => self.cmd_cont(args, true),
            CommandKind::Step => self.cmd_step(args, false),
            CommandKind::StepSignal => self.cmd_step(args, true),
            CommandKind::InsertBreak => self.cmd_break(args, true),
            CommandKind::RemoveBreak => self.cmd_break(args, false),
            CommandKind::SetThread => self.cmd_set_thread(args),
            CommandKind::ThreadAlive => self.cmd_thread_alive(args),
            CommandKind::LastSignal => self.cmd_last_signal(),
            CommandKind::Detach => Ok(Reply::Detach),
            CommandKind::Kill => Ok(Reply::Kill),
            CommandKind::Query => self.cmd_query(args),
            CommandKind::Set => self.cmd_set(args),
        }
    }

    fn selected_ctx(&self) -> Result<ContextHandle, CommandError> {
        self.threads.selected().cloned().ok_or(CommandError::NoContext)
    }

    fn cmd_reg_r(&mut self) -> CommandResult {
        let ctx = self.selected_ctx()?;
        let blob = self.arch.reg_cache().get_regs(&*ctx.borrow());
        Ok(Reply::Packet(hex::encode(&blob).into_bytes()))
    }

    fn cmd_reg_w(&mut self, args: &[u8]) -> CommandResult {
        let ctx = self.selected_ctx()?;
        let blob = hex::decode(args)?;
        self.arch.reg_cache().set_regs(&mut *ctx.borrow_mut(), &blob)?;
        Ok(Reply::ok())
    }

    fn cmd_mem_r(&mut self, args: &[u8]) -> CommandResult {
        let ctx = self.selected_ctx()?;
        let (addr, len) = parse_addr_len(args)?;
        if len == 0 {
            // An empty payload would read as "unsupported".
            return Ok(Reply::ok());
        }
        // Each byte takes two hex digits in the reply.
        let len = len.min(self.config.packet_size / 2);
        let mut buf = vec![0; len];
        ctx.borrow().read_mem(addr, &mut buf)?;
        Ok(Reply::Packet(hex::encode(&buf).into_bytes()))
    }

    fn cmd_mem_w(&mut self, args: &[u8]) -> CommandResult {
        let ctx = self.selected_ctx()?;
        let (addr, len, data) = parse_addr_len_data(args)?;
        let data = hex::decode(data)?;
        if data.len() != len {
            return Err(CommandError::Malformed("length does not match data"));
        }
        ctx.borrow_mut().write_mem(addr, &data)?;
        Ok(Reply::ok())
    }

    fn cmd_mem_w_binary(&mut self, args: &[u8]) -> CommandResult {
        let ctx = self.selected_ctx()?;
        let (addr, len, data) = parse_addr_len_data(args)?;
        let data =
            packet::unescape(data).map_err(|_| CommandError::Malformed("bad binary escape"))?;
        if data.len() != len {
            return Err(CommandError::Malformed("length does not match data"));
        }
        if !data.is_empty() {
            ctx.borrow_mut().write_mem(addr, &data)?;
        }
        Ok(Reply::ok())
    }

    /// Shared part of continue and step: a halted context cannot run, so the
    /// debugger is told the target exited.
    fn prepare_resume(
        &mut self,
        args: &[u8],
        with_signal: bool,
    ) -> Result<Option<ContextId>, CommandError> {
        let ctx = self.selected_ctx()?;
        let addr = parse_resume_addr(args, with_signal)?;
        let mut ctx = ctx.borrow_mut();
        if ctx.status() == ContextStatus::Halted {
            log::info!(target: "gdb::command", "{} is halted and cannot resume", ctx.id());
            return Ok(None);
        }
        if let Some(addr) = addr {
            self.arch.set_pc(&mut *ctx, addr.0);
        }
        Ok(Some(ctx.id()))
    }

    fn cmd_cont(&mut self, args: &[u8], with_signal: bool) -> CommandResult {
        match self.prepare_resume(args, with_signal)? {
            Some(_) => Ok(Reply::Resume),
            None => Ok(Reply::Packet(b"W00".to_vec())),
        }
    }

    fn cmd_step(&mut self, args: &[u8], with_signal: bool) -> CommandResult {
        match self.prepare_resume(args, with_signal)? {
            Some(id) => {
                self.set_single_step(id);
                Ok(Reply::Resume)
            }
            None => Ok(Reply::Packet(b"W00".to_vec())),
        }
    }

    fn cmd_break(&mut self, args: &[u8], insert: bool) -> CommandResult {
        let mut parts = args.split(|b| *b == b',');
        let (Some(kind), Some(addr), Some(len)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CommandError::Malformed("expected type,addr,kind"));
        };
        // Conditions and commands after `;` are not supported and ignored.
        let len = len.split(|b| *b == b';').next().unwrap_or_default();
        let addr = Address(hex::parse_u64(addr)?);
        let len = hex::parse_usize(len)?;
        let arch = self.arch.as_ref();
        match (kind, insert) {
            (b"0", true) => {
                let ctx = self.selected_ctx()?;
                self.breakpoints
                    .insert_soft(arch, &mut *ctx.borrow_mut(), addr, len)?;
            }
            (b"0", false) => {
                let ctx = self.selected_ctx()?;
                self.breakpoints
                    .remove_soft(arch, &mut *ctx.borrow_mut(), addr, len)?;
            }
            (b"1", true) => self.breakpoints.insert_hard(arch, addr, len)?,
            (b"1", false) => self.breakpoints.remove_hard(arch, addr, len)?,
            // Watchpoints.
            _ => return Err(CommandError::Unsupported),
        }
        Ok(Reply::ok())
    }

    fn cmd_set_thread(&mut self, args: &[u8]) -> CommandResult {
        let Some((&op, tid)) = args.split_first() else {
            return Err(CommandError::Malformed("expected operation and thread id"));
        };
        if !matches!(op, b'g' | b'c') {
            return Err(CommandError::Malformed("unknown H operation"));
        }
        let tid = hex::parse_thread_id(tid)?;
        let Some(id) = ContextId::from_thread_id(tid) else {
            // Any or all threads: keep the current selection.
            return Ok(Reply::ok());
        };
        if !self.select_thread_context(id) {
            return Err(CommandError::UnknownThread(tid));
        }
        log::debug!(target: "gdb::thread", "selected {}", id);
        Ok(Reply::ok())
    }

    fn cmd_thread_alive(&mut self, args: &[u8]) -> CommandResult {
        let tid = hex::parse_thread_id(args)?;
        let alive = ContextId::from_thread_id(tid)
            .and_then(|id| self.threads.get(id))
            .is_some_and(|ctx| ctx.borrow().status() != ContextStatus::Halted);
        if alive {
            Ok(Reply::ok())
        } else {
            Err(CommandError::UnknownThread(tid))
        }
    }

    fn cmd_last_signal(&mut self) -> CommandResult {
        let reply = match self.threads.selected_id() {
            Some(id) => self.stop_reply(id, self.last_signal),
            None => format!("S{:02x}", self.last_signal.0),
        };
        Ok(Reply::Packet(reply.into_bytes()))
    }

    fn cmd_query(&mut self, body: &[u8]) -> CommandResult {
        let commands = Arc::clone(&self.commands);
        let Some((query, args)) = commands.lookup_query(body) else {
            log::debug!(target: "gdb::command", "unsupported query {:?}", String::from_utf8_lossy(body));
            return Err(CommandError::Unsupported);
        };
        match query.kind {
            QueryKind::Supported => self.query_supported(),
            QueryKind::CurrentThread => {
                let id = self.threads.selected_id().ok_or(CommandError::NoContext)?;
                Ok(Reply::Packet(format!("QC{:x}", id.thread_id()).into_bytes()))
            }
            QueryKind::Xfer => self.query_xfer(&args),
            QueryKind::FirstThreadInfo => {
                let page = self.config.thread_info_page_size;
                Ok(Reply::Packet(self.threads.thread_info_first(page).into_bytes()))
            }
            QueryKind::SubsequentThreadInfo => {
                let page = self.config.thread_info_page_size;
                Ok(Reply::Packet(self.threads.thread_info_next(page).into_bytes()))
            }
            QueryKind::Attached => Ok(Reply::Packet(b"1".to_vec())),
            QueryKind::Symbol => Ok(Reply::ok()),
            QueryKind::StartNoAckMode => Err(CommandError::Unsupported),
        }
    }

    fn cmd_set(&mut self, body: &[u8]) -> CommandResult {
        let commands = Arc::clone(&self.commands);
        let Some((set, _)) = commands.lookup_set(body) else {
            log::debug!(target: "gdb::command", "unsupported set {:?}", String::from_utf8_lossy(body));
            return Err(CommandError::Unsupported);
        };
        match set.kind {
            QueryKind::StartNoAckMode => {
                self.pending_no_ack = true;
                Ok(Reply::ok())
            }
            _ => Err(CommandError::Unsupported),
        }
    }

    fn query_supported(&mut self) -> CommandResult {
        let mut features = vec![
            format!("PacketSize={:x}", self.config.packet_size),
            "QStartNoAckMode+".to_string(),
            "qXfer:memory-map:read+".to_string(),
        ];
        features.extend(self.arch.available_features());
        Ok(Reply::Packet(features.join(";").into_bytes()))
    }

    fn query_xfer(&mut self, args: &[&[u8]]) -> CommandResult {
        let [object, b"read", annex, range] = args else {
            return Err(CommandError::Unsupported);
        };
        let annex = std::str::from_utf8(annex)
            .map_err(|_| CommandError::Malformed("annex is not valid UTF-8"))?;
        let (offset, len) = parse_addr_len(range)?;
        let offset = usize::try_from(offset.0)
            .map_err(|_| CommandError::Malformed("offset out of range"))?;
        let len = len.min(self.config.packet_size / 2);
        let object = match *object {
            b"features" => self
                .arch
                .xfer_features_read(annex)
                .ok_or_else(|| CommandError::UnknownAnnex(annex.to_string()))?
                .into_owned(),
            b"memory-map" => {
                if !annex.is_empty() {
                    return Err(CommandError::UnknownAnnex(annex.to_string()));
                }
                let ctx = self.selected_ctx()?;
                let regions = ctx.borrow().memory_map();
                memory_map_xml(&regions)
            }
            _ => return Err(CommandError::Unsupported),
        };
        Ok(Reply::Packet(encode_xfer_response(
            object.as_bytes(),
            offset,
            len,
        )))
    }
}
