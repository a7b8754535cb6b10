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


//! The remote debugging server.
//!
//! [`RemoteGdb`] owns the connection to a debugger, the thread registry, the
//! breakpoint set and the command tables. It is driven cooperatively by the
//! simulator:
//!
//! - [`RemoteGdb::attach`] hands it an accepted connection,
//! - [`RemoteGdb::poll_incoming`] (or [`RemoteGdb::incoming_data`]) reacts to
//!   bytes arriving from the debugger,
//! - [`RemoteGdb::process_event`] delivers events fired by a context's
//!   instruction-commit queue,
//! - [`RemoteGdb::fetch_hook`] checks hardware breakpoints on instruction fetch,
//! - [`RemoteGdb::trap`] reports that a context stopped.
//!
//! While the target is stopped the server blocks in its command loop; the
//! simulation only advances after a continue or step command.

mod exec;
mod handlers;

use std::sync::Arc;

use gdbstub::common::Signal;

use crate::{
    arch::TargetArch,
    breakpoints::Breakpoints,
    commands::CommandTable,
    config::GdbConfig,
    context::{ContextHandle, ContextId},
    events::GdbEvent,
    memory::Address,
    packet::{PacketError, PacketStream},
    registry::{RegistryError, ThreadRegistry},
    transport::Transport,
};

/// What the command loop does after a command was handled.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reply {
    /// Send the payload and keep processing commands.
    Packet(Vec<u8>),
    /// Leave the command loop and let the simulation run.
    Resume,
    /// Acknowledge with `OK`, then drop the connection.
    Detach,
    /// Drop the connection without replying.
    Kill,
}

impl Reply {
    pub fn ok() -> Self {
        Self::Packet(b"OK".to_vec())
    }
}

pub struct RemoteGdb {
    config: GdbConfig,
    arch: Box<dyn TargetArch>,
    commands: Arc<CommandTable>,
    conn: Option<PacketStream<Box<dyn Transport>>>,
    /// Inside the command loop.
    active: bool,
    /// The debugger is waiting for a stop reply.
    resumed: bool,
    /// Context an interrupt trap is scheduled on.
    interrupt_target: Option<ContextId>,
    last_signal: Signal,
    threads: ThreadRegistry,
    breakpoints: Breakpoints,
    /// Acknowledgements stop after the reply to `QStartNoAckMode` is sent.
    pending_no_ack: bool,
}

impl std::fmt::Debug for RemoteGdb {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("RemoteGdb")
            .field("arch", &self.arch)
            .field("attached", &self.is_attached())
            .field("active", &self.active)
            .field("resumed", &self.resumed)
            .field("last_signal", &self.last_signal)
            .field("threads", &self.threads)
            .field("breakpoints", &self.breakpoints)
            .finish_non_exhaustive()
    }
}

impl RemoteGdb {
    pub fn new(config: GdbConfig, arch: Box<dyn TargetArch>) -> Self {
        Self::with_commands(config, arch, Arc::new(CommandTable::new()))
    }

    pub fn with_commands(
        config: GdbConfig,
        arch: Box<dyn TargetArch>,
        commands: Arc<CommandTable>,
    ) -> Self {
        Self {
            config,
            arch,
            commands,
            conn: None,
            active: false,
            resumed: false,
            interrupt_target: None,
            last_signal: Signal::SIGTRAP,
            threads: ThreadRegistry::new(),
            breakpoints: Breakpoints::new(),
            pending_no_ack: false,
        }
    }

    #[inline]
    pub fn config(&self) -> &GdbConfig {
        &self.config
    }

    #[inline]
    pub fn arch(&self) -> &dyn TargetArch {
        self.arch.as_ref()
    }

    #[inline]
    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    #[inline]
    pub fn threads(&self) -> &ThreadRegistry {
        &self.threads
    }

    #[inline]
    pub fn is_attached(&self) -> bool {
        self.conn.is_some()
    }

    /// Whether the debugger let the target run and awaits a stop reply.
    #[inline]
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    #[inline]
    pub fn last_signal(&self) -> Signal {
        self.last_signal
    }

    /// Takes over an accepted connection and serves it until the debugger
    /// resumes the target or goes away. A second debugger is turned away.
    pub fn attach(&mut self, stream: Box<dyn Transport>) {
        if self.is_attached() {
            log::warn!("rejecting connection: a debugger is already attached");
            return;
        }
        self.conn = Some(PacketStream::new(stream, &self.config));
        self.resumed = false;
        self.pending_no_ack = false;
        log::info!("remote gdb attached");
        self.process_commands();
    }

    /// Drops the connection. Breakpoints and the registry are kept, pending
    /// single-steps and interrupts are cancelled.
    pub fn detach(&mut self) {
        if self.conn.take().is_none() {
            return;
        }
        if let Some(id) = self.interrupt_target.take() {
            self.deschedule_inst_commit_event(
                id,
                &GdbEvent::Trap {
                    id,
                    signal: Signal::SIGINT,
                },
            );
        }
        if let Some(id) = self.threads.selected_id() {
            self.clear_single_step(id);
        }
        self.resumed = false;
        self.pending_no_ack = false;
        log::info!("remote gdb detached");
    }

    pub fn add_thread_context(&mut self, ctx: ContextHandle) -> Result<ContextId, RegistryError> {
        self.threads.add(ctx)
    }

    pub fn replace_thread_context(
        &mut self,
        ctx: ContextHandle,
    ) -> Result<ContextHandle, RegistryError> {
        self.threads.replace(ctx)
    }

    pub fn select_thread_context(&mut self, id: ContextId) -> bool {
        self.threads.select(id)
    }

    /// Reports that context `id` stopped with `signal`.
    ///
    /// The context becomes the selected one and the signal the last stop
    /// reason. If a debugger is attached it receives a stop reply and the
    /// command loop runs until the target is resumed again. Returns whether a
    /// debugger was there to see it.
    pub fn trap(&mut self, id: ContextId, signal: Signal) -> bool {
        if let Some(target) = self.interrupt_target.take() {
            self.deschedule_inst_commit_event(
                target,
                &GdbEvent::Trap {
                    id: target,
                    signal: Signal::SIGINT,
                },
            );
        }
        if !self.threads.select(id) {
            log::warn!(target: "gdb::thread", "ignoring trap from unregistered {}", id);
            return false;
        }
        self.last_signal = signal;
        self.clear_single_step(id);
        if !self.is_attached() {
            log::debug!(target: "gdb::event", "{} stopped with {:?} but no debugger is attached", id, signal);
            return false;
        }
        log::debug!(target: "gdb::event", "{} stopped with {:?}", id, signal);
        if self.resumed {
            self.resumed = false;
            let reply = self.stop_reply(id, signal);
            if let Err(err) = self.send(reply.as_bytes()) {
                log::error!("could not send stop reply: {}", err);
                self.detach();
                return false;
            }
        }
        self.process_commands();
        true
    }

    /// Reacts to bytes from the debugger. A stopped target processes the
    /// commands right away. A running target is interrupted at its next
    /// committed instruction, or immediately if it is not executing.
    pub fn incoming_data(&mut self) {
        if !self.is_attached() || self.active {
            return;
        }
        if !self.resumed {
            self.process_commands();
            return;
        }
        if self.interrupt_target.is_some() {
            return;
        }
        let Some(ctx) = self.threads.selected().cloned() else {
            // Nothing to stop; answer the interrupt directly.
            self.resumed = false;
            self.last_signal = Signal::SIGINT;
            let reply = format!("S{:02x}", Signal::SIGINT.0);
            match self.send(reply.as_bytes()) {
                Ok(()) => self.process_commands(),
                Err(err) => {
                    log::error!("could not send stop reply: {}", err);
                    self.detach();
                }
            }
            return;
        };
        let id = ctx.borrow().id();
        let runnable = ctx.borrow().status() == crate::context::ContextStatus::Active;
        if !runnable {
            self.trap(id, Signal::SIGINT);
            return;
        }
        log::debug!(target: "gdb::event", "interrupt requested, stopping {}", id);
        self.schedule_inst_commit_event(
            id,
            GdbEvent::Trap {
                id,
                signal: Signal::SIGINT,
            },
            0,
        );
        self.interrupt_target = Some(id);
    }

    /// Checks the connection for pending input and handles it. Returns `true`
    /// if there was any.
    pub fn poll_incoming(&mut self) -> bool {
        let readable = match self.conn.as_ref().map(|conn| conn.poll_readable(None)) {
            None => return false,
            Some(Ok(readable)) => readable,
            Some(Err(err)) => {
                log::error!("polling debugger connection failed: {}", err);
                self.detach();
                return false;
            }
        };
        if readable {
            self.incoming_data();
        }
        readable
    }

    /// Handles an event fired by context `id`'s instruction-commit queue.
    /// Returns whether a debugger saw the resulting stop.
    pub fn process_event(&mut self, id: ContextId, event: GdbEvent) -> bool {
        match event {
            GdbEvent::SingleStep => self.single_step(id),
            // An interrupt fired in the same commit as another stop was already
            // answered by that stop.
            GdbEvent::Trap { id, signal }
                if signal == Signal::SIGINT && self.interrupt_target != Some(id) =>
            {
                log::trace!(target: "gdb::event", "stale interrupt on {}", id);
                false
            }
            GdbEvent::Trap { id, signal } => self.trap(id, signal),
        }
    }

    /// Called before context `id` fetches the instruction at `pc`. Returns
    /// `None` when no hardware breakpoint matches, otherwise whether a
    /// debugger saw the stop. An unseen stop is only recorded and the context
    /// may go on fetching.
    pub fn fetch_hook(&mut self, id: ContextId, pc: Address) -> Option<bool> {
        if !self.breakpoints.hard_hit(pc) {
            return None;
        }
        log::debug!(target: "gdb::breakpoint", "{} hit hardware breakpoint at {}", id, pc);
        Some(self.trap(id, Signal::SIGTRAP))
    }

    fn stop_reply(&self, id: ContextId, signal: Signal) -> String {
        if self.threads.len() > 1 {
            format!("T{:02x}thread:{:x};", signal.0, id.thread_id())
        } else {
            format!("S{:02x}", signal.0)
        }
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), PacketError> {
        match self.conn.as_mut() {
            Some(conn) => conn.send(payload),
            None => Ok(()),
        }
    }

    /// The receive, dispatch, reply loop. Runs until the target is resumed or
    /// the connection goes away.
    fn process_commands(&mut self) {
        if self.active {
            return;
        }
        self.active = true;
        while let Some(conn) = self.conn.as_mut() {
            let payload = match conn.recv() {
                Ok(payload) => payload,
                Err(PacketError::Eof) => {
                    log::info!("debugger closed the connection");
                    self.detach();
                    break;
                }
                Err(err) => {
                    log::error!("receiving packet failed: {}", err);
                    self.detach();
                    break;
                }
            };
            let reply = match self.dispatch(&payload) {
                Ok(Reply::Packet(reply)) => reply,
                Ok(Reply::Resume) => {
                    self.resumed = true;
                    break;
                }
                Ok(Reply::Detach) => {
                    if let Err(err) = self.send(b"OK") {
                        log::warn!("could not acknowledge detach: {}", err);
                    }
                    self.detach();
                    break;
                }
                Ok(Reply::Kill) => {
                    log::info!("debugger requested kill");
                    self.detach();
                    break;
                }
                Err(err) => {
                    log::debug!(target: "gdb::command", "{:?} failed: {}", String::from_utf8_lossy(&payload), err);
                    err.reply()
                }
            };
            if let Err(err) = self.send(&reply) {
                log::error!("sending reply failed: {}", err);
                self.detach();
                break;
            }
            if std::mem::take(&mut self.pending_no_ack) {
                if let Some(conn) = self.conn.as_mut() {
                    conn.set_no_ack(true);
                }
            }
        }
        self.active = false;
    }
}
