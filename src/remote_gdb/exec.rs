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


//! Execution control: single-stepping and instruction-count events.

use gdbstub::common::Signal;

use super::RemoteGdb;
use crate::{context::ContextId, events::GdbEvent};

impl RemoteGdb {
    /// Schedules `event` on context `id`'s instruction-commit queue to fire
    /// after `delta` more committed instructions. Returns `false` for unknown
    /// contexts.
    pub fn schedule_inst_commit_event(&mut self, id: ContextId, event: GdbEvent, delta: u64) -> bool {
        let Some(ctx) = self.threads.get(id) else {
            return false;
        };
        ctx.borrow_mut().event_queue().schedule(event, delta);
        true
    }

    /// Removes `event` from context `id`'s queue. Returns whether it was
    /// scheduled.
    pub fn deschedule_inst_commit_event(&mut self, id: ContextId, event: &GdbEvent) -> bool {
        let Some(ctx) = self.threads.get(id) else {
            return false;
        };
        let descheduled = ctx.borrow_mut().event_queue().deschedule(event);
        descheduled
    }

    /// Arms a single step on context `id`: it stops after its next committed
    /// instruction.
    pub fn set_single_step(&mut self, id: ContextId) {
        let Some(ctx) = self.threads.get(id) else {
            return;
        };
        let mut ctx = ctx.borrow_mut();
        ctx.set_single_step(true);
        ctx.event_queue().schedule(GdbEvent::SingleStep, 1);
        log::trace!(target: "gdb::event", "{} single-step armed", id);
    }

    pub fn clear_single_step(&mut self, id: ContextId) {
        let Some(ctx) = self.threads.get(id) else {
            return;
        };
        let mut ctx = ctx.borrow_mut();
        ctx.set_single_step(false);
        ctx.event_queue().deschedule(&GdbEvent::SingleStep);
    }

    /// The single-step event of context `id` fired.
    pub(super) fn single_step(&mut self, id: ContextId) -> bool {
        let stepping = self
            .threads
            .get(id)
            .is_some_and(|ctx| ctx.borrow().single_step());
        if !stepping {
            log::trace!(target: "gdb::event", "stale single-step event on {}", id);
            return false;
        }
        self.trap(id, Signal::SIGTRAP)
    }
}
