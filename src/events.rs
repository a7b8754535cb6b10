// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the simgdb project.

//! Instruction-count driven event queues.
//!
//! Time advances by committed instructions, never wall-clock time. Each
//! execution context owns a queue; the simulator calls [`InstEventQueue::commit`]
//! after every committed instruction and hands the returned events to the
//! debugger server.

use std::collections::BTreeMap;

use gdbstub::common::Signal;

use crate::context::ContextId;

/// Events the debugger server schedules on a context's instruction-commit
/// queue.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GdbEvent {
    /// Stop after the next committed instruction.
    SingleStep,
    /// Stop `id` with `signal`.
    Trap { id: ContextId, signal: Signal },
}

pub trait EventQueue: std::fmt::Debug {
    /// Number of instructions committed so far.
    fn inst_count(&self) -> u64;

    /// Schedules `event` to fire once `delta` more instructions have committed.
    /// A delta of zero fires at the next commit. An already scheduled identical
    /// event is moved.
    fn schedule(&mut self, event: GdbEvent, delta: u64);

    /// Removes `event`. Returns `false` if it was not scheduled.
    fn deschedule(&mut self, event: &GdbEvent) -> bool;

    fn scheduled(&self, event: &GdbEvent) -> bool;
}

#[derive(Debug, Default)]
pub struct InstEventQueue {
    count: u64,
    events: BTreeMap<u64, Vec<GdbEvent>>,
}

impl InstEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Records one committed instruction and returns the events that became
    /// due, in scheduling order.
    pub fn commit(&mut self) -> Vec<GdbEvent> {
        self.count += 1;
        let pending = self.events.split_off(&(self.count + 1));
        let due = std::mem::replace(&mut self.events, pending);
        let due: Vec<GdbEvent> = due.into_values().flatten().collect();
        if !due.is_empty() {
            log::trace!(target: "gdb::event", "instruction {}: firing {:?}", self.count, due);
        }
        due
    }
}

impl EventQueue for InstEventQueue {
    #[inline]
    fn inst_count(&self) -> u64 {
        self.count
    }

    fn schedule(&mut self, event: GdbEvent, delta: u64) {
        self.deschedule(&event);
        let when = self.count.saturating_add(delta.max(1));
        log::trace!(target: "gdb::event", "scheduling {:?} at instruction {}", event, when);
        self.events.entry(when).or_default().push(event);
    }

    fn deschedule(&mut self, event: &GdbEvent) -> bool {
        let Some(when) = self
            .events
            .iter()
            .find_map(|(when, events)| events.contains(event).then_some(*when))
        else {
            return false;
        };
        if let Some(events) = self.events.get_mut(&when) {
            events.retain(|e| e != event);
            if events.is_empty() {
                self.events.remove(&when);
            }
        }
        log::trace!(target: "gdb::event", "descheduled {:?}", event);
        true
    }

    fn scheduled(&self, event: &GdbEvent) -> bool {
        self.events.values().any(|events| events.contains(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_by_instruction_count() {
        let mut queue = InstEventQueue::new();
        let trap = GdbEvent::Trap {
            id: ContextId(0),
            signal: Signal::SIGTRAP,
        };
        queue.schedule(GdbEvent::SingleStep, 1);
        queue.schedule(trap, 3);
        assert!(queue.scheduled(&trap));
        assert_eq!(queue.commit(), vec![GdbEvent::SingleStep]);
        assert!(queue.commit().is_empty());
        assert_eq!(queue.commit(), vec![trap]);
        assert!(queue.is_empty());
        assert_eq!(queue.inst_count(), 3);
    }

    #[test]
    fn test_zero_delta_fires_on_next_commit() {
        let mut queue = InstEventQueue::new();
        queue.schedule(GdbEvent::SingleStep, 0);
        assert_eq!(queue.commit(), vec![GdbEvent::SingleStep]);
    }

    #[test]
    fn test_reschedule_and_deschedule() {
        let mut queue = InstEventQueue::new();
        queue.schedule(GdbEvent::SingleStep, 1);
        queue.schedule(GdbEvent::SingleStep, 2);
        assert!(queue.commit().is_empty());
        assert!(queue.deschedule(&GdbEvent::SingleStep));
        assert!(!queue.deschedule(&GdbEvent::SingleStep));
        assert!(queue.commit().is_empty());
    }
}
