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


//! A minimal simulated machine to host the debugger server.
//!
//! Every instruction is a no-op that advances the program counter, except the
//! architecture's trap instructions which stop the CPU as a breakpoint would.
//! Time is measured in committed instructions.

use std::{cell::RefCell, rc::Rc, time::Duration};

use gdbstub::common::Signal;

use crate::{
    arch::TargetArch,
    connection::GdbListener,
    context::{ContextHandle, ContextId, ContextStatus, ExecutionContext},
    events::{EventQueue, GdbEvent, InstEventQueue},
    memory::*,
    registry::RegistryError,
    remote_gdb::RemoteGdb,
};

const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Outcome of executing one instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    Executed,
    /// The instruction at the program counter is a trap instruction.
    Breakpoint,
    /// Fetching the instruction failed.
    Fault(MemoryAccessError),
    /// The CPU is not running.
    Idle,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunExit {
    InstructionLimit,
    /// Every CPU halted.
    Halted,
    /// Nothing can run and nobody can attach to change that.
    Idle,
}

pub struct SimpleCpu {
    id: ContextId,
    status: ContextStatus,
    regs: Vec<u64>,
    pc_index: usize,
    memory: Rc<RefCell<MemoryMap>>,
    events: InstEventQueue,
    single_step: bool,
    traps: Vec<&'static [u8]>,
}

impl std::fmt::Debug for SimpleCpu {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("SimpleCpu")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("pc", &Address(self.pc()))
            .field("single_step", &self.single_step)
            .finish_non_exhaustive()
    }
}

impl SimpleCpu {
    pub fn new(
        id: ContextId,
        arch: &dyn TargetArch,
        memory: Rc<RefCell<MemoryMap>>,
        entry: Address,
    ) -> Self {
        let mut regs = vec![0; arch.num_regs()];
        regs[arch.pc_index()] = entry.0;
        let mut traps: Vec<&'static [u8]> = vec![arch.trap_instruction()];
        traps.extend((1..=4).filter_map(|len| arch.breakpoint_instruction(len)));
        traps.dedup();
        Self {
            id,
            status: ContextStatus::Unallocated,
            regs,
            pc_index: arch.pc_index(),
            memory,
            events: InstEventQueue::new(),
            single_step: false,
            traps,
        }
    }

    #[inline]
    pub fn pc(&self) -> u64 {
        self.regs[self.pc_index]
    }

    #[inline]
    pub fn set_pc(&mut self, value: u64) {
        self.regs[self.pc_index] = value;
    }

    pub fn execute(&mut self) -> Step {
        if self.status != ContextStatus::Active {
            return Step::Idle;
        }
        let pc = Address(self.pc());
        let mut insn = [0; 4];
        let fetched = {
            let memory = self.memory.borrow();
            // Compressed instructions are two bytes long and may sit at the very
            // end of memory.
            memory
                .read(pc, &mut insn)
                .map(|()| 4)
                .or_else(|err| memory.read(pc, &mut insn[..2]).map(|()| 2).map_err(|_| err))
        };
        let len = match fetched {
            Ok(len) => len,
            Err(err) => return Step::Fault(err),
        };
        if self.traps.iter().any(|trap| insn[..len].starts_with(trap)) {
            return Step::Breakpoint;
        }
        self.set_pc(pc.0.wrapping_add(4));
        Step::Executed
    }

    /// Commits the instruction just executed and returns the events that fired.
    pub fn commit(&mut self) -> Vec<GdbEvent> {
        self.events.commit()
    }
}

impl ExecutionContext for SimpleCpu {
    fn id(&self) -> ContextId {
        self.id
    }

    fn status(&self) -> ContextStatus {
        self.status
    }

    fn set_status(&mut self, status: ContextStatus) {
        self.status = status;
    }

    fn read_reg(&self, index: usize) -> u64 {
        self.regs.get(index).copied().unwrap_or_default()
    }

    fn write_reg(&mut self, index: usize, value: u64) {
        if let Some(reg) = self.regs.get_mut(index) {
            *reg = value;
        }
    }

    fn read_mem(&self, addr: Address, buf: &mut [u8]) -> Result<(), MemoryAccessError> {
        self.memory.borrow().read(addr, buf)
    }

    fn write_mem(&mut self, addr: Address, data: &[u8]) -> Result<(), MemoryAccessError> {
        self.memory.borrow_mut().write(addr, data)
    }

    fn single_step(&self) -> bool {
        self.single_step
    }

    fn set_single_step(&mut self, value: bool) {
        self.single_step = value;
    }

    fn event_queue(&mut self) -> &mut dyn EventQueue {
        &mut self.events
    }

    fn memory_map(&self) -> Vec<MemoryRegionDescription> {
        self.memory.borrow().descriptions()
    }
}

/// Builds the default guest memory layout: RAM at [`PHYS_MEM_START`] and, if
/// requested, a read-only region at address zero.
pub fn default_memory_map(
    ram: MemorySize,
    rom: Option<MemorySize>,
) -> Result<MemoryMap, Box<dyn std::error::Error>> {
    let end = PHYS_MEM_START
        .checked_add(ram.get())
        .ok_or("memory size does not fit the address space")?;
    let max_size = MemorySize::new(end).ok_or("empty address space")?;
    let mut builder = MemoryMap::builder(max_size);
    if let Some(rom) = rom {
        builder.add_region(MemoryRegion::new("rom", rom, Address(0))?.with_read_only(true))?;
    }
    builder.add_region(MemoryRegion::new("ram", ram, Address(PHYS_MEM_START))?)?;
    Ok(builder.build())
}

pub struct Machine {
    pub memory: Rc<RefCell<MemoryMap>>,
    pub cpus: Vec<Rc<RefCell<SimpleCpu>>>,
    /// CPUs suspended because they stopped with no debugger attached.
    parked: Vec<ContextId>,
    insns: u64,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("Machine")
            .field("cpus", &self.cpus)
            .field("parked", &self.parked)
            .field("insns", &self.insns)
            .finish_non_exhaustive()
    }
}

impl Machine {
    /// Creates `cpus` active CPUs starting at `entry`.
    pub fn new(arch: &dyn TargetArch, memory: MemoryMap, cpus: u32, entry: Address) -> Self {
        let memory = Rc::new(RefCell::new(memory));
        let cpus = (0..cpus)
            .map(|id| {
                let mut cpu = SimpleCpu::new(ContextId(id), arch, Rc::clone(&memory), entry);
                cpu.set_status(ContextStatus::Active);
                Rc::new(RefCell::new(cpu))
            })
            .collect();
        Self {
            memory,
            cpus,
            parked: vec![],
            insns: 0,
        }
    }

    /// Load code to physical memory address.
    pub fn load_code(
        &mut self,
        input: &[u8],
        address: Address,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if input.is_empty() {
            log::info!("Called `load_code` with empty slice which does nothing.");
            return Ok(());
        }
        self.memory.borrow_mut().load(address, input).map_err(|err| {
            format!(
                "Cannot load {} bytes to address {}: {}",
                input.len(),
                address,
                err
            )
        })?;
        Ok(())
    }

    /// Registers every CPU with the debugger server.
    pub fn register(&self, gdb: &mut RemoteGdb) -> Result<(), RegistryError> {
        for cpu in &self.cpus {
            let handle: ContextHandle = cpu.clone();
            gdb.add_thread_context(handle)?;
        }
        Ok(())
    }

    #[inline]
    pub fn instructions(&self) -> u64 {
        self.insns
    }

    pub fn cpu(&self, id: ContextId) -> Option<&Rc<RefCell<SimpleCpu>>> {
        self.cpus.iter().find(|cpu| cpu.borrow().id() == id)
    }

    fn park(&mut self, id: ContextId) {
        let Some(cpu) = self.cpu(id).cloned() else {
            return;
        };
        if cpu.borrow_mut().suspend().is_ok() {
            log::info!("{} stopped with no debugger attached, waiting for one", id);
            self.parked.push(id);
        }
    }

    /// Lets CPUs parked while no debugger was attached run again.
    pub fn unpark(&mut self) {
        for id in std::mem::take(&mut self.parked) {
            if let Some(cpu) = self.cpu(id) {
                if let Err(err) = cpu.borrow_mut().activate() {
                    log::warn!("{}", err);
                }
            }
        }
    }

    /// Runs one instruction on every CPU. Returns `false` if no CPU could run.
    pub fn tick(&mut self, gdb: &mut RemoteGdb) -> bool {
        let mut ran = false;
        for cpu in self.cpus.clone() {
            let (id, pc, active) = {
                let cpu = cpu.borrow();
                (cpu.id(), cpu.pc(), cpu.status() == ContextStatus::Active)
            };
            if !active {
                continue;
            }
            ran = true;
            // A hardware breakpoint leaves memory intact, so with nobody to
            // report to the instruction still runs.
            if gdb.fetch_hook(id, Address(pc)) == Some(true) {
                continue;
            }
            let step = cpu.borrow_mut().execute();
            match step {
                Step::Executed => {
                    self.insns += 1;
                    let events = cpu.borrow_mut().commit();
                    for event in events {
                        gdb.process_event(id, event);
                    }
                }
                Step::Breakpoint => {
                    // A trap instruction cannot make progress on its own.
                    if !gdb.trap(id, Signal::SIGTRAP) && !gdb.is_attached() {
                        self.park(id);
                    }
                }
                Step::Fault(err) => {
                    log::error!("{} halted: {}", id, err);
                    if let Err(err) = cpu.borrow_mut().halt() {
                        log::warn!("{}", err);
                    }
                    gdb.trap(id, Signal::SIGSEGV);
                }
                Step::Idle => {}
            }
        }
        ran
    }

    fn all_halted(&self) -> bool {
        self.cpus
            .iter()
            .all(|cpu| cpu.borrow().status() == ContextStatus::Halted)
    }

    /// Drives the simulation: accepts a debugger when one connects, forwards
    /// its input and steps the CPUs round-robin.
    pub fn run(
        &mut self,
        gdb: &mut RemoteGdb,
        listener: Option<&GdbListener>,
        max_insns: Option<u64>,
    ) -> std::io::Result<RunExit> {
        loop {
            if let Some(listener) = listener.filter(|_| !gdb.is_attached()) {
                if let Some(stream) = listener.accept()? {
                    self.unpark();
                    gdb.attach(stream);
                }
            }
            gdb.poll_incoming();
            let ran = self.tick(gdb);
            if max_insns.is_some_and(|max| self.insns >= max) {
                log::info!("instruction limit of {} reached", self.insns);
                return Ok(RunExit::InstructionLimit);
            }
            if ran {
                continue;
            }
            if !gdb.is_attached() {
                if self.all_halted() {
                    return Ok(RunExit::Halted);
                }
                if listener.is_none() {
                    return Ok(RunExit::Idle);
                }
            }
            std::thread::sleep(IDLE_SLEEP);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{Aarch64, Riscv64};

    fn memory() -> MemoryMap {
        MemoryMap::builder(MemorySize(MemorySize::MiB))
            .with_region(
                MemoryRegion::new("ram", MemorySize::new(0x2000).unwrap(), Address(0)).unwrap(),
            )
            .unwrap()
            .build()
    }

    #[test]
    fn test_execute() {
        let machine = Machine::new(&Aarch64, memory(), 1, Address(0x100));
        let mut cpu = machine.cpus[0].borrow_mut();
        assert_eq!(cpu.execute(), Step::Executed);
        assert_eq!(cpu.pc(), 0x104);
        cpu.write_mem(Address(0x104), &crate::arch::aarch64::BRK)
            .unwrap();
        assert_eq!(cpu.execute(), Step::Breakpoint);
        assert_eq!(cpu.pc(), 0x104);
        cpu.set_pc(0x2000);
        assert!(matches!(cpu.execute(), Step::Fault(_)));
        cpu.suspend().unwrap();
        assert_eq!(cpu.execute(), Step::Idle);
    }

    #[test]
    fn test_compressed_trap() {
        let machine = Machine::new(&Riscv64, memory(), 1, Address(0x1ffe));
        let mut cpu = machine.cpus[0].borrow_mut();
        cpu.write_mem(Address(0x1ffe), &crate::arch::riscv::C_EBREAK)
            .unwrap();
        assert_eq!(cpu.execute(), Step::Breakpoint);
    }

    #[test]
    fn test_halted_cpus_end_the_run() {
        let arch = Aarch64;
        let mut machine = Machine::new(&arch, memory(), 2, Address(0x1ff8));
        let mut gdb = RemoteGdb::new(Default::default(), Box::new(arch));
        machine.register(&mut gdb).unwrap();
        assert_eq!(machine.run(&mut gdb, None, None).unwrap(), RunExit::Halted);
        assert_eq!(machine.instructions(), 4);
        assert_eq!(gdb.last_signal(), Signal::SIGSEGV);
    }

    #[test]
    fn test_breakpoint_parks_cpu() {
        let arch = Aarch64;
        let mut machine = Machine::new(&arch, memory(), 1, Address(0));
        machine
            .load_code(&crate::arch::aarch64::BRK, Address(0x8))
            .unwrap();
        let mut gdb = RemoteGdb::new(Default::default(), Box::new(arch));
        machine.register(&mut gdb).unwrap();
        assert_eq!(machine.run(&mut gdb, None, Some(100)).unwrap(), RunExit::Idle);
        assert_eq!(machine.instructions(), 2);
        assert_eq!(
            machine.cpus[0].borrow().status(),
            ContextStatus::Suspended
        );
        assert_eq!(gdb.last_signal(), Signal::SIGTRAP);
        machine.unpark();
        assert_eq!(machine.cpus[0].borrow().status(), ContextStatus::Active);
    }
}
