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


use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{Cursor, Read, Write},
    rc::Rc,
    time::Duration,
};

use simgdb::{
    arch::ArchKind,
    config::GdbConfig,
    machine::Machine,
    memory::{Address, MemoryMap, MemoryRegion, MemorySize},
    packet::frame,
    remote_gdb::RemoteGdb,
    transport::Transport,
};

#[macro_export]
macro_rules! assert_hex_eq {
    ($left: expr, $right: expr$(,)?) => {{
        let left: u64 = $left;
        let right: u64 = $right;
        assert_eq!(
            left,
            right,
            "Comparing {left_s} with {right_s} failed:\n0x{left:016x} {left_s}\n0x{right:016x} \
             {right_s}",
            left_s = stringify!($left),
            right_s = stringify!($right),
            left = left,
            right = right,
        );
    }};
}

/// A transport that replays scripted input and records everything written.
///
/// Input comes in stages. Only the first one is available at the start; each
/// following stage arrives once the previous one was read completely and the
/// server sent a stop reply, like a debugger waiting for its target to stop.
pub struct MockTransport {
    input: Cursor<Vec<u8>>,
    stages: VecDeque<Vec<u8>>,
    output: Rc<RefCell<Vec<u8>>>,
}

impl MockTransport {
    pub fn new(input: Vec<u8>) -> (Self, Rc<RefCell<Vec<u8>>>) {
        Self::staged(vec![input])
    }

    pub fn staged(stages: Vec<Vec<u8>>) -> (Self, Rc<RefCell<Vec<u8>>>) {
        let mut stages = VecDeque::from(stages);
        let output = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                input: Cursor::new(stages.pop_front().unwrap_or_default()),
                stages,
                output: Rc::clone(&output),
            },
            output,
        )
    }

    fn exhausted(&self) -> bool {
        self.input.position() >= self.input.get_ref().len() as u64
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let stop_reply = matches!(buf, [b'$', b'S' | b'T' | b'W', ..]);
        if stop_reply && self.exhausted() {
            if let Some(next) = self.stages.pop_front() {
                self.input = Cursor::new(next);
            }
        }
        self.output.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Transport for MockTransport {
    fn set_read_timeout(&mut self, _: Option<Duration>) -> std::io::Result<()> {
        Ok(())
    }

    fn poll_readable(&self, _: Option<Duration>) -> std::io::Result<bool> {
        Ok(!self.exhausted())
    }
}

/// Frames `packets` as a debugger session that first turns acknowledgements
/// off, so no `+` has to be scripted for the server's replies.
#[allow(dead_code)]
pub fn script(packets: &[&str]) -> Vec<u8> {
    let mut input = frame(b"QStartNoAckMode");
    // Acknowledges the `OK` reply, which is still sent in ack mode.
    input.push(b'+');
    for packet in packets {
        input.extend(frame(packet.as_bytes()));
    }
    input
}

/// Frames `packets` for a later stage of a session.
#[allow(dead_code)]
pub fn frames(packets: &[&str]) -> Vec<u8> {
    packets
        .iter()
        .flat_map(|packet| frame(packet.as_bytes()))
        .collect()
}

/// Splits the server's output into reply payloads, dropping acknowledgements
/// and the reply to `QStartNoAckMode`.
#[allow(dead_code)]
pub fn replies(output: &[u8]) -> Vec<String> {
    let mut replies = Vec::new();
    let mut rest = output;
    while let Some(start) = rest.iter().position(|b| *b == b'$') {
        let body = &rest[start + 1..];
        let end = body
            .iter()
            .position(|b| *b == b'#')
            .expect("unterminated packet in server output");
        let packet = frame(&body[..end]);
        assert_eq!(
            &rest[start..start + packet.len()],
            packet.as_slice(),
            "bad checksum in server output"
        );
        replies.push(String::from_utf8_lossy(&body[..end]).into_owned());
        rest = &body[end + 3..];
    }
    assert_eq!(replies.first().map(String::as_str), Some("OK"));
    replies.remove(0);
    replies
}

/// Runs a scripted session against `gdb` until the debugger resumes the target
/// or the script ends.
#[allow(dead_code)]
pub fn attach_script(gdb: &mut RemoteGdb, packets: &[&str]) -> Rc<RefCell<Vec<u8>>> {
    let (transport, output) = MockTransport::new(script(packets));
    gdb.attach(Box::new(transport));
    output
}

/// Like [`attach_script`], with further stages released by stop replies.
#[allow(dead_code)]
pub fn attach_staged(gdb: &mut RemoteGdb, stages: Vec<Vec<u8>>) -> Rc<RefCell<Vec<u8>>> {
    let (transport, output) = MockTransport::staged(stages);
    gdb.attach(Box::new(transport));
    output
}

pub const TEST_MEMORY_SIZE: u64 = 0x10000;

#[allow(dead_code)]
pub fn make_test_machine(arch: ArchKind, cpus: u32) -> (Machine, RemoteGdb) {
    make_test_machine_with_config(arch, cpus, GdbConfig::default())
}

#[allow(dead_code)]
pub fn make_test_machine_with_config(
    arch: ArchKind,
    cpus: u32,
    config: GdbConfig,
) -> (Machine, RemoteGdb) {
    let memory = MemoryMap::builder(MemorySize(MemorySize::GiB))
        .with_region(
            MemoryRegion::new(
                "ram",
                MemorySize::new(TEST_MEMORY_SIZE).unwrap(),
                Address(0),
            )
            .unwrap(),
        )
        .unwrap()
        .build();
    let arch = arch.build();
    let machine = Machine::new(arch.as_ref(), memory, cpus, Address(0));
    let mut gdb = RemoteGdb::new(config, arch);
    machine.register(&mut gdb).unwrap();
    (machine, gdb)
}
