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


use simgdb::{
    arch::{aarch64, ArchKind},
    config::GdbConfig,
    context::{ContextId, ExecutionContext},
    hex,
    memory::Address,
};

#[macro_use]
mod utils;

use utils::{attach_script, make_test_machine, make_test_machine_with_config, replies};

#[test_log::test]
fn test_read_registers() {
    let (machine, mut gdb) = make_test_machine(ArchKind::Aarch64, 1);
    {
        let mut cpu = machine.cpus[0].borrow_mut();
        cpu.write_reg(1, 0x1122_3344_5566_7788);
        cpu.set_pc(0x4008_0000);
    }
    let output = attach_script(&mut gdb, &["g"]);
    let replies = replies(&output.borrow());
    assert_eq!(replies.len(), 1);
    let blob = hex::decode(replies[0].as_bytes()).unwrap();
    assert_eq!(blob.len(), gdb.arch().reg_cache().size());
    let x1 = u64::from_le_bytes(blob[8..16].try_into().unwrap());
    assert_hex_eq!(x1, 0x1122_3344_5566_7788);
    let pc = u64::from_le_bytes(blob[256..264].try_into().unwrap());
    assert_hex_eq!(pc, 0x4008_0000);
    // The session ended with the script.
    assert!(!gdb.is_attached());
}

#[test_log::test]
fn test_write_registers() {
    let (machine, mut gdb) = make_test_machine(ArchKind::Riscv64, 1);
    let mut blob = gdb
        .arch()
        .reg_cache()
        .get_regs(&*machine.cpus[0].borrow());
    blob[8 * 5..8 * 6].copy_from_slice(&0xdead_beef_u64.to_le_bytes());
    blob[256..264].copy_from_slice(&0x400_u64.to_le_bytes());
    let write = format!("G{}", hex::encode(&blob));
    let output = attach_script(&mut gdb, &[&write, "Gabcd", "G0"]);
    assert_eq!(replies(&output.borrow()), ["OK", "E16", "E16"]);
    let cpu = machine.cpus[0].borrow();
    assert_hex_eq!(cpu.read_reg(5), 0xdead_beef);
    assert_hex_eq!(cpu.pc(), 0x400);
}

#[test_log::test]
fn test_memory_access() {
    let (machine, mut gdb) = make_test_machine(ArchKind::Aarch64, 1);
    let output = attach_script(
        &mut gdb,
        &[
            "M1000,4:deadbeef",
            "m1000,4",
            // 0x23 and 0x7d travel escaped.
            "X1004,2:}\x03}]",
            "X1004,0:",
            "m1000,6",
            "mffff,2",
            "M2000,2:00",
            "M2000,1:zz",
            "m1000",
            "m1000,0",
        ],
    );
    assert_eq!(
        replies(&output.borrow()),
        ["OK", "deadbeef", "OK", "OK", "deadbeef237d", "E0e", "E16", "E16", "E16", "OK"]
    );
    let mut buf = [0; 2];
    machine.cpus[0]
        .borrow()
        .read_mem(Address(0x1004), &mut buf)
        .unwrap();
    assert_eq!(buf, [0x23, 0x7d]);
}

#[test_log::test]
fn test_unsupported_commands() {
    let (_machine, mut gdb) = make_test_machine(ArchKind::Aarch64, 1);
    let output = attach_script(
        &mut gdb,
        &["vMustReplyEmpty", "qTStatus", "!", "Z2,1000,4", "QNonStop:1", "qAttached"],
    );
    assert_eq!(replies(&output.borrow()), ["", "", "", "", "", "1"]);
}

#[test_log::test]
fn test_supported_and_simple_queries() {
    let (_machine, mut gdb) = make_test_machine(ArchKind::Aarch64, 1);
    let output = attach_script(
        &mut gdb,
        &["qSupported:multiprocess+;swbreak+", "qSymbol::", "qC", "?"],
    );
    let replies = replies(&output.borrow());
    let features: Vec<&str> = replies[0].split(';').collect();
    assert!(features.contains(&"PacketSize=1000"), "{features:?}");
    assert!(features.contains(&"qXfer:features:read+"));
    assert!(features.contains(&"qXfer:memory-map:read+"));
    assert!(features.contains(&"QStartNoAckMode+"));
    assert_eq!(replies[1..], ["OK", "QC1", "S05"]);
}

#[test_log::test]
fn test_xfer_target_description() {
    let (_machine, mut gdb) = make_test_machine(ArchKind::Riscv64, 1);
    let expected = gdb
        .arch()
        .xfer_features_read("target.xml")
        .unwrap()
        .into_owned();
    let requests: Vec<String> = (0..expected.len() + 0x10)
        .step_by(0x10)
        .map(|offset| format!("qXfer:features:read:target.xml:{offset:x},10"))
        .collect();
    let mut packets: Vec<&str> = requests.iter().map(String::as_str).collect();
    packets.push("qXfer:features:read:other.xml:0,10");
    packets.push("qXfer:objects:read::0,10");
    let output = attach_script(&mut gdb, &packets);
    let mut replies = replies(&output.borrow());

    assert_eq!(replies.pop().unwrap(), "");
    assert_eq!(replies.pop().unwrap(), "E02");
    let mut rebuilt = String::new();
    let mut chunks = replies.iter();
    for chunk in chunks.by_ref() {
        rebuilt.push_str(&chunk[1..]);
        if chunk.starts_with('l') {
            break;
        }
        assert!(chunk.starts_with('m'));
    }
    assert_eq!(rebuilt, expected);
    // Reading past the end keeps answering with an empty last chunk.
    assert!(chunks.all(|chunk| *chunk == "l"));
}

#[test_log::test]
fn test_xfer_memory_map() {
    let (_machine, mut gdb) = make_test_machine(ArchKind::Aarch64, 1);
    let output = attach_script(
        &mut gdb,
        &["qXfer:memory-map:read::0,800", "qXfer:memory-map:read:bogus:0,800"],
    );
    let replies = replies(&output.borrow());
    assert!(replies[0].starts_with("l<?xml"));
    assert!(replies[0].contains(r#"<memory type="ram" start="0x0" length="0x10000"/>"#));
    assert_eq!(replies[1], "E02");
}

#[test_log::test]
fn test_thread_enumeration_and_selection() {
    let config = GdbConfig {
        thread_info_page_size: 2,
        ..GdbConfig::default()
    };
    let (_machine, mut gdb) = make_test_machine_with_config(ArchKind::Aarch64, 3, config);
    let output = attach_script(
        &mut gdb,
        &[
            "qfThreadInfo",
            "qsThreadInfo",
            "qsThreadInfo",
            "qfThreadInfo",
            "qC",
            "Hg3",
            "qC",
            "Hg9",
            "qC",
            "Hc0",
            "Hg-1",
            "qC",
            "Hx1",
            "T2",
            "T9",
            "?",
        ],
    );
    assert_eq!(
        replies(&output.borrow()),
        [
            "m1,2",
            "m3",
            "l",
            "m1,2",
            "QC1",
            "OK",
            "QC3",
            "E03",
            "QC3",
            "OK",
            "OK",
            "QC3",
            "E16",
            "OK",
            "E03",
            "T05thread:3;",
        ]
    );
    assert_eq!(gdb.threads().selected_id(), Some(ContextId(2)));
}

#[test_log::test]
fn test_soft_breakpoint_restores_memory() {
    let (mut machine, mut gdb) = make_test_machine(ArchKind::Aarch64, 1);
    machine
        .load_code(&[0x1f, 0x20, 0x03, 0xd5], Address(0x100))
        .unwrap();
    let brk = hex::encode(&aarch64::BRK);
    let output = attach_script(
        &mut gdb,
        &[
            "Z0,100,4",
            "m100,4",
            "Z0,100,4",
            "Z0,100,3",
            "z0,100,4",
            "m100,4",
            "z0,100,4",
            "z0,200,4",
            "Z0,fffe,4",
            "Z1,100,2",
        ],
    );
    assert_eq!(
        replies(&output.borrow()),
        [
            "OK",
            brk.as_str(),
            "OK",
            "E16",
            "OK",
            "1f2003d5",
            "OK",
            "OK",
            "E0e",
            "E16",
        ]
    );
    assert!(gdb.breakpoints().is_empty());
}

#[test_log::test]
fn test_detach_keeps_breakpoints() {
    let (machine, mut gdb) = make_test_machine(ArchKind::Aarch64, 1);
    let output = attach_script(&mut gdb, &["Z0,100,4", "Z1,200,4", "D", "g"]);
    // Nothing after the detach is processed.
    assert_eq!(replies(&output.borrow()), ["OK", "OK", "OK"]);
    assert!(!gdb.is_attached());
    assert_eq!(gdb.breakpoints().len(), 2);
    let mut buf = [0; 4];
    machine.cpus[0]
        .borrow()
        .read_mem(Address(0x100), &mut buf)
        .unwrap();
    assert_eq!(buf, aarch64::BRK);
}

#[test_log::test]
fn test_bad_checksum_is_retransmitted() {
    let (_machine, mut gdb) = make_test_machine(ArchKind::Aarch64, 1);
    let (transport, output) = utils::MockTransport::new(b"$qC#00$qC#b4+".to_vec());
    gdb.attach(Box::new(transport));
    assert_eq!(output.borrow().as_slice(), b"-+$QC1#c5");
}
