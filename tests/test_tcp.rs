// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the simgdb project.

use std::{
    io::{BufRead, BufReader, Read, Write},
    net::TcpStream,
    os::unix::net::UnixStream,
    time::Duration,
};

use simgdb::{
    arch::ArchKind,
    connection::{GdbListener, ListenAddress},
    packet::{frame, verify_frame, ACK},
};

mod utils;

use utils::make_test_machine;

/// Plays a debugger speaking with acknowledgements on: sends each packet,
/// expects it to be acknowledged, then reads and acknowledges the reply.
fn debugger_session<S: Read + Write>(stream: S, packets: &[&str]) -> Vec<String> {
    let mut reader = BufReader::new(stream);
    let mut replies = vec![];
    for packet in packets {
        reader.get_mut().write_all(&frame(packet.as_bytes())).unwrap();
        let mut ack = [0];
        reader.read_exact(&mut ack).unwrap();
        assert_eq!(ack[0], ACK, "{packet} was not acknowledged");

        let mut reply = vec![];
        reader.read_until(b'#', &mut reply).unwrap();
        let mut digits = [0; 2];
        reader.read_exact(&mut digits).unwrap();
        reply.extend_from_slice(&digits);
        let payload = verify_frame(&reply).unwrap();
        replies.push(String::from_utf8(payload.to_vec()).unwrap());
        reader.get_mut().write_all(&[ACK]).unwrap();
    }
    replies
}

#[test_log::test]
fn test_tcp_session() {
    let (_machine, mut gdb) = make_test_machine(ArchKind::Riscv64, 1);
    let listener = GdbListener::bind(&ListenAddress::Tcp(0)).unwrap();
    let port = listener.port().unwrap();
    assert!(listener.socket_path().is_none());

    let client = std::thread::spawn(move || {
        let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        debugger_session(stream, &["qSupported:swbreak+", "qC", "D"])
    });
    let stream = listener.accept().unwrap().expect("blocking accept");
    gdb.attach(stream);
    assert!(!gdb.is_attached());

    let replies = client.join().unwrap();
    assert!(replies[0].starts_with("PacketSize=1000;"));
    assert_eq!(replies[1..], ["QC1", "OK"]);
}

#[test_log::test]
fn test_unix_socket_session() {
    let (_machine, mut gdb) = make_test_machine(ArchKind::Aarch64, 2);
    let path = std::env::temp_dir().join(format!("simgdb-test-{}.sock", std::process::id()));
    _ = std::fs::remove_file(&path);
    let listener = GdbListener::bind(&ListenAddress::Unix(path.clone())).unwrap();
    assert_eq!(listener.socket_path(), Some(path.as_path()));
    assert_eq!(listener.port(), None);

    listener.set_nonblocking(true).unwrap();
    assert!(listener.accept().unwrap().is_none());

    let client_path = path.clone();
    let client = std::thread::spawn(move || {
        let stream = UnixStream::connect(client_path).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        debugger_session(stream, &["qfThreadInfo", "qsThreadInfo", "Hg2", "?", "D"])
    });
    let stream = loop {
        if let Some(stream) = listener.accept().unwrap() {
            break stream;
        }
        std::thread::sleep(Duration::from_millis(5));
    };
    gdb.attach(stream);

    let replies = client.join().unwrap();
    assert_eq!(replies, ["m1,2", "l", "OK", "T05thread:2;", "OK"]);

    drop(listener);
    assert!(!path.exists());
}
