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


//! Remote serial protocol framing.
//!
//! A packet travels as `$<payload>#<checksum>` where the checksum is the sum of
//! the payload bytes modulo 256, written as two lowercase hex digits. Every
//! packet is acknowledged with `+` (accepted) or `-` (please resend) unless the
//! session switched to no-ack mode.
//!
//! ```rust
//! use simgdb::packet::{checksum, frame, verify_frame};
//!
//! assert_eq!(checksum(b"g"), 0x67);
//! assert_eq!(frame(b"g"), b"$g#67");
//! assert_eq!(verify_frame(b"$g#67").unwrap(), b"g");
//! ```

use std::{
    io::{BufRead, BufReader, ErrorKind, Read},
    time::Duration,
};

use thiserror::Error;

use crate::{config::GdbConfig, transport::Transport};

pub const START: u8 = b'$';
pub const END: u8 = b'#';
pub const ESCAPE: u8 = b'}';
pub const RUN_LENGTH: u8 = b'*';
pub const ACK: u8 = b'+';
pub const NAK: u8 = b'-';
pub const INTERRUPT: u8 = 0x03;

const ESCAPE_XOR: u8 = 0x20;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed by peer")]
    Eof,
    #[error("gave up after {0} failed transmissions")]
    RetriesExceeded(usize),
    #[error("packet of {len} bytes exceeds the limit of {limit} bytes")]
    TooLong { len: usize, limit: usize },
    #[error("malformed frame")]
    Malformed,
    #[error("checksum mismatch: computed {computed:02x}, received {received:02x}")]
    Checksum { computed: u8, received: u8 },
    #[error("dangling escape character at end of binary data")]
    DanglingEscape,
}

/// Sum of the payload bytes modulo 256.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// Wraps `payload` as `$<payload>#<checksum>`.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(START);
    out.extend_from_slice(payload);
    out.push(END);
    out.extend_from_slice(crate::hex::encode(&[checksum(payload)]).as_bytes());
    out
}

/// Checks a complete frame and returns its payload.
pub fn verify_frame(frame: &[u8]) -> Result<&[u8], PacketError> {
    let [START, rest @ ..] = frame else {
        return Err(PacketError::Malformed);
    };
    let [payload @ .., END, hi, lo] = rest else {
        return Err(PacketError::Malformed);
    };
    let received = parse_checksum([*hi, *lo]).ok_or(PacketError::Malformed)?;
    let computed = checksum(payload);
    if computed != received {
        return Err(PacketError::Checksum { computed, received });
    }
    Ok(payload)
}

fn parse_checksum(digits: [u8; 2]) -> Option<u8> {
    crate::hex::decode(&digits).ok().map(|v| v[0])
}

#[inline]
const fn needs_escape(byte: u8) -> bool {
    matches!(byte, START | END | ESCAPE | RUN_LENGTH)
}

/// Escapes binary data for transmission: `#`, `$`, `}` and `*` become `}`
/// followed by the byte xor `0x20`.
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        if needs_escape(b) {
            out.push(ESCAPE);
            out.push(b ^ ESCAPE_XOR);
        } else {
            out.push(b);
        }
    }
    out
}

/// Reverses [`escape`].
pub fn unescape(data: &[u8]) -> Result<Vec<u8>, PacketError> {
    let mut out = Vec::with_capacity(data.len());
    let mut bytes = data.iter();
    while let Some(&b) = bytes.next() {
        if b == ESCAPE {
            let next = bytes.next().ok_or(PacketError::DanglingEscape)?;
            out.push(next ^ ESCAPE_XOR);
        } else {
            out.push(b);
        }
    }
    Ok(out)
}

/// Returns `true` if `data` ends in the middle of an escape sequence, meaning
/// a following `#` is payload and not the end marker.
fn ends_with_open_escape(data: &[u8]) -> bool {
    data.iter()
        .fold(false, |escaped, &b| !escaped && b == ESCAPE)
}

/// A framed, acknowledged packet stream on top of a [`Transport`].
pub struct PacketStream<S: Transport> {
    reader: BufReader<S>,
    no_ack: bool,
    retry_limit: usize,
    timeout: Option<Duration>,
    max_len: usize,
}

impl<S: Transport> std::fmt::Debug for PacketStream<S> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("PacketStream")
            .field("no_ack", &self.no_ack)
            .field("retry_limit", &self.retry_limit)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<S: Transport> PacketStream<S> {
    pub fn new(stream: S, config: &GdbConfig) -> Self {
        Self {
            reader: BufReader::new(stream),
            no_ack: false,
            retry_limit: config.retry_limit,
            timeout: config.read_timeout(),
            max_len: config.max_packet_len,
        }
    }

    #[inline]
    pub fn no_ack(&self) -> bool {
        self.no_ack
    }

    pub fn set_no_ack(&mut self, value: bool) {
        log::debug!(target: "gdb::packet", "acknowledgements {}", if value { "disabled" } else { "enabled" });
        self.no_ack = value;
    }

    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Returns `true` if input is buffered or pending on the transport.
    pub fn poll_readable(&self, wait: Option<Duration>) -> std::io::Result<bool> {
        if !self.reader.buffer().is_empty() {
            return Ok(true);
        }
        self.reader.get_ref().poll_readable(wait)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<(), PacketError> {
        self.reader.get_mut().set_read_timeout(timeout)?;
        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, PacketError> {
        let mut byte = [0u8];
        match self.reader.read_exact(&mut byte) {
            Ok(()) => Ok(byte[0]),
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => Err(PacketError::Eof),
            Err(err) => Err(err.into()),
        }
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<(), PacketError> {
        let stream = self.reader.get_mut();
        stream.write_all(bytes)?;
        stream.flush()?;
        Ok(())
    }

    /// Reads the body of a packet after the start marker, up to and including
    /// the checksum digits.
    fn read_frame_body(&mut self) -> Result<(Vec<u8>, [u8; 2]), PacketError> {
        let mut payload = Vec::new();
        loop {
            let read = self.reader.read_until(END, &mut payload)?;
            if read == 0 || payload.last() != Some(&END) {
                return Err(PacketError::Eof);
            }
            payload.pop();
            if let Some(restart) = payload.iter().rposition(|&b| b == START) {
                // A fresh start marker inside the body means the previous packet
                // was cut short; only the newest one counts.
                log::trace!(target: "gdb::packet", "discarding truncated packet");
                payload.drain(..=restart);
            }
            if payload.len() > self.max_len {
                return Err(PacketError::TooLong {
                    len: payload.len(),
                    limit: self.max_len,
                });
            }
            if ends_with_open_escape(&payload) {
                payload.push(END);
                continue;
            }
            break;
        }
        let mut digits = [0u8; 2];
        match self.reader.read_exact(&mut digits) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Err(PacketError::Eof),
            Err(err) => return Err(err.into()),
        }
        Ok((payload, digits))
    }

    /// Receives one packet, acknowledging it, and returns its raw payload.
    ///
    /// Bytes outside of a packet (stray acknowledgements, interrupt requests)
    /// are skipped. A checksum mismatch is answered with `-` and the packet is
    /// read again, at most `retry_limit` times.
    pub fn recv(&mut self) -> Result<Vec<u8>, PacketError> {
        let mut failures = 0;
        loop {
            self.set_timeout(None)?;
            loop {
                match self.read_byte()? {
                    START => break,
                    other => {
                        log::trace!(target: "gdb::packet", "skipping byte {:#04x} outside of packet", other);
                    }
                }
            }
            let timeout = self.timeout;
            self.set_timeout(timeout)?;
            let (payload, digits) = self.read_frame_body()?;
            let computed = checksum(&payload);
            if parse_checksum(digits) == Some(computed) {
                if !self.no_ack {
                    self.write_raw(&[ACK])?;
                }
                log::trace!(target: "gdb::packet", "<- {}", String::from_utf8_lossy(&payload));
                return Ok(payload);
            }
            log::warn!(
                target: "gdb::packet",
                "bad checksum for packet {:?}: computed {:02x}, received {:?}",
                String::from_utf8_lossy(&payload),
                computed,
                String::from_utf8_lossy(&digits),
            );
            failures += 1;
            if failures > self.retry_limit {
                return Err(PacketError::RetriesExceeded(failures));
            }
            if !self.no_ack {
                self.write_raw(&[NAK])?;
            }
        }
    }

    /// Sends one packet and waits for it to be acknowledged, retransmitting on
    /// `-` at most `retry_limit` times.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), PacketError> {
        let framed = frame(payload);
        log::trace!(target: "gdb::packet", "-> {}", String::from_utf8_lossy(payload));
        let mut failures = 0;
        loop {
            self.write_raw(&framed)?;
            if self.no_ack {
                return Ok(());
            }
            let timeout = self.timeout;
            self.set_timeout(timeout)?;
            loop {
                match self.read_byte()? {
                    ACK => return Ok(()),
                    NAK => break,
                    other => {
                        log::trace!(target: "gdb::packet", "skipping byte {:#04x} while waiting for ack", other);
                    }
                }
            }
            failures += 1;
            log::warn!(target: "gdb::packet", "debugger requested retransmission ({failures})");
            if failures > self.retry_limit {
                return Err(PacketError::RetriesExceeded(failures));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        io::{Cursor, Read, Write},
        rc::Rc,
        time::Duration,
    };

    use super::*;

    struct Scripted {
        input: Cursor<Vec<u8>>,
        output: Rc<RefCell<Vec<u8>>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Transport for Scripted {
        fn set_read_timeout(&mut self, _: Option<Duration>) -> std::io::Result<()> {
            Ok(())
        }

        fn poll_readable(&self, _: Option<Duration>) -> std::io::Result<bool> {
            Ok(self.input.position() < self.input.get_ref().len() as u64)
        }
    }

    fn stream(input: &[u8], config: &GdbConfig) -> (PacketStream<Scripted>, Rc<RefCell<Vec<u8>>>) {
        let output = Rc::new(RefCell::new(Vec::new()));
        let scripted = Scripted {
            input: Cursor::new(input.to_vec()),
            output: Rc::clone(&output),
        };
        (PacketStream::new(scripted, config), output)
    }

    #[test]
    fn test_checksum_and_frame() {
        assert_eq!(checksum(b""), 0);
        assert_eq!(checksum(b"g"), 0x67);
        assert_eq!(checksum(b"OK"), 0x9a);
        assert_eq!(frame(b"g"), b"$g#67");
        assert_eq!(frame(b""), b"$#00");
        assert_eq!(frame(b"S05"), b"$S05#b8");
    }

    #[test]
    fn test_verify_frame() {
        for payload in [&b"g"[..], b"m1000,4", b"qSupported:multiprocess+", b""] {
            let framed = frame(payload);
            assert_eq!(verify_frame(&framed).unwrap(), payload);
        }
        let mut corrupted = frame(b"m1000,4");
        corrupted[2] = b'2';
        assert!(matches!(
            verify_frame(&corrupted),
            Err(PacketError::Checksum { .. })
        ));
        assert!(matches!(verify_frame(b"g#67"), Err(PacketError::Malformed)));
        assert!(matches!(verify_frame(b"$g#6"), Err(PacketError::Malformed)));
    }

    #[test]
    fn test_escape() {
        let data = b"a#b$c}d*e";
        let escaped = escape(data);
        assert_eq!(escaped, b"a}\x03b}\x04c}]d}\x0ae");
        assert!(!escaped.iter().any(|&b| b == START || b == END));
        assert_eq!(unescape(&escaped).unwrap(), data);
        assert_eq!(unescape(b"plain").unwrap(), b"plain");
        assert!(matches!(unescape(b"abc}"), Err(PacketError::DanglingEscape)));
    }

    #[test]
    fn test_recv_acks() {
        let (mut stream, output) = stream(b"+$g#67", &GdbConfig::default());
        assert_eq!(stream.recv().unwrap(), b"g");
        assert_eq!(output.borrow().as_slice(), b"+");
        assert!(matches!(stream.recv(), Err(PacketError::Eof)));
    }

    #[test]
    fn test_recv_naks_bad_checksum() {
        let (mut stream, output) = stream(b"$g#00$g#67", &GdbConfig::default());
        assert_eq!(stream.recv().unwrap(), b"g");
        assert_eq!(output.borrow().as_slice(), b"-+");
    }

    #[test]
    fn test_recv_retry_limit() {
        let config = GdbConfig {
            retry_limit: 2,
            ..GdbConfig::default()
        };
        let (mut stream, output) = stream(b"$g#00$g#00$g#00$g#67", &config);
        assert!(matches!(stream.recv(), Err(PacketError::RetriesExceeded(3))));
        assert_eq!(output.borrow().as_slice(), b"--");
    }

    #[test]
    fn test_recv_escaped_end_marker() {
        // `}` followed by `#` encodes 0x03 and must not terminate the packet.
        let payload = b"X0,1:}#";
        let mut input = frame(payload);
        input.splice(0..0, b"\x03".iter().copied());
        let (mut stream, _) = stream(&input, &GdbConfig::default());
        assert_eq!(stream.recv().unwrap(), payload);
    }

    #[test]
    fn test_recv_restart_on_start_marker() {
        let (mut stream, _) = stream(b"$m10$g#67", &GdbConfig::default());
        assert_eq!(stream.recv().unwrap(), b"g");
    }

    #[test]
    fn test_recv_too_long() {
        let config = GdbConfig {
            packet_size: 64,
            max_packet_len: 64,
            ..GdbConfig::default()
        };
        let (mut stream, _) = stream(&frame(&[b'a'; 65]), &config);
        assert!(matches!(
            stream.recv(),
            Err(PacketError::TooLong { len: 65, limit: 64 })
        ));
    }

    #[test]
    fn test_send_retransmits() {
        let (mut stream, output) = stream(b"-+", &GdbConfig::default());
        stream.send(b"OK").unwrap();
        assert_eq!(output.borrow().as_slice(), b"$OK#9a$OK#9a");
    }

    #[test]
    fn test_no_ack() {
        let (mut stream, output) = stream(b"$g#67", &GdbConfig::default());
        stream.set_no_ack(true);
        assert_eq!(stream.recv().unwrap(), b"g");
        stream.send(b"OK").unwrap();
        assert_eq!(output.borrow().as_slice(), b"$OK#9a");
    }

    #[test]
    fn test_poll_readable() {
        let (mut stream, _) = stream(b"$g#67", &GdbConfig::default());
        assert!(stream.poll_readable(None).unwrap());
        stream.recv().unwrap();
        assert!(!stream.poll_readable(None).unwrap());
    }
}
