// SPDX-License-Identifier: EUPL-1.2 OR GPL-3.0-or-later
// Copyright Contributors to the simgdb project.

//! Conversions between byte buffers and the lowercase hex digit pairs used by
//! register and memory payloads.

use thiserror::Error;

const DIGITS: &[u8; 16] = b"0123456789abcdef";

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum HexError {
    #[error("hex string has odd length {0}")]
    OddLength(usize),
    #[error("invalid hex digit {byte:#04x} at position {position}")]
    InvalidDigit { byte: u8, position: usize },
    #[error("empty hex number")]
    Empty,
    #[error("hex number does not fit in 64 bits")]
    Overflow,
}

#[inline]
const fn nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Encodes `bytes` as a string of lowercase hex digit pairs.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(DIGITS[usize::from(b >> 4)] as char);
        out.push(DIGITS[usize::from(b & 0xf)] as char);
    }
    out
}

/// Decodes a string of hex digit pairs. Both cases are accepted.
pub fn decode(hex: &[u8]) -> Result<Vec<u8>, HexError> {
    if hex.len() % 2 != 0 {
        return Err(HexError::OddLength(hex.len()));
    }
    hex.chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| {
            let hi = nibble(pair[0]).ok_or(HexError::InvalidDigit {
                byte: pair[0],
                position: 2 * i,
            })?;
            let lo = nibble(pair[1]).ok_or(HexError::InvalidDigit {
                byte: pair[1],
                position: 2 * i + 1,
            })?;
            Ok((hi << 4) | lo)
        })
        .collect()
}

/// Parses a big-endian hex number such as an address or a length.
pub fn parse_u64(hex: &[u8]) -> Result<u64, HexError> {
    if hex.is_empty() {
        return Err(HexError::Empty);
    }
    hex.iter().enumerate().try_fold(0u64, |acc, (position, &byte)| {
        let digit = nibble(byte).ok_or(HexError::InvalidDigit { byte, position })?;
        acc.checked_mul(16)
            .map(|acc| acc | u64::from(digit))
            .ok_or(HexError::Overflow)
    })
}

/// Parses a hex number that fits in a `usize`.
pub fn parse_usize(hex: &[u8]) -> Result<usize, HexError> {
    usize::try_from(parse_u64(hex)?).map_err(|_| HexError::Overflow)
}

/// Parses a thread id, which may be the literal `-1` meaning "all threads".
pub fn parse_thread_id(hex: &[u8]) -> Result<i64, HexError> {
    if hex == b"-1" {
        return Ok(-1);
    }
    i64::try_from(parse_u64(hex)?).map_err(|_| HexError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let input = [0x00, 0x01, 0xab, 0xff, 0x7f, 0x80];
        let encoded = encode(&input);
        assert_eq!(encoded, "0001abff7f80");
        assert_eq!(decode(encoded.as_bytes()).unwrap(), input);
        assert_eq!(decode(b"ABcd").unwrap(), [0xab, 0xcd]);
        assert_eq!(encode(&[]), "");
        assert_eq!(decode(b"").unwrap(), Vec::<u8>::new());

        let all: Vec<u8> = (0..=u8::MAX).collect();
        assert_eq!(decode(encode(&all).as_bytes()).unwrap(), all);
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode(b"abc"), Err(HexError::OddLength(3)));
        assert_eq!(
            decode(b"0g"),
            Err(HexError::InvalidDigit {
                byte: b'g',
                position: 1
            })
        );
        assert_eq!(
            decode(b"zz00"),
            Err(HexError::InvalidDigit {
                byte: b'z',
                position: 0
            })
        );
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_u64(b"1000"), Ok(0x1000));
        assert_eq!(parse_u64(b"ffffffffffffffff"), Ok(u64::MAX));
        assert_eq!(parse_u64(b"1ffffffffffffffff"), Err(HexError::Overflow));
        assert_eq!(parse_u64(b""), Err(HexError::Empty));
        assert_eq!(parse_usize(b"4"), Ok(4));
        assert_eq!(parse_thread_id(b"-1"), Ok(-1));
        assert_eq!(parse_thread_id(b"0"), Ok(0));
        assert_eq!(parse_thread_id(b"1f"), Ok(0x1f));
        assert!(parse_thread_id(b"-2").is_err());
    }
}
