//! Variable-length integers.
//!
//! Each byte carries seven payload bits, least significant group first, with
//! the high bit set on every byte except the last. A 32-bit value takes at most
//! five bytes and a 64-bit value at most ten.

use crate::error::{constants, ProtocolError, Result};
use bytes::{Buf, BufMut};

/// Longest encoding of a 32-bit varint.
pub const MAX_VARINT_LEN: usize = 5;

/// Longest encoding of a 64-bit varlong.
pub const MAX_VARLONG_LEN: usize = 10;

const SEGMENT_BITS: u8 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

/// Number of bytes `value` occupies on the wire.
#[inline]
pub fn varint_len(value: i32) -> usize {
    match value as u32 {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

#[inline]
pub fn write_varint(buf: &mut impl BufMut, value: i32) {
    let mut remaining = value as u32;
    loop {
        if remaining & !(SEGMENT_BITS as u32) == 0 {
            buf.put_u8(remaining as u8);
            return;
        }
        buf.put_u8((remaining as u8 & SEGMENT_BITS) | CONTINUE_BIT);
        remaining >>= 7;
    }
}

pub fn read_varint(buf: &mut impl Buf) -> Result<i32> {
    let mut value: u32 = 0;
    for position in 0..MAX_VARINT_LEN {
        if !buf.has_remaining() {
            return Err(ProtocolError::MalformedPacket(
                constants::ERR_UNEXPECTED_END.into(),
            ));
        }
        let byte = buf.get_u8();
        value |= u32::from(byte & SEGMENT_BITS) << (7 * position);
        if byte & CONTINUE_BIT == 0 {
            return Ok(value as i32);
        }
    }
    Err(ProtocolError::VarIntTooLong)
}

#[inline]
pub fn write_varlong(buf: &mut impl BufMut, value: i64) {
    let mut remaining = value as u64;
    loop {
        if remaining & !(SEGMENT_BITS as u64) == 0 {
            buf.put_u8(remaining as u8);
            return;
        }
        buf.put_u8((remaining as u8 & SEGMENT_BITS) | CONTINUE_BIT);
        remaining >>= 7;
    }
}

pub fn read_varlong(buf: &mut impl Buf) -> Result<i64> {
    let mut value: u64 = 0;
    for position in 0..MAX_VARLONG_LEN {
        if !buf.has_remaining() {
            return Err(ProtocolError::MalformedPacket(
                constants::ERR_UNEXPECTED_END.into(),
            ));
        }
        let byte = buf.get_u8();
        value |= u64::from(byte & SEGMENT_BITS) << (7 * position);
        if byte & CONTINUE_BIT == 0 {
            return Ok(value as i64);
        }
    }
    Err(ProtocolError::VarIntTooLong)
}

/// Read a varint from the front of `src` without consuming it.
///
/// Returns `Ok(None)` while the varint is still incomplete, or the value and
/// the number of bytes it spans. Fails once `max_len` bytes have been seen
/// without a terminating byte.
pub fn peek_varint(src: &[u8], max_len: usize) -> Result<Option<(i32, usize)>> {
    let mut value: u32 = 0;
    for (position, &byte) in src.iter().enumerate().take(max_len) {
        value |= u32::from(byte & SEGMENT_BITS) << (7 * position);
        if byte & CONTINUE_BIT == 0 {
            return Ok(Some((value as i32, position + 1)));
        }
    }
    if src.len() >= max_len {
        return Err(ProtocolError::VarIntTooLong);
    }
    Ok(None)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    const VECTORS: &[(i32, &[u8])] = &[
        (0, &[0x00]),
        (1, &[0x01]),
        (127, &[0x7f]),
        (128, &[0x80, 0x01]),
        (255, &[0xff, 0x01]),
        (25565, &[0xdd, 0xc7, 0x01]),
        (2_097_151, &[0xff, 0xff, 0x7f]),
        (i32::MAX, &[0xff, 0xff, 0xff, 0xff, 0x07]),
        (-1, &[0xff, 0xff, 0xff, 0xff, 0x0f]),
        (i32::MIN, &[0x80, 0x80, 0x80, 0x80, 0x08]),
    ];

    #[test]
    fn test_varint_vectors() {
        for &(value, encoded) in VECTORS {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);
            assert_eq!(&buf[..], encoded, "encoding {value}");
            assert_eq!(varint_len(value), encoded.len());

            let mut slice = encoded;
            assert_eq!(read_varint(&mut slice).unwrap(), value);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn test_varlong_vectors() {
        let vectors: &[(i64, &[u8])] = &[
            (0, &[0x00]),
            (2_147_483_647, &[0xff, 0xff, 0xff, 0xff, 0x07]),
            (
                i64::MAX,
                &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f],
            ),
            (
                -1,
                &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01],
            ),
        ];
        for &(value, encoded) in vectors {
            let mut buf = BytesMut::new();
            write_varlong(&mut buf, value);
            assert_eq!(&buf[..], encoded);
            let mut slice = encoded;
            assert_eq!(read_varlong(&mut slice).unwrap(), value);
        }
    }

    #[test]
    fn test_varint_too_long() {
        let mut slice: &[u8] = &[0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert!(matches!(
            read_varint(&mut slice),
            Err(ProtocolError::VarIntTooLong)
        ));
    }

    #[test]
    fn test_varint_truncated() {
        let mut slice: &[u8] = &[0x80, 0x80];
        assert!(matches!(
            read_varint(&mut slice),
            Err(ProtocolError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_peek_incomplete_and_complete() {
        assert_eq!(peek_varint(&[], 3).unwrap(), None);
        assert_eq!(peek_varint(&[0xdd, 0xc7], 3).unwrap(), None);
        assert_eq!(
            peek_varint(&[0xdd, 0xc7, 0x01, 0x42], 3).unwrap(),
            Some((25565, 3))
        );
        assert!(peek_varint(&[0xff, 0xff, 0xff], 3).is_err());
    }
}
