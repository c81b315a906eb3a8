//! Primitive wire types.
//!
//! Every packet body is assembled from these: fixed-width big-endian numbers,
//! one-byte booleans, varints, UTF-8 strings prefixed by their byte length,
//! arrays prefixed by their element count, UUIDs as two big-endian longs,
//! optional values behind a boolean, and namespaced identifiers.
//!
//! Decoding works on [`Bytes`] so byte arrays can be sliced out of the frame
//! without copying. Every read checks the remaining length first; nothing is
//! allocated from an unchecked length prefix.

use crate::core::varint::{read_varint, read_varlong, write_varint, write_varlong};
use crate::error::{constants, ProtocolError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Default maximum length (in characters) of a protocol string.
pub const MAX_STRING_LEN: usize = 32_767;

/// Types that can be written to a packet body.
pub trait Encode {
    fn encode(&self, buf: &mut BytesMut) -> Result<()>;
}

/// Types that can be read from a packet body.
pub trait Decode: Sized {
    fn decode(buf: &mut Bytes) -> Result<Self>;
}

#[inline]
pub(crate) fn ensure(buf: &Bytes, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(ProtocolError::MalformedPacket(
            constants::ERR_UNEXPECTED_END.into(),
        ));
    }
    Ok(())
}

/// Read a length prefix, rejecting negatives.
pub fn read_length(buf: &mut Bytes) -> Result<usize> {
    let len = read_varint(buf)?;
    usize::try_from(len)
        .map_err(|_| ProtocolError::MalformedPacket(constants::ERR_NEGATIVE_LENGTH.into()))
}

pub fn write_length(buf: &mut BytesMut, len: usize) -> Result<()> {
    let len = i32::try_from(len).map_err(|_| ProtocolError::FrameTooLarge(len))?;
    write_varint(buf, len);
    Ok(())
}

/// Read a string of at most `max_chars` characters.
pub fn read_string(buf: &mut Bytes, max_chars: usize) -> Result<String> {
    let len = read_length(buf)?;
    if len > max_chars * 3 {
        return Err(ProtocolError::StringTooLong {
            len,
            max: max_chars * 3,
        });
    }
    ensure(buf, len)?;
    let raw = buf.split_to(len);
    let text = std::str::from_utf8(&raw)
        .map_err(|_| ProtocolError::MalformedPacket(constants::ERR_INVALID_UTF8.into()))?;
    let chars = text.chars().count();
    if chars > max_chars {
        return Err(ProtocolError::StringTooLong {
            len: chars,
            max: max_chars,
        });
    }
    Ok(text.to_owned())
}

pub fn write_string(buf: &mut BytesMut, value: &str, max_chars: usize) -> Result<()> {
    let chars = value.chars().count();
    if chars > max_chars {
        return Err(ProtocolError::StringTooLong {
            len: chars,
            max: max_chars,
        });
    }
    write_length(buf, value.len())?;
    buf.put_slice(value.as_bytes());
    Ok(())
}

/// Read a length-prefixed byte array of at most `max_len` bytes.
pub fn read_byte_array(buf: &mut Bytes, max_len: usize) -> Result<Bytes> {
    let len = read_length(buf)?;
    if len > max_len {
        return Err(ProtocolError::MalformedPacket(format!(
            "Byte array of {len} bytes exceeds {max_len}"
        )));
    }
    ensure(buf, len)?;
    Ok(buf.split_to(len))
}

pub fn write_byte_array(buf: &mut BytesMut, value: &[u8]) -> Result<()> {
    write_length(buf, value.len())?;
    buf.put_slice(value);
    Ok(())
}

/// Take everything left in the packet, bounded by `max_len`.
pub fn read_remaining(buf: &mut Bytes, max_len: usize) -> Result<Bytes> {
    if buf.remaining() > max_len {
        return Err(ProtocolError::MalformedPacket(format!(
            "Payload of {} bytes exceeds {max_len}",
            buf.remaining()
        )));
    }
    Ok(buf.split_to(buf.remaining()))
}

/// Read a count-prefixed array, decoding each element with `read`.
pub fn read_array<T>(buf: &mut Bytes, read: impl Fn(&mut Bytes) -> Result<T>) -> Result<Vec<T>> {
    let count = read_length(buf)?;
    // every element occupies at least one byte
    ensure(buf, count)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(read(buf)?);
    }
    Ok(items)
}

pub fn write_array<T>(
    buf: &mut BytesMut,
    items: &[T],
    write: impl Fn(&mut BytesMut, &T) -> Result<()>,
) -> Result<()> {
    write_length(buf, items.len())?;
    for item in items {
        write(buf, item)?;
    }
    Ok(())
}

pub fn read_option<T>(
    buf: &mut Bytes,
    read: impl FnOnce(&mut Bytes) -> Result<T>,
) -> Result<Option<T>> {
    if bool::decode(buf)? {
        read(buf).map(Some)
    } else {
        Ok(None)
    }
}

pub fn write_option<T>(
    buf: &mut BytesMut,
    value: &Option<T>,
    write: impl FnOnce(&mut BytesMut, &T) -> Result<()>,
) -> Result<()> {
    match value {
        Some(inner) => {
            buf.put_u8(1);
            write(buf, inner)
        }
        None => {
            buf.put_u8(0);
            Ok(())
        }
    }
}

/// Read a varint ordinal and map it through `from_ordinal`.
pub fn read_enum<T>(buf: &mut Bytes, from_ordinal: impl Fn(i32) -> Option<T>) -> Result<T> {
    let ordinal = read_varint(buf)?;
    from_ordinal(ordinal).ok_or_else(|| {
        ProtocolError::MalformedPacket(format!("{} ({ordinal})", constants::ERR_INVALID_ENUM))
    })
}

/// A varint-encoded `i32` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VarInt(pub i32);

impl Encode for VarInt {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_varint(buf, self.0);
        Ok(())
    }
}

impl Decode for VarInt {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        read_varint(buf).map(VarInt)
    }
}

/// A varint-encoded `i64` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VarLong(pub i64);

impl Encode for VarLong {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_varlong(buf, self.0);
        Ok(())
    }
}

impl Decode for VarLong {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        read_varlong(buf).map(VarLong)
    }
}

macro_rules! fixed_width {
    ($($ty:ty => $get:ident, $put:ident;)*) => {
        $(
            impl Encode for $ty {
                #[inline]
                fn encode(&self, buf: &mut BytesMut) -> Result<()> {
                    buf.$put(*self);
                    Ok(())
                }
            }

            impl Decode for $ty {
                #[inline]
                fn decode(buf: &mut Bytes) -> Result<Self> {
                    ensure(buf, std::mem::size_of::<$ty>())?;
                    Ok(buf.$get())
                }
            }
        )*
    };
}

fixed_width! {
    u8 => get_u8, put_u8;
    i8 => get_i8, put_i8;
    u16 => get_u16, put_u16;
    i16 => get_i16, put_i16;
    i32 => get_i32, put_i32;
    i64 => get_i64, put_i64;
    f32 => get_f32, put_f32;
    f64 => get_f64, put_f64;
}

impl Encode for bool {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(u8::from(*self));
        Ok(())
    }
}

impl Decode for bool {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        match u8::decode(buf)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::MalformedPacket(format!(
                "Invalid boolean byte {other:#04x}"
            ))),
        }
    }
}

impl Encode for Uuid {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u128(self.as_u128());
        Ok(())
    }
}

impl Decode for Uuid {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        ensure(buf, 16)?;
        Ok(Uuid::from_u128(buf.get_u128()))
    }
}

impl Encode for String {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_string(buf, self, MAX_STRING_LEN)
    }
}

impl Decode for String {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        read_string(buf, MAX_STRING_LEN)
    }
}

/// A namespaced key such as `minecraft:brand`.
///
/// The namespace defaults to `minecraft` when omitted. Namespaces allow
/// `[a-z0-9_.-]`, paths additionally allow `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier {
    namespace: String,
    path: String,
}

impl Identifier {
    pub const DEFAULT_NAMESPACE: &'static str = "minecraft";

    pub fn new(namespace: &str, path: &str) -> Result<Self> {
        if namespace.is_empty() || !namespace.chars().all(valid_namespace_char) {
            return Err(invalid_identifier(namespace, path));
        }
        if path.is_empty() || !path.chars().all(valid_path_char) {
            return Err(invalid_identifier(namespace, path));
        }
        Ok(Self {
            namespace: namespace.to_owned(),
            path: path.to_owned(),
        })
    }

    /// An identifier in the default namespace.
    pub fn minecraft(path: &str) -> Result<Self> {
        Self::new(Self::DEFAULT_NAMESPACE, path)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

fn valid_namespace_char(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9' | '_' | '-' | '.')
}

fn valid_path_char(c: char) -> bool {
    valid_namespace_char(c) || c == '/'
}

fn invalid_identifier(namespace: &str, path: &str) -> ProtocolError {
    ProtocolError::MalformedPacket(format!(
        "{}: {namespace}:{path}",
        constants::ERR_INVALID_IDENTIFIER
    ))
}

impl FromStr for Identifier {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((namespace, path)) => Self::new(namespace, path),
            None => Self::minecraft(s),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl Encode for Identifier {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        write_string(buf, &self.to_string(), MAX_STRING_LEN)
    }
}

impl Decode for Identifier {
    fn decode(buf: &mut Bytes) -> Result<Self> {
        read_string(buf, MAX_STRING_LEN)?.parse()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn frozen(buf: BytesMut) -> Bytes {
        buf.freeze()
    }

    #[test]
    fn test_string_roundtrip_and_limits() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "", 16).unwrap();
        write_string(&mut buf, "héllo wörld", 16).unwrap();
        let mut bytes = frozen(buf);
        assert_eq!(read_string(&mut bytes, 16).unwrap(), "");
        assert_eq!(read_string(&mut bytes, 16).unwrap(), "héllo wörld");
        assert!(bytes.is_empty());

        let mut buf = BytesMut::new();
        assert!(matches!(
            write_string(&mut buf, "seventeen_chars__", 16),
            Err(ProtocolError::StringTooLong { len: 17, max: 16 })
        ));
    }

    #[test]
    fn test_string_length_prefix_beyond_buffer() {
        // claims 10 bytes, carries 2
        let mut bytes = Bytes::from_static(&[0x0a, b'h', b'i']);
        assert!(matches!(
            read_string(&mut bytes, 16),
            Err(ProtocolError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_string_invalid_utf8() {
        let mut bytes = Bytes::from_static(&[0x02, 0xc3, 0x28]);
        assert!(read_string(&mut bytes, 16).is_err());
    }

    #[test]
    fn test_uuid_and_primitives() {
        let id = Uuid::from_u128(0x0123_4567_89ab_cdef_0011_2233_4455_6677);
        let mut buf = BytesMut::new();
        id.encode(&mut buf).unwrap();
        true.encode(&mut buf).unwrap();
        (-2i64).encode(&mut buf).unwrap();
        25565u16.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 16 + 1 + 8 + 2);

        let mut bytes = frozen(buf);
        assert_eq!(Uuid::decode(&mut bytes).unwrap(), id);
        assert!(bool::decode(&mut bytes).unwrap());
        assert_eq!(i64::decode(&mut bytes).unwrap(), -2);
        assert_eq!(u16::decode(&mut bytes).unwrap(), 25565);
        assert!(i32::decode(&mut bytes).is_err());
    }

    #[test]
    fn test_invalid_boolean() {
        let mut bytes = Bytes::from_static(&[0x02]);
        assert!(bool::decode(&mut bytes).is_err());
    }

    #[test]
    fn test_array_count_is_bounded_by_input() {
        // claims a million elements with nothing behind it
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 1_000_000);
        let mut bytes = frozen(buf);
        assert!(read_array(&mut bytes, u8::decode).is_err());
    }

    #[test]
    fn test_empty_array_and_option() {
        let mut buf = BytesMut::new();
        write_array::<u8>(&mut buf, &[], |b, v| v.encode(b)).unwrap();
        write_option::<i64>(&mut buf, &None, |b, v| v.encode(b)).unwrap();
        write_option(&mut buf, &Some(7i64), |b, v| v.encode(b)).unwrap();

        let mut bytes = frozen(buf);
        assert!(read_array(&mut bytes, u8::decode).unwrap().is_empty());
        assert_eq!(read_option(&mut bytes, i64::decode).unwrap(), None);
        assert_eq!(read_option(&mut bytes, i64::decode).unwrap(), Some(7));
    }

    #[test]
    fn test_byte_array_limit() {
        let mut buf = BytesMut::new();
        write_byte_array(&mut buf, &[1, 2, 3, 4]).unwrap();
        let mut bytes = frozen(buf.clone());
        assert!(read_byte_array(&mut bytes, 3).is_err());
        let mut bytes = frozen(buf);
        assert_eq!(&read_byte_array(&mut bytes, 4).unwrap()[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_identifier_parsing() {
        let brand: Identifier = "brand".parse().unwrap();
        assert_eq!(brand.to_string(), "minecraft:brand");

        let custom: Identifier = "machine:cookies/session".parse().unwrap();
        assert_eq!(custom.namespace(), "machine");
        assert_eq!(custom.path(), "cookies/session");

        assert!("Upper:case".parse::<Identifier>().is_err());
        assert!("ns/slash:path".parse::<Identifier>().is_err());
        assert!(":empty".parse::<Identifier>().is_err());
    }
}
