//! Frame transform pipeline.
//!
//! Inbound bytes go through decrypt, then length delimiting, then
//! decompression. Outbound bodies go through the same stages in reverse.
//! Compression and encryption start out disabled and can each be switched on
//! once; a switch applies from the next frame boundary on.
//!
//! The decoder and encoder are separate types so the read and write halves of
//! a socket can be driven by different tasks.

use crate::core::varint::{peek_varint, read_varint, varint_len, write_varint};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::compression::{self, MAX_UNCOMPRESSED_SIZE};
use crate::utils::crypto::{StreamDecryptor, StreamEncryptor};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

/// Hard cap on a frame: the largest length a 3-byte varint can express.
pub const MAX_FRAME_LEN: usize = 2_097_151;

/// Length prefixes longer than this are rejected outright.
pub const MAX_LENGTH_PREFIX: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSettings {
    /// Bodies shorter than this are sent uncompressed.
    pub threshold: usize,
    /// zlib level for bodies at or above the threshold.
    pub level: u32,
}

/// Inbound half: decrypt, delimit, decompress.
pub struct FrameDecoder {
    max_frame: usize,
    compression: Option<usize>,
    cipher: Option<StreamDecryptor>,
    /// Bytes at the front of the read buffer that are already plaintext.
    decrypted: usize,
}

impl FrameDecoder {
    pub fn new(max_frame: usize) -> Self {
        Self {
            max_frame: max_frame.min(MAX_FRAME_LEN),
            compression: None,
            cipher: None,
            decrypted: 0,
        }
    }

    /// Expect a compression header on every following frame.
    pub fn enable_compression(&mut self, threshold: usize) {
        self.compression = Some(threshold);
    }

    /// Decrypt everything from the current read position on.
    ///
    /// Bytes still sitting in the read buffer belong to frames after the one
    /// that negotiated the key, so they are ciphertext too.
    pub fn enable_encryption(&mut self, cipher: StreamDecryptor) {
        self.cipher = Some(cipher);
        self.decrypted = 0;
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn compression_threshold(&self) -> Option<usize> {
        self.compression
    }

    fn decrypt_pending(&mut self, src: &mut BytesMut) {
        if let Some(cipher) = self.cipher.as_mut() {
            if self.decrypted < src.len() {
                cipher.apply(&mut src[self.decrypted..]);
                self.decrypted = src.len();
            }
        }
    }

    fn inflate(&self, mut frame: BytesMut) -> Result<BytesMut> {
        let Some(threshold) = self.compression else {
            return Ok(frame);
        };
        let declared = read_varint(&mut frame)?;
        let declared = usize::try_from(declared)
            .map_err(|_| ProtocolError::MalformedPacket(constants::ERR_NEGATIVE_LENGTH.into()))?;
        if declared == 0 {
            return Ok(frame);
        }
        if declared < threshold {
            return Err(ProtocolError::MalformedPacket(format!(
                "{}: {declared} < {threshold}",
                constants::ERR_BELOW_THRESHOLD
            )));
        }
        if declared > MAX_UNCOMPRESSED_SIZE {
            return Err(ProtocolError::FrameTooLarge(declared));
        }
        let inflated = compression::decompress_exact(&frame, declared)?;
        Ok(BytesMut::from(&inflated[..]))
    }
}

impl Decoder for FrameDecoder {
    type Item = BytesMut;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        self.decrypt_pending(src);

        let (len, prefix) = match peek_varint(&src[..], MAX_LENGTH_PREFIX) {
            Ok(Some((len, prefix))) => (len, prefix),
            Ok(None) => return Ok(None),
            Err(_) => return Err(ProtocolError::FrameTooLarge(MAX_FRAME_LEN + 1)),
        };
        let len = usize::try_from(len)
            .map_err(|_| ProtocolError::MalformedPacket(constants::ERR_NEGATIVE_LENGTH.into()))?;
        if len > self.max_frame {
            return Err(ProtocolError::FrameTooLarge(len));
        }

        let total = prefix + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(prefix);
        let frame = src.split_to(len);
        self.decrypted = self.decrypted.saturating_sub(total);
        trace!(len, "Frame decoded");

        self.inflate(frame).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::TruncatedFrame),
        }
    }
}

/// Outbound half: compress, prefix with length, encrypt.
pub struct FrameEncoder {
    compression: Option<CompressionSettings>,
    cipher: Option<StreamEncryptor>,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self {
            compression: None,
            cipher: None,
        }
    }

    pub fn enable_compression(&mut self, settings: CompressionSettings) {
        self.compression = Some(settings);
    }

    pub fn enable_encryption(&mut self, cipher: StreamEncryptor) {
        self.cipher = Some(cipher);
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    fn write_frame(&self, body: &[u8], dst: &mut BytesMut) -> Result<()> {
        match self.compression {
            None => {
                check_frame_len(body.len())?;
                write_varint(dst, body.len() as i32);
                dst.put_slice(body);
            }
            // A declared length of 0 means "not compressed", so an empty body never is.
            Some(settings) if body.len() < settings.threshold || body.is_empty() => {
                let inner_len = 1 + body.len();
                check_frame_len(inner_len)?;
                write_varint(dst, inner_len as i32);
                write_varint(dst, 0);
                dst.put_slice(body);
            }
            Some(settings) => {
                if body.len() > MAX_UNCOMPRESSED_SIZE {
                    return Err(ProtocolError::FrameTooLarge(body.len()));
                }
                let compressed = compression::compress(body, settings.level)?;
                let declared = body.len() as i32;
                let inner_len = varint_len(declared) + compressed.len();
                check_frame_len(inner_len)?;
                write_varint(dst, inner_len as i32);
                write_varint(dst, declared);
                dst.put_slice(&compressed);
            }
        }
        Ok(())
    }
}

fn check_frame_len(len: usize) -> Result<()> {
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    Ok(())
}

impl Encoder<Bytes> for FrameEncoder {
    type Error = ProtocolError;

    fn encode(&mut self, body: Bytes, dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();
        self.write_frame(&body, dst)?;
        if let Some(cipher) = self.cipher.as_mut() {
            cipher.apply(&mut dst[start..]);
        }
        Ok(())
    }
}

/// Both halves in one value, for a `Framed` over a single stream.
pub struct FrameCodec {
    pub decoder: FrameDecoder,
    pub encoder: FrameEncoder,
}

impl FrameCodec {
    pub fn new(max_frame: usize) -> Self {
        Self {
            decoder: FrameDecoder::new(max_frame),
            encoder: FrameEncoder::new(),
        }
    }

    pub fn enable_compression(&mut self, settings: CompressionSettings) {
        self.decoder.enable_compression(settings.threshold);
        self.encoder.enable_compression(settings);
    }

    pub fn enable_encryption(&mut self, encryptor: StreamEncryptor, decryptor: StreamDecryptor) {
        self.encoder.enable_encryption(encryptor);
        self.decoder.enable_encryption(decryptor);
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        self.decoder.decode(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>> {
        self.decoder.decode_eof(src)
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, body: Bytes, dst: &mut BytesMut) -> Result<()> {
        self.encoder.encode(body, dst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::utils::crypto::{CipherSession, SharedSecret};

    fn encode_one(encoder: &mut FrameEncoder, body: &[u8]) -> BytesMut {
        let mut out = BytesMut::new();
        encoder
            .encode(Bytes::copy_from_slice(body), &mut out)
            .expect("encode should succeed");
        out
    }

    #[test]
    fn test_plain_roundtrip_and_partial_delivery() {
        let mut encoder = FrameEncoder::new();
        let wire = encode_one(&mut encoder, b"\x00hello");
        assert_eq!(wire[0], 6);

        let mut decoder = FrameDecoder::new(MAX_FRAME_LEN);
        let mut buf = BytesMut::new();
        for (i, byte) in wire.iter().enumerate() {
            buf.put_u8(*byte);
            let decoded = decoder.decode(&mut buf).unwrap();
            if i + 1 < wire.len() {
                assert!(decoded.is_none());
            } else {
                assert_eq!(&decoded.unwrap()[..], b"\x00hello");
            }
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_length_rejected_before_allocation() {
        let mut decoder = FrameDecoder::new(1024);
        let mut buf = BytesMut::new();
        write_varint(&mut buf, 1025);
        let capacity = buf.capacity();

        assert!(matches!(
            decoder.decode(&mut buf),
            Err(ProtocolError::FrameTooLarge(1025))
        ));
        assert_eq!(buf.capacity(), capacity);
    }

    #[test]
    fn test_four_byte_length_prefix_rejected() {
        let mut decoder = FrameDecoder::new(MAX_FRAME_LEN);
        let mut buf = BytesMut::from(&[0xff, 0xff, 0xff, 0x01][..]);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_truncated_frame_at_eof() {
        let mut decoder = FrameDecoder::new(MAX_FRAME_LEN);
        let mut buf = BytesMut::from(&[0x05, 0x00, 0x01][..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(matches!(
            decoder.decode_eof(&mut buf),
            Err(ProtocolError::TruncatedFrame)
        ));

        let mut empty = BytesMut::new();
        assert!(decoder.decode_eof(&mut empty).unwrap().is_none());
    }

    #[test]
    fn test_compression_threshold_boundary() {
        let settings = CompressionSettings {
            threshold: 64,
            level: 6,
        };
        let mut encoder = FrameEncoder::new();
        encoder.enable_compression(settings);

        // threshold - 1: sent as-is behind a zero length
        let below = encode_one(&mut encoder, &[9u8; 63]);
        assert_eq!(below[0] as usize, 64);
        assert_eq!(below[1], 0);
        assert_eq!(&below[2..], &[9u8; 63][..]);

        // exactly threshold: compressed, declares the uncompressed size
        let at = encode_one(&mut encoder, &[9u8; 64]);
        let mut decoder = FrameDecoder::new(MAX_FRAME_LEN);
        decoder.enable_compression(64);
        let mut src = at.clone();
        let (_, prefix) = peek_varint(&src, 3).unwrap().unwrap();
        let mut inner = &src[prefix..];
        assert_eq!(read_varint(&mut inner).unwrap(), 64);
        assert_eq!(&decoder.decode(&mut src).unwrap().unwrap()[..], &[9u8; 64][..]);

        let mut src = below;
        assert_eq!(&decoder.decode(&mut src).unwrap().unwrap()[..], &[9u8; 63][..]);
    }

    #[test]
    fn test_declared_size_mismatch() {
        let compressed = compression::compress(&[1u8; 100], 6).unwrap();
        let mut inner = BytesMut::new();
        write_varint(&mut inner, 120);
        inner.put_slice(&compressed);
        let mut wire = BytesMut::new();
        write_varint(&mut wire, inner.len() as i32);
        wire.put_slice(&inner);

        let mut decoder = FrameDecoder::new(MAX_FRAME_LEN);
        decoder.enable_compression(64);
        assert!(matches!(
            decoder.decode(&mut wire),
            Err(ProtocolError::CompressionMismatch {
                declared: 120,
                actual: 100
            })
        ));
    }

    #[test]
    fn test_encryption_switch_applies_to_buffered_bytes() {
        let secret = SharedSecret::from_slice(&[7u8; 16]).unwrap();
        let (server_out, server_in) = CipherSession::new(&secret).unwrap().split();
        let (client_out, client_in) = CipherSession::new(&secret).unwrap().split();

        // client: one plaintext frame, then switches and sends two encrypted ones
        let mut client = FrameCodec::default();
        let mut wire = BytesMut::new();
        client.encode(Bytes::from_static(b"plain"), &mut wire).unwrap();
        client.encoder.enable_encryption(client_out);
        client.encode(Bytes::from_static(b"secret-1"), &mut wire).unwrap();
        client.encode(Bytes::from_static(b"secret-2"), &mut wire).unwrap();

        // server reads all of it in one go, switching after the first frame
        let mut server = FrameCodec::default();
        assert_eq!(&server.decode(&mut wire).unwrap().unwrap()[..], b"plain");
        server.decoder.enable_encryption(server_in);
        assert_eq!(&server.decode(&mut wire).unwrap().unwrap()[..], b"secret-1");
        assert_eq!(&server.decode(&mut wire).unwrap().unwrap()[..], b"secret-2");
        assert!(wire.is_empty());

        // and back the other way
        server.encoder.enable_encryption(server_out);
        client.decoder.enable_encryption(client_in);
        let mut wire = BytesMut::new();
        server.encode(Bytes::from_static(b"reply"), &mut wire).unwrap();
        assert_ne!(&wire[1..], b"reply");
        assert_eq!(&client.decode(&mut wire).unwrap().unwrap()[..], b"reply");
    }

    #[test]
    fn test_compressed_and_encrypted_byte_by_byte() {
        let secret = SharedSecret::from_slice(&[3u8; 16]).unwrap();
        let (enc, _) = CipherSession::new(&secret).unwrap().split();
        let (_, dec) = CipherSession::new(&secret).unwrap().split();
        let settings = CompressionSettings {
            threshold: 16,
            level: 6,
        };

        let mut encoder = FrameEncoder::new();
        encoder.enable_compression(settings);
        encoder.enable_encryption(enc);
        let mut wire = BytesMut::new();
        let big = vec![5u8; 4000];
        encoder.encode(Bytes::from(big.clone()), &mut wire).unwrap();
        encoder.encode(Bytes::from_static(b"tiny"), &mut wire).unwrap();

        let mut decoder = FrameDecoder::new(MAX_FRAME_LEN);
        decoder.enable_compression(16);
        decoder.enable_encryption(dec);
        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        for byte in wire.iter() {
            buf.put_u8(*byte);
            while let Some(frame) = decoder.decode(&mut buf).unwrap() {
                frames.push(frame);
            }
        }
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &big[..]);
        assert_eq!(&frames[1][..], b"tiny");
    }
}
