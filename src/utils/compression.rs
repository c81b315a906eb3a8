use crate::error::{ProtocolError, Result};
use flate2::read::{ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use std::io::Read;

/// Largest uncompressed packet a peer may declare (8 MiB).
pub const MAX_UNCOMPRESSED_SIZE: usize = 8 * 1024 * 1024;

/// Default zlib level used for outbound frames.
pub const DEFAULT_LEVEL: u32 = 6;

/// Initial output capacity per compressed input byte.
const INITIAL_RATIO: usize = 4;

/// Compresses data with zlib at the given level (0-9)
///
/// # Errors
/// Returns `ProtocolError::CompressionFailure` if compression fails
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(data, Compression::new(level.min(9)));
    let mut out = Vec::with_capacity(data.len() / 2 + 16);
    encoder
        .read_to_end(&mut out)
        .map_err(|_| ProtocolError::CompressionFailure)?;
    Ok(out)
}

/// Inflates data that must come out at exactly `declared` bytes.
///
/// # Errors
/// Returns `ProtocolError::CompressionMismatch` when the stream inflates to a
/// different size, and `ProtocolError::DecompressionFailure` for corrupt input.
pub fn decompress_exact(data: &[u8], declared: usize) -> Result<Vec<u8>> {
    // `take` bounds growth; the first allocation follows the input size
    let mut reader = ZlibDecoder::new(data).take(declared as u64 + 1);
    let mut out = Vec::with_capacity(declared.min(data.len().saturating_mul(INITIAL_RATIO)));
    reader
        .read_to_end(&mut out)
        .map_err(|_| ProtocolError::DecompressionFailure)?;
    if out.len() != declared {
        return Err(ProtocolError::CompressionMismatch {
            declared,
            actual: out.len(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_zlib_roundtrip() {
        let original = b"Hello, World! This is a test of zlib compression.";
        let compressed = compress(original, DEFAULT_LEVEL).unwrap();
        let decompressed = decompress_exact(&compressed, original.len()).unwrap();
        assert_eq!(original.as_slice(), decompressed.as_slice());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_bomb_is_cut_off() {
        // 4 MiB of zeros compresses to a few KiB
        let bomb = compress(&vec![0u8; 4 * 1024 * 1024], 9).unwrap();
        assert!(bomb.len() < 64 * 1024);
        assert!(matches!(
            decompress_exact(&bomb, 1024 * 1024),
            Err(ProtocolError::CompressionMismatch {
                declared: 1_048_576,
                actual: 1_048_577
            })
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_inflated_claim_is_not_trusted() {
        let compressed = compress(&[3u8; 64], DEFAULT_LEVEL).unwrap();
        let out = decompress_exact(&compressed, MAX_UNCOMPRESSED_SIZE);
        assert!(matches!(
            out,
            Err(ProtocolError::CompressionMismatch {
                declared: MAX_UNCOMPRESSED_SIZE,
                actual: 64
            })
        ));
    }

    #[test]
    fn test_malformed_stream() {
        let garbage = vec![0x10, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff];
        assert!(decompress_exact(&garbage, 4).is_err());
        assert!(decompress_exact(&garbage, MAX_UNCOMPRESSED_SIZE).is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_exact_size_mismatch() {
        let compressed = compress(&[7u8; 300], DEFAULT_LEVEL).unwrap();
        assert_eq!(decompress_exact(&compressed, 300).unwrap().len(), 300);
        assert!(matches!(
            decompress_exact(&compressed, 301),
            Err(ProtocolError::CompressionMismatch {
                declared: 301,
                actual: 300
            })
        ));
        assert!(matches!(
            decompress_exact(&compressed, 299),
            Err(ProtocolError::CompressionMismatch {
                declared: 299,
                actual: 300
            })
        ));
    }
}
