//! Threshold LZ4 compression for packet bodies.
//!
//! Compression is off until the login phase negotiates it. Once enabled,
//! every body carries a flag byte; bodies at or above the threshold are
//! LZ4-compressed, smaller ones travel as-is.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

/// Compression flag: body is uncompressed.
pub const COMPRESSION_FLAG_NONE: u8 = 0x00;

/// Compression flag: body is LZ4-compressed with a size prefix.
pub const COMPRESSION_FLAG_LZ4: u8 = 0x01;

/// Largest uncompressed body a peer may declare.
pub const MAX_UNCOMPRESSED_SIZE: usize = 8 * 1024 * 1024;

/// Wrap a packet body with the compression flag, compressing if large enough.
pub fn compress_payload(data: &[u8], threshold: usize) -> Vec<u8> {
    if data.len() < threshold {
        let mut out = Vec::with_capacity(1 + data.len());
        out.push(COMPRESSION_FLAG_NONE);
        out.extend_from_slice(data);
        out
    } else {
        let compressed = compress_prepend_size(data);
        let mut out = Vec::with_capacity(1 + compressed.len());
        out.push(COMPRESSION_FLAG_LZ4);
        out.extend_from_slice(&compressed);
        out
    }
}

/// Unwrap a received body, decompressing if flagged.
///
/// A compressed body that declares a size below `threshold` is rejected:
/// the peer should have sent it uncompressed.
pub fn decompress_payload(data: &[u8], threshold: usize) -> Result<Vec<u8>, CompressionError> {
    let Some((&flag, body)) = data.split_first() else {
        return Err(CompressionError::EmptyPayload);
    };

    match flag {
        COMPRESSION_FLAG_NONE => Ok(body.to_vec()),
        COMPRESSION_FLAG_LZ4 => {
            let declared = declared_size(body)?;
            if declared < threshold {
                return Err(CompressionError::BelowThreshold {
                    size: declared,
                    threshold,
                });
            }
            if declared > MAX_UNCOMPRESSED_SIZE {
                return Err(CompressionError::TooLarge(declared));
            }
            decompress_size_prepended(body)
                .map_err(|e| CompressionError::DecompressFailed(e.to_string()))
        }
        flag => Err(CompressionError::UnknownFlag(flag)),
    }
}

fn declared_size(body: &[u8]) -> Result<usize, CompressionError> {
    let prefix: [u8; 4] = body
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| CompressionError::DecompressFailed("missing size prefix".into()))?;
    Ok(u32::from_le_bytes(prefix) as usize)
}

/// Errors that can occur during body decompression.
#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    /// The body was empty, no compression flag present.
    #[error("empty payload, no compression flag")]
    EmptyPayload,
    /// LZ4 decompression failed.
    #[error("LZ4 decompression failed: {0}")]
    DecompressFailed(String),
    /// An unknown compression flag byte was encountered.
    #[error("unknown compression flag: 0x{0:02X}")]
    UnknownFlag(u8),
    /// A compressed body was smaller than the negotiated threshold.
    #[error("compressed body of {size} bytes is below threshold {threshold}")]
    BelowThreshold {
        /// Declared uncompressed size.
        size: usize,
        /// Negotiated threshold.
        threshold: usize,
    },
    /// The declared uncompressed size exceeds [`MAX_UNCOMPRESSED_SIZE`].
    #[error("declared uncompressed size {0} is too large")]
    TooLarge(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: usize = 256;

    #[test]
    fn test_small_body_is_not_compressed() {
        let payload = compress_payload(b"tiny", THRESHOLD);
        assert_eq!(payload[0], COMPRESSION_FLAG_NONE);
        assert_eq!(&payload[1..], b"tiny");
    }

    #[test]
    fn test_large_body_is_compressed() {
        let data = vec![42u8; 1024];
        let payload = compress_payload(&data, THRESHOLD);
        assert_eq!(payload[0], COMPRESSION_FLAG_LZ4);
        assert!(payload.len() < data.len());
        assert_eq!(decompress_payload(&payload, THRESHOLD).unwrap(), data);
    }

    #[test]
    fn test_body_at_threshold_is_compressed() {
        let data = vec![1u8; THRESHOLD];
        assert_eq!(compress_payload(&data, THRESHOLD)[0], COMPRESSION_FLAG_LZ4);
    }

    #[test]
    fn test_compressed_body_below_threshold_rejected() {
        let payload = compress_payload(&[9u8; 32], 0);
        let result = decompress_payload(&payload, THRESHOLD);
        assert!(matches!(
            result,
            Err(CompressionError::BelowThreshold { size: 32, .. })
        ));
    }

    #[test]
    fn test_oversized_declaration_rejected() {
        let mut payload = vec![COMPRESSION_FLAG_LZ4];
        payload.extend_from_slice(&u32::MAX.to_le_bytes());
        payload.extend_from_slice(&[0u8; 8]);
        let result = decompress_payload(&payload, THRESHOLD);
        assert!(matches!(result, Err(CompressionError::TooLarge(_))));
    }

    #[test]
    fn test_empty_payload_returns_error() {
        let result = decompress_payload(&[], THRESHOLD);
        assert!(matches!(result, Err(CompressionError::EmptyPayload)));
    }

    #[test]
    fn test_unknown_flag_returns_error() {
        let result = decompress_payload(&[0xFF, 1, 2, 3], THRESHOLD);
        assert!(matches!(result, Err(CompressionError::UnknownFlag(0xFF))));
    }

    #[test]
    fn test_truncated_lz4_returns_error() {
        let result = decompress_payload(&[COMPRESSION_FLAG_LZ4, 0x00, 0x01], THRESHOLD);
        assert!(matches!(result, Err(CompressionError::DecompressFailed(_))));
    }
}
