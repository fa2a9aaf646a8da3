//! Length-prefixed frames on TCP streams.
//!
//! A frame is a `u32` big-endian payload length followed by the payload.
//! Payload limits are capped at [`MAX_FRAME_PAYLOAD`], so the first byte of
//! every valid frame is zero and can never be mistaken for a legacy status
//! ping (`0xFE`).

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Hard ceiling on any configured payload limit.
pub const MAX_FRAME_PAYLOAD: u32 = 0x00FF_FFFF;

const LENGTH_PREFIX: usize = 4;

/// Frame size limit shared by both directions of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameConfig {
    /// Largest payload accepted or sent, in bytes.
    pub max_payload_size: u32,
}

impl FrameConfig {
    /// Limit of `max_payload_size` bytes, capped at [`MAX_FRAME_PAYLOAD`].
    pub fn new(max_payload_size: u32) -> Self {
        if max_payload_size > MAX_FRAME_PAYLOAD {
            tracing::warn!(
                "Frame limit {max_payload_size} exceeds {MAX_FRAME_PAYLOAD}, capping"
            );
        }
        Self {
            max_payload_size: max_payload_size.min(MAX_FRAME_PAYLOAD),
        }
    }

    fn check(&self, size: u32) -> Result<(), FrameError> {
        if size > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.max_payload_size,
            });
        }
        Ok(())
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self::new(2_097_152)
    }
}

/// Framing failure.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Declared or actual payload is over the limit.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Payload size.
        size: u32,
        /// Configured limit.
        max: u32,
    },

    /// Peer closed the stream, possibly mid-frame.
    #[error("connection closed")]
    ConnectionClosed,

    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Whether the peer simply went away rather than misbehaving.
    pub fn is_disconnect(&self) -> bool {
        match self {
            FrameError::ConnectionClosed => true,
            FrameError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            FrameError::PayloadTooLarge { .. } => false,
        }
    }
}

fn eof_as_closed(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Prefix `payload` with its length in one buffer.
pub fn encode_frame(payload: &[u8], config: &FrameConfig) -> Result<Vec<u8>, FrameError> {
    let size = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    config.check(size)?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX + payload.len());
    frame.extend_from_slice(&size.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Read one frame. The length is checked before the payload is allocated.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Vec<u8>, FrameError> {
    let mut prefix = [0u8; LENGTH_PREFIX];
    reader.read_exact(&mut prefix).await.map_err(eof_as_closed)?;
    let size = u32::from_be_bytes(prefix);
    config.check(size)?;

    let mut payload = vec![0u8; size as usize];
    reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;
    Ok(payload)
}

/// Write one frame and flush it.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let frame = encode_frame(payload, config)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
