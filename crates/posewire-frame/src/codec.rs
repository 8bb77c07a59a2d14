use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: length (4) + timestamp (8) = 12 bytes.
pub const HEADER_SIZE: usize = 12;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A timestamped payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Seconds since the Unix epoch, as stamped by the producer.
    pub timestamp: f64,
    /// The opaque payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>, timestamp: f64) -> Self {
        Self {
            timestamp,
            payload: payload.into(),
        }
    }

    /// Create a frame stamped with the current wall-clock time.
    pub fn now(payload: impl Into<Bytes>) -> Self {
        Self::new(payload, unix_timestamp())
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_frame(&self.payload, self.timestamp, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    /// Payload length in bytes.
    pub length: u32,
    /// Producer timestamp in seconds since the Unix epoch.
    pub timestamp: f64,
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌─────────────┬────────────────┬─────────────────┐
/// │ Length      │ Timestamp      │ Payload         │
/// │ (u32, 4B LE)│ (f64, 8B LE)   │ (Length bytes)  │
/// └─────────────┴────────────────┴─────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], timestamp: f64, dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le(payload.len() as u32);
    dst.put_f64_le(timestamp);
    dst.put_slice(payload);
    Ok(())
}

/// Decode the 12-byte header at the start of `src`.
///
/// Extra bytes after the header are ignored.
pub fn decode_header(src: &[u8]) -> Result<FrameHeader> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::MalformedHeader {
            available: src.len(),
        });
    }
    let mut header = &src[..HEADER_SIZE];
    let length = header.get_u32_le();
    let timestamp = header.get_f64_le();
    Ok(FrameHeader { length, timestamp })
}

/// Decode one complete frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let header = decode_header(&src[..])?;
    let payload_len = header.length as usize;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        timestamp: header.timestamp,
        payload,
    }))
}

/// Configuration for frame streams.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

/// Current wall-clock time in seconds since the Unix epoch.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
