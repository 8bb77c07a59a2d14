use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::codec::{decode_header, Frame, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Where the decoder is inside the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodeState {
    /// Waiting for the 12 header bytes.
    AwaitingHeader,
    /// Header decoded; waiting for `length` payload bytes.
    AwaitingPayload { length: u32, timestamp: f64 },
}

/// Receive-side state machine that reassembles frames from arbitrary chunks.
///
/// Bytes are pushed in with [`extend`](Self::extend) as they arrive, in pieces
/// of any size, and complete frames are pulled out with
/// [`next_frame`](Self::next_frame). Partial input is never an error.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    state: DecodeState,
    max_payload: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder accepting payloads up to [`DEFAULT_MAX_PAYLOAD`].
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create a decoder with an explicit payload limit.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            state: DecodeState::AwaitingHeader,
            max_payload,
        }
    }

    /// Append received bytes to the accumulation buffer.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pull the next complete frame, if one is fully buffered.
    ///
    /// Call repeatedly until it returns `Ok(None)`: a single chunk may carry
    /// several frames, which come out one at a time in arrival order.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                DecodeState::AwaitingHeader => {
                    if self.buf.len() < HEADER_SIZE {
                        return Ok(None);
                    }
                    let header = decode_header(&self.buf[..])?;
                    if header.length as usize > self.max_payload {
                        debug!(
                            length = header.length,
                            max = self.max_payload,
                            "rejecting oversized frame"
                        );
                        return Err(FrameError::PayloadTooLarge {
                            size: header.length as usize,
                            max: self.max_payload,
                        });
                    }
                    self.buf.advance(HEADER_SIZE);
                    trace!(length = header.length, "frame header decoded");
                    self.state = DecodeState::AwaitingPayload {
                        length: header.length,
                        timestamp: header.timestamp,
                    };
                }
                DecodeState::AwaitingPayload { length, timestamp } => {
                    let length = length as usize;
                    if self.buf.len() < length {
                        return Ok(None);
                    }
                    let payload = self.buf.split_to(length).freeze();
                    self.state = DecodeState::AwaitingHeader;
                    return Ok(Some(Frame { timestamp, payload }));
                }
            }
        }
    }

    /// Current parse state.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Bytes still missing before the current header or payload is complete.
    pub fn bytes_remaining(&self) -> usize {
        match self.state {
            DecodeState::AwaitingHeader => HEADER_SIZE.saturating_sub(self.buf.len()),
            DecodeState::AwaitingPayload { length, .. } => {
                (length as usize).saturating_sub(self.buf.len())
            }
        }
    }

    /// Whether a frame is partially received.
    pub fn has_partial_frame(&self) -> bool {
        !self.buf.is_empty() || self.state != DecodeState::AwaitingHeader
    }

    /// Drop any partially received frame. Returns the number of bytes discarded.
    pub fn reset(&mut self) -> usize {
        let discarded = self.buf.len()
            + match self.state {
                DecodeState::AwaitingHeader => 0,
                DecodeState::AwaitingPayload { .. } => HEADER_SIZE,
            };
        self.buf.clear();
        self.state = DecodeState::AwaitingHeader;
        discarded
    }

    /// Update the payload limit for subsequent headers.
    pub fn set_max_payload(&mut self, max_payload: usize) {
        self.max_payload = max_payload;
    }
}
