use std::io::ErrorKind;

use bytes::BytesMut;

use crate::codec::{encode_frame, Frame, DEFAULT_MAX_PAYLOAD};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Outcome of one write opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProgress {
    /// The buffered frame has been fully written (or nothing was buffered).
    Complete,
    /// The socket stopped accepting bytes; `remaining` are still buffered.
    Blocked { remaining: usize },
}

/// Send-side state machine holding at most one encoded frame.
///
/// The machine is `Idle` when nothing is buffered and `Sending` while an
/// encoded frame is only partially written. A new frame can only be loaded
/// while idle, so a frame in flight is never interleaved with another.
#[derive(Debug)]
pub struct OutboundFrame {
    buf: BytesMut,
    offset: usize,
    max_payload: usize,
}

impl Default for OutboundFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundFrame {
    /// Create an idle machine accepting payloads up to [`DEFAULT_MAX_PAYLOAD`].
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Create an idle machine with an explicit payload limit.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            offset: 0,
            max_payload,
        }
    }

    /// No frame is buffered.
    pub fn is_idle(&self) -> bool {
        self.offset >= self.buf.len()
    }

    /// Bytes of the current frame not yet written.
    pub fn pending(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// Encode `frame` for sending.
    ///
    /// Returns `Ok(false)` without touching the buffer if a frame is still in flight.
    pub fn load(&mut self, frame: &Frame) -> Result<bool> {
        if !self.is_idle() {
            return Ok(false);
        }
        if frame.payload.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.max_payload,
            });
        }
        self.buf.clear();
        self.offset = 0;
        encode_frame(&frame.payload, frame.timestamp, &mut self.buf)?;
        Ok(true)
    }

    /// Write as many buffered bytes as `write` accepts.
    ///
    /// `write` behaves like a non-blocking `Write::write`: `WouldBlock` ends
    /// this opportunity, `Interrupted` is retried and a zero-length write
    /// means the peer is gone.
    pub fn write_with<F>(&mut self, mut write: F) -> Result<WriteProgress>
    where
        F: FnMut(&[u8]) -> std::io::Result<usize>,
    {
        while self.offset < self.buf.len() {
            match write(&self.buf[self.offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => self.offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(WriteProgress::Blocked {
                        remaining: self.pending(),
                    });
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.buf.clear();
        self.offset = 0;
        Ok(WriteProgress::Complete)
    }

    /// Drop any partially written frame. Returns the number of unsent bytes.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending();
        self.buf.clear();
        self.offset = 0;
        dropped
    }
}
