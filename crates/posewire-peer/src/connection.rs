use std::io::ErrorKind;

use bytes::Bytes;
use posewire_frame::{FrameConfig, FrameDecoder, FrameError, OutboundFrame, WriteProgress};
use posewire_transport::{DataStream, Endpoint};
use tracing::{debug, info, trace, warn};

use crate::error::{PeerError, Result};
use crate::event_loop::StopHandle;
use crate::latest::LatestFrameSubscriber;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Consumer-side callbacks for one connection.
///
/// Frames arrive in the exact order they were received on the connection.
/// `on_close` is called exactly once when the connection ends for any reason;
/// `on_error` precedes it when the end was caused by an error.
pub trait FrameHandler {
    /// A complete frame arrived.
    fn on_frame(&mut self, payload: Bytes, timestamp: f64);

    /// The connection is gone. Any partially received frame was discarded.
    fn on_close(&mut self) {}

    /// The connection failed and is about to close.
    fn on_error(&mut self, err: &PeerError) {
        let _ = err;
    }
}

impl<F> FrameHandler for F
where
    F: FnMut(Bytes, f64),
{
    fn on_frame(&mut self, payload: Bytes, timestamp: f64) {
        self(payload, timestamp)
    }
}

/// One data connection to one remote endpoint.
///
/// Owns the socket, the receive accumulation buffer with its parse state, and
/// the single outbound frame slot. A connection is either a receiver
/// ([`receive`](Self::receive)) or a latest-frame sender
/// ([`stream_latest`](Self::stream_latest)); both consume it, so closing is
/// simply dropping the socket.
#[derive(Debug)]
pub struct Connection {
    stream: DataStream,
    decoder: FrameDecoder,
    outbound: OutboundFrame,
}

impl Connection {
    /// Wrap a connected stream.
    pub fn new(stream: DataStream, config: &FrameConfig) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::with_max_payload(config.max_payload_size),
            outbound: OutboundFrame::with_max_payload(config.max_payload_size),
        }
    }

    /// The remote endpoint.
    pub fn peer(&self) -> Endpoint {
        self.stream.peer()
    }

    /// Receive frames until the peer closes, an error occurs, or `stop` fires.
    ///
    /// Partial reads are normal; only end-of-stream or an I/O/framing error
    /// end the connection. Errors are reported to the handler and returned.
    pub async fn receive<H>(mut self, handler: &mut H, stop: &StopHandle) -> Result<()>
    where
        H: FrameHandler + ?Sized,
    {
        let peer = self.peer();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        let mut delivered = 0u64;

        let result = loop {
            tokio::select! {
                _ = stop.stopped() => {
                    debug!(%peer, "receive stopped");
                    break Ok(());
                }
                ready = self.stream.readable() => {
                    if let Err(err) = ready {
                        break Err(PeerError::Frame(FrameError::Io(err)));
                    }
                    match self.read_available(&mut chunk, handler, &mut delivered) {
                        Ok(true) => {}
                        Ok(false) => {
                            info!(%peer, frames = delivered, "peer closed connection");
                            break Ok(());
                        }
                        Err(err) => break Err(err),
                    }
                }
            }
        };

        let discarded = self.decoder.reset();
        if discarded > 0 {
            debug!(%peer, discarded, "discarded partial frame");
        }
        if let Err(err) = &result {
            warn!(%peer, error = %err, "connection failed");
            handler.on_error(err);
        }
        handler.on_close();
        result
    }

    /// Drain what the socket has and deliver every completed frame.
    ///
    /// Returns `Ok(false)` when the peer has closed the stream.
    fn read_available<H>(
        &mut self,
        chunk: &mut [u8],
        handler: &mut H,
        delivered: &mut u64,
    ) -> Result<bool>
    where
        H: FrameHandler + ?Sized,
    {
        let read = match self.stream.try_read(chunk) {
            Ok(0) => return Ok(false),
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(true),
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(true),
            Err(err) => return Err(FrameError::Io(err).into()),
        };

        trace!(peer = %self.stream.peer(), bytes = read, "read chunk");
        self.decoder.extend(&chunk[..read]);
        while let Some(frame) = self.decoder.next_frame()? {
            *delivered += 1;
            handler.on_frame(frame.payload, frame.timestamp);
        }
        Ok(true)
    }

    /// Send the newest published frame every time the previous one is fully written.
    ///
    /// While idle the connection takes the latest frame from `source`; while
    /// sending it writes as much as the socket accepts per readiness event.
    /// Frames published in between are overwritten, never queued. Inbound
    /// bytes are drained and ignored so peer closure is noticed promptly.
    /// Ends when the peer closes, `stop` fires or every publisher is dropped.
    pub async fn stream_latest(
        mut self,
        source: &mut LatestFrameSubscriber,
        stop: &StopHandle,
    ) -> Result<u64> {
        let peer = self.peer();
        let mut sent = 0u64;
        let mut scratch = [0u8; 1024];

        loop {
            if self.outbound.is_idle() {
                if let Some(frame) = source.take_latest() {
                    self.outbound.load(&frame)?;
                }
            }

            if self.outbound.is_idle() {
                tokio::select! {
                    _ = stop.stopped() => break,
                    next = source.next() => match next {
                        Some(frame) => {
                            self.outbound.load(&frame)?;
                        }
                        None => {
                            debug!(%peer, "frame source closed");
                            break;
                        }
                    },
                    ready = self.stream.readable() => {
                        ready.map_err(FrameError::Io)?;
                        self.discard_inbound(&mut scratch)?;
                    }
                }
            } else {
                tokio::select! {
                    _ = stop.stopped() => break,
                    ready = self.stream.writable() => {
                        ready.map_err(FrameError::Io)?;
                        let stream = &self.stream;
                        match self.outbound.write_with(|buf| stream.try_write(buf))? {
                            WriteProgress::Complete => {
                                sent += 1;
                                trace!(%peer, sent, "frame sent");
                            }
                            WriteProgress::Blocked { remaining } => {
                                trace!(%peer, remaining, "socket full");
                            }
                        }
                    }
                    ready = self.stream.readable() => {
                        ready.map_err(FrameError::Io)?;
                        self.discard_inbound(&mut scratch)?;
                    }
                }
            }
        }

        let dropped = self.outbound.clear();
        if dropped > 0 {
            debug!(%peer, dropped, "dropped partially sent frame");
        }
        info!(%peer, frames = sent, "stream ended");
        Ok(sent)
    }

    fn discard_inbound(&mut self, scratch: &mut [u8]) -> Result<()> {
        match self.stream.try_read(scratch) {
            Ok(0) => Err(FrameError::ConnectionClosed.into()),
            Ok(n) => {
                trace!(peer = %self.stream.peer(), bytes = n, "ignored inbound bytes");
                Ok(())
            }
            Err(err)
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::Interrupted =>
            {
                Ok(())
            }
            Err(err) => Err(FrameError::Io(err).into()),
        }
    }
}
