//! Length-prefixed, timestamped message framing.
//!
//! Every unit sent over a posewire data stream is framed with:
//! - A 4-byte little-endian payload length
//! - An 8-byte little-endian `f64` timestamp (seconds since the Unix epoch)
//!
//! followed by exactly `length` opaque payload bytes. The payload is never
//! interpreted here: it may be an image, a pose vector or anything else.
//!
//! Besides the codec this crate holds the two stream state machines used by
//! the event loop ([`FrameDecoder`] for reassembly, [`OutboundFrame`] for
//! partial writes) and blocking adapters over `Read`/`Write`.

pub mod codec;
pub mod decoder;
pub mod error;
pub mod outbound;
pub mod reader;
pub mod writer;

pub use bytes::Bytes;
pub use codec::{
    decode_frame, decode_header, encode_frame, unix_timestamp, Frame, FrameConfig, FrameHeader,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use decoder::{DecodeState, FrameDecoder};
pub use error::{FrameError, Result};
pub use outbound::{OutboundFrame, WriteProgress};
pub use reader::FrameReader;
pub use writer::FrameWriter;
