//! Frame streaming between producers and consumers.
//!
//! This is the "just works" layer. A [`Consumer`] announces itself and
//! receives frames from every [`Producer`] that connects back; producers
//! stream only their latest frame, dropping stale ones. Everything runs on
//! a single-threaded [`EventLoop`]. The [`ControlChannel`] carries JSON
//! commands over UDP.

pub mod connection;
pub mod control;
pub mod discovery;
pub mod error;
pub mod event_loop;
pub mod latest;

pub use connection::{Connection, FrameHandler};
pub use control::{
    ControlChannel, ControlConfig, ControlMessage, ServeOutcome, DEFAULT_CONTROL_PORT,
    DEFAULT_MAX_DATAGRAM, STOP_SENTINEL,
};
pub use discovery::{
    Consumer, DiscoveryConfig, HandlerFactory, Producer, DEFAULT_DATA_PORT, DEFAULT_DISCOVERY_PORT,
    DEFAULT_MARKER,
};
pub use error::{PeerError, Result};
pub use event_loop::{EventLoop, StopHandle};
pub use latest::{LatestFrame, LatestFrameSubscriber};
