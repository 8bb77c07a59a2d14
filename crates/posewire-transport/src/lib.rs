//! Network transport primitives for posewire.
//!
//! Provides the sockets everything else is built on:
//! - [`DataListener`] / [`DataStream`]: the connection-oriented data path (TCP)
//!   carrying length-prefixed frames from producers to consumers
//! - [`DatagramSocket`] / [`AsyncDatagramSocket`]: connectionless sockets used for
//!   discovery announcements and control messages (UDP)
//!
//! This is the lowest layer of posewire. Stream sockets are readiness-driven and
//! must be used from inside a tokio runtime; the blocking datagram socket can be
//! used from any thread.

pub mod datagram;
pub mod endpoint;
pub mod error;
pub mod stream;

pub use datagram::{AsyncDatagramSocket, DatagramSocket};
pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use stream::{DataListener, DataStream};
