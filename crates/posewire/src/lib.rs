//! Framed sensor and pose streaming over TCP with broadcast discovery.
//!
//! posewire moves timestamped binary frames (camera images, point clouds,
//! pose vectors) from producers to consumers that find each other with a
//! single broadcast datagram, and carries small JSON commands over UDP.
//!
//! # Crate Structure
//!
//! - [`transport`]: Endpoints, TCP data streams and UDP datagram sockets
//! - [`frame`]: `[len][timestamp][payload]` framing and incremental decoding
//! - [`peer`]: Event loop, discovery, latest-frame streaming and the control channel (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use posewire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use posewire_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use posewire_peer::*;
}
