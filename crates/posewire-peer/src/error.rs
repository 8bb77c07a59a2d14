use std::time::Duration;

/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] posewire_transport::TransportError),

    /// Frame-level error, including peer closure.
    #[error("frame error: {0}")]
    Frame(#[from] posewire_frame::FrameError),

    /// Encoded control message does not fit in one datagram.
    #[error("control message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A control datagram did not contain valid JSON.
    #[error("malformed control message: {0}")]
    Decode(#[source] serde_json::Error),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// No producer connected within the discovery window.
    #[error("no producer connected within {0:?}")]
    DiscoveryTimeout(Duration),

    /// The event loop runtime could not be created.
    #[error("event loop error: {0}")]
    Runtime(#[source] std::io::Error),
}

impl PeerError {
    /// The peer closed the connection.
    pub fn is_connection_closed(&self) -> bool {
        matches!(
            self,
            PeerError::Frame(posewire_frame::FrameError::ConnectionClosed)
        )
    }

    /// A blocking receive gave up after its read timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            PeerError::Transport(posewire_transport::TransportError::Io(err)) => matches!(
                err.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            PeerError::DiscoveryTimeout(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;
