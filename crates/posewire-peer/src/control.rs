//! JSON-over-UDP control channel.
//!
//! One JSON document per datagram, no framing, no acknowledgement. The
//! JSON string `"#STOP#"` tells a listener to stop.

use std::ops::ControlFlow;
use std::time::Duration;

use posewire_transport::{DatagramSocket, Endpoint};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PeerError, Result};

/// Sentinel value that ends a control session.
pub const STOP_SENTINEL: &str = "#STOP#";
/// Default largest datagram sent or accepted.
pub const DEFAULT_MAX_DATAGRAM: usize = 2048;
/// Default control listener port.
pub const DEFAULT_CONTROL_PORT: u16 = 8888;

/// Control channel configuration.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Encoded messages larger than this are rejected on both sides.
    pub max_datagram_size: usize,
    /// Bound on each receive. `None` blocks forever.
    pub read_timeout: Option<Duration>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_datagram_size: DEFAULT_MAX_DATAGRAM,
            read_timeout: None,
        }
    }
}

/// One control message: any JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlMessage(serde_json::Value);

impl ControlMessage {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// The stop sentinel.
    pub fn stop() -> Self {
        Self(serde_json::Value::String(STOP_SENTINEL.to_string()))
    }

    /// True only for the exact JSON string `"#STOP#"`.
    pub fn is_stop(&self) -> bool {
        self.0.as_str() == Some(STOP_SENTINEL)
    }

    /// Serialize any value into a message.
    pub fn from_value<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self(serde_json::to_value(value)?))
    }

    /// Interpret the message as `T`, e.g. a pose vector `Vec<f64>`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.0.clone()).map_err(PeerError::Decode)
    }

    pub fn value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }

    /// Wire form: compact UTF-8 JSON.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    /// Parse one datagram. Invalid UTF-8 or JSON fails with [`PeerError::Decode`].
    pub fn decode(datagram: &[u8]) -> Result<Self> {
        serde_json::from_slice(datagram)
            .map(Self)
            .map_err(PeerError::Decode)
    }
}

impl From<serde_json::Value> for ControlMessage {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// How [`ControlChannel::serve`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// The stop sentinel arrived.
    Stopped,
    /// The handler asked to stop.
    Finished,
}

/// Blocking UDP endpoint that sends and receives control messages.
pub struct ControlChannel {
    socket: DatagramSocket,
    config: ControlConfig,
    buf: Vec<u8>,
}

impl ControlChannel {
    /// Bind with default configuration. Use port `0` for a send-only channel.
    pub fn bind(endpoint: Endpoint) -> Result<Self> {
        Self::bind_with_config(endpoint, ControlConfig::default())
    }

    pub fn bind_with_config(endpoint: Endpoint, config: ControlConfig) -> Result<Self> {
        let socket = DatagramSocket::bind(endpoint)?;
        socket.set_read_timeout(config.read_timeout)?;
        // One spare byte tells an oversized datagram from one that fits exactly.
        let buf = vec![0u8; config.max_datagram_size + 1];
        Ok(Self {
            socket,
            config,
            buf,
        })
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.socket.local_endpoint()
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Send `message` as one datagram.
    ///
    /// Fails with [`PeerError::MessageTooLarge`] before sending anything if the
    /// encoding exceeds the configured maximum.
    pub fn send(&self, target: Endpoint, message: &ControlMessage) -> Result<()> {
        let bytes = message.encode()?;
        if bytes.len() > self.config.max_datagram_size {
            return Err(PeerError::MessageTooLarge {
                size: bytes.len(),
                max: self.config.max_datagram_size,
            });
        }
        self.socket.send_to(&bytes, target)?;
        debug!(%target, len = bytes.len(), "sent control message");
        Ok(())
    }

    /// Serialize and send any value.
    pub fn send_value<T: Serialize + ?Sized>(&self, target: Endpoint, value: &T) -> Result<()> {
        self.send(target, &ControlMessage::from_value(value)?)
    }

    /// Tell the listener at `target` to stop.
    pub fn send_stop(&self, target: Endpoint) -> Result<()> {
        self.send(target, &ControlMessage::stop())
    }

    /// Block for the next message.
    pub fn receive(&mut self) -> Result<ControlMessage> {
        self.receive_from().map(|(message, _)| message)
    }

    /// Block for the next message and return its sender.
    pub fn receive_from(&mut self) -> Result<(ControlMessage, Endpoint)> {
        let (len, source) = self.socket.recv_from(&mut self.buf)?;
        if len > self.config.max_datagram_size {
            return Err(PeerError::MessageTooLarge {
                size: len,
                max: self.config.max_datagram_size,
            });
        }
        let message = ControlMessage::decode(&self.buf[..len])?;
        debug!(%source, len, "received control message");
        Ok((message, source))
    }

    /// Hand every message to `handler` until the stop sentinel arrives or the
    /// handler breaks.
    ///
    /// Malformed and oversized datagrams are logged and dropped. Socket errors,
    /// including an expired read timeout, end the loop.
    pub fn serve<F>(&mut self, mut handler: F) -> Result<ServeOutcome>
    where
        F: FnMut(ControlMessage, Endpoint) -> ControlFlow<()>,
    {
        info!(local = %self.local_endpoint(), "serving control messages");
        loop {
            match self.receive_from() {
                Ok((message, source)) if message.is_stop() => {
                    info!(%source, "received stop");
                    return Ok(ServeOutcome::Stopped);
                }
                Ok((message, source)) => {
                    if handler(message, source).is_break() {
                        return Ok(ServeOutcome::Finished);
                    }
                }
                Err(err @ (PeerError::Decode(_) | PeerError::MessageTooLarge { .. })) => {
                    warn!(error = %err, "dropped control datagram");
                }
                Err(err) => return Err(err),
            }
        }
    }
}
