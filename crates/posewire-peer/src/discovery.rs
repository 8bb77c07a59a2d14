//! Broadcast discovery and connect-back.
//!
//! A consumer listens on the data port and announces itself with a marker
//! datagram sent to a broadcast or multicast address. Every producer that
//! hears the marker connects back to the announcing host and starts
//! streaming its latest frames over that connection. Every producer that
//! answers is admitted.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use posewire_frame::FrameConfig;
use posewire_transport::{AsyncDatagramSocket, DataListener, DataStream, DatagramSocket, Endpoint};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::connection::{Connection, FrameHandler};
use crate::error::{PeerError, Result};
use crate::event_loop::StopHandle;
use crate::latest::LatestFrame;

/// Port producers listen on for announcements.
pub const DEFAULT_DISCOVERY_PORT: u16 = 1024;
/// Port consumers accept data connections on.
pub const DEFAULT_DATA_PORT: u16 = 1024;
/// Announcement payload.
pub const DEFAULT_MARKER: &str = "EtherSensePing!!";
/// Smallest announcement buffer a producer reads into.
pub const MAX_ANNOUNCEMENT_SIZE: usize = 42;
/// Default bound on the wait for the first producer.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);
/// Default bound on a producer's connect-back.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Discovery configuration shared by consumers and producers.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Where consumers send announcements (broadcast or multicast group).
    pub announce_to: Endpoint,
    /// Where producers listen for announcements.
    pub listen_on: Endpoint,
    /// Where consumers accept data connections.
    pub data_listen: Endpoint,
    /// Port producers connect back to on the announcing host.
    pub data_port: u16,
    /// Announcement payload.
    pub marker: String,
    /// Bound on the wait for the first producer. `None` waits forever.
    pub discovery_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    /// Share the announcement port with other producers on the same host.
    pub reuse_address: bool,
    /// Framing limits for every data connection.
    pub frame: FrameConfig,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            announce_to: Endpoint::new(Ipv4Addr::BROADCAST, DEFAULT_DISCOVERY_PORT),
            listen_on: Endpoint::any(DEFAULT_DISCOVERY_PORT),
            data_listen: Endpoint::any(DEFAULT_DATA_PORT),
            data_port: DEFAULT_DATA_PORT,
            marker: DEFAULT_MARKER.to_string(),
            discovery_timeout: Some(DEFAULT_DISCOVERY_TIMEOUT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reuse_address: true,
            frame: FrameConfig::default(),
        }
    }
}

/// Builds one [`FrameHandler`] per admitted producer.
pub trait HandlerFactory {
    type Handler: FrameHandler + 'static;

    fn handler_for(&mut self, peer: Endpoint) -> Self::Handler;
}

impl<F, H> HandlerFactory for F
where
    F: FnMut(Endpoint) -> H,
    H: FrameHandler + 'static,
{
    type Handler = H;

    fn handler_for(&mut self, peer: Endpoint) -> H {
        self(peer)
    }
}

/// The receiving side: listens for data connections and announces itself.
pub struct Consumer {
    listener: DataListener,
    announcer: AsyncDatagramSocket,
    config: DiscoveryConfig,
}

impl Consumer {
    /// Bind the data listener and a broadcast-capable announcement socket.
    ///
    /// Must be called inside the event loop.
    pub async fn bind(config: DiscoveryConfig) -> Result<Self> {
        let listener = DataListener::bind(config.data_listen).await?;
        let socket = DatagramSocket::bind(Endpoint::any(0))?;
        socket.set_broadcast(true)?;
        let announcer = socket.into_async()?;
        Ok(Self {
            listener,
            announcer,
            config,
        })
    }

    /// Where producers should connect.
    pub fn data_endpoint(&self) -> Endpoint {
        self.listener.local_endpoint()
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Send one announcement to the configured discovery endpoint.
    ///
    /// Fire and forget. Call again to re-run discovery.
    pub async fn announce(&self) -> Result<()> {
        self.announce_to(self.config.announce_to).await
    }

    /// Send one announcement to an explicit endpoint.
    pub async fn announce_to(&self, target: Endpoint) -> Result<()> {
        self.announcer
            .send_to(self.config.marker.as_bytes(), target)
            .await?;
        info!(%target, data = %self.data_endpoint(), "announced consumer");
        Ok(())
    }

    /// Accept the next producer connection.
    pub async fn accept(&self) -> Result<Connection> {
        let stream = self.listener.accept().await?;
        Ok(Connection::new(stream, &self.config.frame))
    }

    /// Accept the first producer, bounded by the discovery timeout.
    pub async fn wait_for_producer(&self) -> Result<Connection> {
        match self.config.discovery_timeout {
            Some(limit) => tokio::time::timeout(limit, self.accept())
                .await
                .map_err(|_| PeerError::DiscoveryTimeout(limit))?,
            None => self.accept().await,
        }
    }

    /// Announce, then receive from every producer that answers until `stop` fires.
    pub async fn run<F: HandlerFactory>(&self, factory: F, stop: &StopHandle) -> Result<usize> {
        self.announce().await?;
        self.serve(factory, stop).await
    }

    /// Receive from every producer that connects until `stop` fires.
    ///
    /// The first producer must arrive within the discovery timeout. Each
    /// connection runs as its own local task with a handler from `factory`.
    /// Returns the number of producers admitted.
    pub async fn serve<F: HandlerFactory>(&self, mut factory: F, stop: &StopHandle) -> Result<usize> {
        let first = tokio::select! {
            _ = stop.stopped() => return Ok(0),
            conn = self.wait_for_producer() => conn?,
        };

        let mut receivers = JoinSet::new();
        spawn_receiver(&mut receivers, first, &mut factory, stop);
        let mut admitted = 1;
        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                Some(done) = receivers.join_next(), if !receivers.is_empty() => {
                    receiver_finished(done);
                }
                conn = self.accept() => match conn {
                    Ok(conn) => {
                        spawn_receiver(&mut receivers, conn, &mut factory, stop);
                        admitted += 1;
                    }
                    Err(err) => warn!(error = %err, "failed to accept producer"),
                },
            }
        }

        while let Some(done) = receivers.join_next().await {
            receiver_finished(done);
        }
        Ok(admitted)
    }
}

fn spawn_receiver<F: HandlerFactory>(
    receivers: &mut JoinSet<Result<()>>,
    conn: Connection,
    factory: &mut F,
    stop: &StopHandle,
) {
    let peer = conn.peer();
    info!(%peer, "producer connected");
    let mut handler = factory.handler_for(peer);
    let stop = stop.clone();
    receivers.spawn_local(async move { conn.receive(&mut handler, &stop).await });
}

fn receiver_finished(done: std::result::Result<Result<()>, JoinError>) {
    match done {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(error = %err, "producer connection ended with error"),
        Err(err) => warn!(error = %err, "receiver task failed"),
    }
}

/// The sending side: answers announcements by connecting back and streaming.
pub struct Producer {
    socket: AsyncDatagramSocket,
    config: DiscoveryConfig,
}

impl Producer {
    /// Bind the announcement socket, joining the multicast group when
    /// `announce_to` is one.
    ///
    /// Must be called inside the event loop.
    pub async fn bind(config: DiscoveryConfig) -> Result<Self> {
        let socket = if config.reuse_address {
            DatagramSocket::bind_shared(config.listen_on)?
        } else {
            DatagramSocket::bind(config.listen_on)?
        };
        match config.announce_to.ip() {
            IpAddr::V4(group) if config.announce_to.is_multicast() => {
                socket.join_multicast(group, Ipv4Addr::UNSPECIFIED)?;
            }
            _ => {}
        }
        Ok(Self {
            socket: socket.into_async()?,
            config,
        })
    }

    /// Where announcements are received.
    pub fn local_endpoint(&self) -> Endpoint {
        self.socket.local_endpoint()
    }

    /// Wait for the next valid announcement and return its source.
    ///
    /// Datagrams that are not exactly the marker are ignored.
    pub async fn next_announcement(&self) -> Result<Endpoint> {
        let marker = self.config.marker.as_bytes();
        // One spare byte so a longer datagram cannot be truncated into a match.
        let mut buf = vec![0u8; MAX_ANNOUNCEMENT_SIZE.max(marker.len() + 1)];
        loop {
            let (len, source) = self.socket.recv_from(&mut buf).await?;
            if &buf[..len] == marker {
                debug!(%source, "received announcement");
                return Ok(source);
            }
            debug!(%source, len, "ignored unexpected discovery datagram");
        }
    }

    /// Connect back to the data port on the announcing host.
    pub async fn connect_back(&self, source: Endpoint) -> Result<Connection> {
        connect_to(
            source.with_port(self.config.data_port),
            self.config.connect_timeout,
            &self.config.frame,
        )
        .await
    }

    /// Answer announcements until `stop` fires, streaming `latest` to each consumer.
    ///
    /// Each answer connects back and streams in its own local task, so a slow
    /// connect-back never holds up later announcements. Failed connect-backs
    /// are logged and skipped. Returns the number of consumers served.
    pub async fn run(&self, latest: &LatestFrame, stop: &StopHandle) -> Result<usize> {
        let mut streams = JoinSet::new();
        let mut served = 0;
        loop {
            tokio::select! {
                _ = stop.stopped() => break,
                Some(done) = streams.join_next(), if !streams.is_empty() => {
                    served += stream_finished(done);
                }
                source = self.next_announcement() => {
                    let target = source?.with_port(self.config.data_port);
                    let connect_timeout = self.config.connect_timeout;
                    let frame = self.config.frame.clone();
                    let mut frames = latest.subscribe();
                    let stop = stop.clone();
                    streams.spawn_local(async move {
                        let connected = tokio::select! {
                            _ = stop.stopped() => return None,
                            conn = connect_to(target, connect_timeout, &frame) => conn,
                        };
                        match connected {
                            Ok(conn) => Some(conn.stream_latest(&mut frames, &stop).await),
                            Err(err) => {
                                warn!(consumer = %target, error = %err, "connect-back failed");
                                None
                            }
                        }
                    });
                }
            }
        }

        while let Some(done) = streams.join_next().await {
            served += stream_finished(done);
        }
        Ok(served)
    }
}

async fn connect_to(
    target: Endpoint,
    timeout: Duration,
    frame: &FrameConfig,
) -> Result<Connection> {
    let stream = DataStream::connect(target, timeout).await?;
    info!(consumer = %target, "connected to consumer");
    Ok(Connection::new(stream, frame))
}

/// Log how a streaming task ended; returns 1 if it ever reached its consumer.
fn stream_finished(done: std::result::Result<Option<Result<u64>>, JoinError>) -> usize {
    match done {
        Ok(None) => 0,
        Ok(Some(Ok(sent))) => {
            debug!(frames = sent, "stream finished");
            1
        }
        Ok(Some(Err(err))) if err.is_connection_closed() => {
            debug!("consumer disconnected");
            1
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "stream failed");
            1
        }
        Err(err) => {
            warn!(error = %err, "stream task failed");
            0
        }
    }
}
