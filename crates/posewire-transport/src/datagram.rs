use std::io;
use std::net::{Ipv4Addr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// Blocking UDP socket: one send is one datagram, one receive is one datagram.
#[derive(Debug)]
pub struct DatagramSocket {
    socket: UdpSocket,
    local: Endpoint,
}

impl DatagramSocket {
    /// Bind to `endpoint`. Port `0` picks an ephemeral port.
    pub fn bind(endpoint: Endpoint) -> Result<Self> {
        let socket = UdpSocket::bind(endpoint.addr())
            .map_err(|source| TransportError::Bind { endpoint, source })?;
        let local = Endpoint::from(socket.local_addr()?);
        debug!(%local, "bound datagram socket");
        Ok(Self { socket, local })
    }

    /// Bind to `endpoint` with `SO_REUSEADDR` (and `SO_REUSEPORT` on unix) set,
    /// so several processes on one host can listen on the same port.
    ///
    /// Broadcast and multicast datagrams reach every socket sharing the port;
    /// unicast datagrams reach only one of them.
    pub fn bind_shared(endpoint: Endpoint) -> Result<Self> {
        let bind_error = |source: io::Error| TransportError::Bind { endpoint, source };
        let addr = endpoint.addr();
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(bind_error)?;
        socket.set_reuse_address(true).map_err(bind_error)?;
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        socket.set_reuse_port(true).map_err(bind_error)?;
        socket.bind(&addr.into()).map_err(bind_error)?;

        let socket = UdpSocket::from(socket);
        let local = Endpoint::from(socket.local_addr()?);
        debug!(%local, "bound shared datagram socket");
        Ok(Self { socket, local })
    }

    /// Allow sending to broadcast addresses.
    pub fn set_broadcast(&self, enabled: bool) -> Result<()> {
        self.socket.set_broadcast(enabled)?;
        Ok(())
    }

    /// Join an IPv4 multicast group on the given interface (`0.0.0.0` for any).
    pub fn join_multicast(&self, group: Ipv4Addr, interface: Ipv4Addr) -> Result<()> {
        self.socket.join_multicast_v4(&group, &interface)?;
        info!(%group, %interface, "joined multicast group");
        Ok(())
    }

    /// Bound receive calls to `timeout` (`None` blocks forever).
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Send `payload` as a single datagram.
    pub fn send_to(&self, payload: &[u8], target: Endpoint) -> Result<usize> {
        Ok(self.socket.send_to(payload, target.addr())?)
    }

    /// Receive one datagram. Bytes beyond `buf.len()` are discarded by the OS.
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, Endpoint)> {
        let (len, addr) = self.socket.recv_from(buf)?;
        Ok((len, addr.into()))
    }

    /// The endpoint this socket is bound to.
    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    /// Register the socket with the current tokio runtime.
    ///
    /// Must be called from inside a runtime context.
    pub fn into_async(self) -> Result<AsyncDatagramSocket> {
        self.socket.set_nonblocking(true)?;
        let socket = tokio::net::UdpSocket::from_std(self.socket)?;
        Ok(AsyncDatagramSocket {
            socket,
            local: self.local,
        })
    }
}

/// Readiness-driven UDP socket for use inside the event loop.
#[derive(Debug)]
pub struct AsyncDatagramSocket {
    socket: tokio::net::UdpSocket,
    local: Endpoint,
}

impl AsyncDatagramSocket {
    /// Send `payload` as a single datagram.
    pub async fn send_to(&self, payload: &[u8], target: Endpoint) -> Result<usize> {
        Ok(self.socket.send_to(payload, target.addr()).await?)
    }

    /// Wait for one datagram.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, Endpoint)> {
        let (len, addr) = self.socket.recv_from(buf).await?;
        Ok((len, addr.into()))
    }

    /// The endpoint this socket is bound to.
    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }
}
