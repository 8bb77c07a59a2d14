use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// Listening socket for inbound data connections.
///
/// Consumers bind one of these on the data port before announcing themselves;
/// every producer that answers the announcement connects here.
pub struct DataListener {
    listener: TcpListener,
    local: Endpoint,
}

impl DataListener {
    /// Bind and listen on `endpoint`. Port `0` picks an ephemeral port.
    pub async fn bind(endpoint: Endpoint) -> Result<Self> {
        let listener = TcpListener::bind(endpoint.addr())
            .await
            .map_err(|source| TransportError::Bind { endpoint, source })?;
        let local = Endpoint::from(listener.local_addr()?);

        info!(%local, "listening for data connections");

        Ok(Self { listener, local })
    }

    /// Wait for the next inbound connection.
    pub async fn accept(&self) -> Result<DataStream> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        debug!(peer = %addr, "accepted data connection");
        DataStream::from_tokio(stream, addr.into())
    }

    /// The endpoint this listener is actually bound to.
    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }
}

/// A connected, readiness-driven data stream.
///
/// The stream never blocks: callers wait for readiness with [`readable`](Self::readable)
/// or [`writable`](Self::writable) and then move as many bytes as the socket
/// accepts with [`try_read`](Self::try_read) / [`try_write`](Self::try_write).
/// `ErrorKind::WouldBlock` from either means the readiness was spurious.
#[derive(Debug)]
pub struct DataStream {
    inner: TcpStream,
    peer: Endpoint,
}

impl DataStream {
    fn from_tokio(inner: TcpStream, peer: Endpoint) -> Result<Self> {
        inner.set_nodelay(true)?;
        Ok(Self { inner, peer })
    }

    /// Connect to a listening peer, giving up after `timeout`.
    pub async fn connect(endpoint: Endpoint, timeout: Duration) -> Result<Self> {
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(endpoint.addr())).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(TransportError::Connect { endpoint, source }),
            Err(_) => return Err(TransportError::ConnectTimeout { endpoint, timeout }),
        };
        debug!(peer = %endpoint, "connected data stream");
        Self::from_tokio(stream, endpoint)
    }

    /// The remote endpoint. Fixed for the lifetime of the stream.
    pub fn peer(&self) -> Endpoint {
        self.peer
    }

    /// The local endpoint of this stream.
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        Ok(self.inner.local_addr()?.into())
    }

    /// Wait until the socket may have bytes to read (or has been closed).
    pub async fn readable(&self) -> std::io::Result<()> {
        self.inner.readable().await
    }

    /// Read whatever is available without blocking. `Ok(0)` means the peer closed.
    pub fn try_read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.try_read(buf)
    }

    /// Wait until the socket may accept more bytes.
    pub async fn writable(&self) -> std::io::Result<()> {
        self.inner.writable().await
    }

    /// Write as many bytes as the socket currently accepts without blocking.
    pub fn try_write(&self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.try_write(buf)
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use super::*;

    async fn write_all(stream: &DataStream, mut buf: &[u8]) {
        while !buf.is_empty() {
            stream.writable().await.unwrap();
            match stream.try_write(buf) {
                Ok(n) => buf = &buf[n..],
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => panic!("write failed: {err}"),
            }
        }
    }

    async fn read_exact(stream: &DataStream, len: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 64];
        while out.len() < len {
            stream.readable().await.unwrap();
            match stream.try_read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => panic!("read failed: {err}"),
            }
        }
        out
    }

    #[tokio::test]
    async fn bind_accept_connect() {
        let listener = DataListener::bind(Endpoint::localhost(0)).await.unwrap();
        let target = listener.local_endpoint();
        assert_ne!(target.port(), 0);

        let client = DataStream::connect(target, Duration::from_secs(5))
            .await
            .unwrap();
        let server = listener.accept().await.unwrap();

        assert_eq!(client.peer(), target);
        assert_eq!(server.peer(), client.local_endpoint().unwrap());

        write_all(&client, b"hello").await;
        assert_eq!(read_exact(&server, 5).await, b"hello");
    }

    #[tokio::test]
    async fn read_reports_peer_close() {
        let listener = DataListener::bind(Endpoint::localhost(0)).await.unwrap();
        let client = DataStream::connect(listener.local_endpoint(), Duration::from_secs(5))
            .await
            .unwrap();
        let server = listener.accept().await.unwrap();
        drop(client);

        assert!(read_exact(&server, 1).await.is_empty());
    }

    #[tokio::test]
    async fn connect_refused_is_connect_error() {
        // Bind then drop to obtain a port nobody listens on.
        let port = {
            let listener = DataListener::bind(Endpoint::localhost(0)).await.unwrap();
            listener.local_endpoint().port()
        };

        let err = DataStream::connect(Endpoint::localhost(port), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[tokio::test]
    async fn bind_conflict_is_bind_error() {
        let first = DataListener::bind(Endpoint::localhost(0)).await.unwrap();
        let err = DataListener::bind(first.local_endpoint())
            .await
            .err()
            .expect("second bind should fail");
        assert!(matches!(err, TransportError::Bind { .. }));
    }
}
