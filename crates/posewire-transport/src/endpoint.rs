use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use crate::error::TransportError;

/// A network peer: host address plus port.
///
/// Endpoints are plain values; a connection or channel keeps the endpoint it
/// was created with for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    addr: SocketAddr,
}

impl Endpoint {
    /// Create an endpoint from an IP address and port.
    pub fn new(ip: impl Into<IpAddr>, port: u16) -> Self {
        Self {
            addr: SocketAddr::new(ip.into(), port),
        }
    }

    /// `0.0.0.0:port`, i.e. every local IPv4 interface.
    pub fn any(port: u16) -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, port)
    }

    /// `127.0.0.1:port`.
    pub fn localhost(port: u16) -> Self {
        Self::new(Ipv4Addr::LOCALHOST, port)
    }

    /// The underlying socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Same host, different port.
    pub fn with_port(&self, port: u16) -> Self {
        Self::new(self.addr.ip(), port)
    }

    /// Whether the address is a multicast group.
    pub fn is_multicast(&self) -> bool {
        self.addr.ip().is_multicast()
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.addr
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.addr.fmt(f)
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    /// Parse `ip:port`, falling back to name resolution for `host:port`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if let Ok(addr) = input.parse::<SocketAddr>() {
            return Ok(addr.into());
        }

        let mut resolved = input
            .to_socket_addrs()
            .map_err(|err| TransportError::InvalidEndpoint {
                input: input.to_string(),
                reason: err.to_string(),
            })?;

        resolved
            .next()
            .map(Endpoint::from)
            .ok_or_else(|| TransportError::InvalidEndpoint {
                input: input.to_string(),
                reason: "host resolved to no addresses".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ip_and_port() {
        let endpoint: Endpoint = "192.168.1.20:1024".parse().unwrap();
        assert_eq!(endpoint.ip(), IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)));
        assert_eq!(endpoint.port(), 1024);
        assert_eq!(endpoint.to_string(), "192.168.1.20:1024");
    }

    #[test]
    fn resolves_localhost_name() {
        let endpoint: Endpoint = "localhost:8888".parse().unwrap();
        assert!(endpoint.ip().is_loopback());
        assert_eq!(endpoint.port(), 8888);
    }

    #[test]
    fn rejects_missing_port() {
        let err = "127.0.0.1".parse::<Endpoint>().unwrap_err();
        assert!(matches!(err, TransportError::InvalidEndpoint { .. }));
    }

    #[test]
    fn with_port_keeps_host() {
        let source = Endpoint::new(Ipv4Addr::new(10, 0, 0, 7), 53211);
        let data = source.with_port(1024);
        assert_eq!(data.ip(), source.ip());
        assert_eq!(data.port(), 1024);
    }

    #[test]
    fn detects_multicast_groups() {
        assert!("239.0.0.1:1024".parse::<Endpoint>().unwrap().is_multicast());
        assert!(!Endpoint::any(1024).is_multicast());
    }
}
