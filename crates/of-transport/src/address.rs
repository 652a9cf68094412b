//! Transport address and protocol tags (spec.md §6: "Control plane
//! transports: TCP, TCPv6, TLS-over-TCP, TLS-over-TCPv6. Default port
//! 6633.").

use std::fmt;
use std::net::SocketAddr;

/// Which of the four control-plane transports a channel uses. Kept
/// independent of the socket address family (`SocketAddr` already
/// distinguishes v4/v6), matching spec.md's "Channel... protocol (TCP, TLS,
/// TCPv6, TLSv6)" attribute while avoiding a 4-way cross product of types.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TransportProtocol {
    Tcp,
    Tls,
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportProtocol::Tcp => f.write_str("tcp"),
            TransportProtocol::Tls => f.write_str("tls"),
        }
    }
}

/// Default OpenFlow control-plane port (spec.md §6).
pub const DEFAULT_OFP_PORT: u16 = 6633;

/// A remote endpoint plus the transport used to reach it.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TransportAddr {
    pub protocol: TransportProtocol,
    pub addr: SocketAddr,
}

impl TransportAddr {
    pub const fn new(protocol: TransportProtocol, addr: SocketAddr) -> Self {
        Self { protocol, addr }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self.protocol, TransportProtocol::Tls)
    }
}

impl fmt::Display for TransportAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.addr)
    }
}
