//! # of-transport
//!
//! Transport-neutral `Channel`/`Listener` contract for OpenFlow control
//! connections, modeled on `spark-core::data_plane::transport` and the
//! standalone `spark-transport` crate in the teacher workspace. Concrete
//! transports (`of-transport-tcp`, and in the future a TLS transport built
//! the same way the teacher's `spark-transport-tls` builds on
//! `tokio-rustls`) implement [`Channel`] and [`Listener`] against this
//! contract so `of-channel` never depends on a concrete socket type.
//!
//! spec.md §6 lists four transports: TCP, TCPv6, TLS-over-TCP,
//! TLS-over-TCPv6. This crate models that as one address enum
//! ([`TransportAddr`]) plus protocol-agnostic traits; IPv4 vs IPv6 is just
//! `SocketAddr` variance, and TLS vs plain TCP is just which `Channel`
//! implementation a `Listener` hands back.

pub mod address;
pub mod channel;
pub mod listener;

pub use address::{TransportAddr, TransportProtocol};
pub use channel::{Channel, ReadOutcome};
pub use listener::Listener;
