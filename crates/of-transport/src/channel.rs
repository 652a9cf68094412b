//! The per-connection byte-stream contract.
//!
//! spec.md §4.1's "Fails" clause drives the shape of this trait directly:
//! "socket operations returning `EAGAIN` are non-fatal and yield to the
//! event loop; any other negative return produces `TcpFailed`. A zero-byte
//! read produces `TcpClosed`." Async `tokio::io` already distinguishes
//! `WouldBlock`/pending from a hard error and from EOF, so [`Channel`]
//! exposes that distinction directly instead of re-deriving it from errno,
//! the way `spark-transport-tcp::TcpChannel` exposes `CoreError` categories
//! over raw `io::Error`.

use std::net::SocketAddr;

use async_trait::async_trait;
use of_core::CoreError;

use crate::address::TransportProtocol;

/// Outcome of one read attempt, modeling the three FSM-relevant cases from
/// spec.md §4.1.
#[derive(Debug)]
pub enum ReadOutcome {
    /// Bytes were read into the caller's buffer; `n` is always `> 0`.
    Data(usize),
    /// Zero-byte read: the peer closed its write side (spec.md:
    /// "A zero-byte read produces `TcpClosed`.").
    Closed,
}

/// A single controller connection's byte stream, independent of whether it
/// is backed by plain TCP or TLS-over-TCP.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Reads into `buf`, returning [`ReadOutcome::Closed`] on EOF and an
    /// error otherwise (non-fatal `WouldBlock`-style conditions are handled
    /// internally by the implementation's async read, which suspends rather
    /// than returning — there is no `EAGAIN` to surface once the channel is
    /// expressed over `tokio::io::AsyncRead`).
    async fn read(&self, buf: &mut [u8]) -> Result<ReadOutcome, CoreError>;

    /// Writes the entire buffer, returning once accepted by the transport.
    async fn write_all(&self, buf: &[u8]) -> Result<(), CoreError>;

    /// Shuts down the write half, signalling EOF to the peer.
    async fn shutdown(&self) -> Result<(), CoreError>;

    /// The protocol this channel was established over.
    fn protocol(&self) -> TransportProtocol;

    /// The remote peer's address.
    fn peer_addr(&self) -> SocketAddr;
}
