//! Test doubles shared by this crate's unit tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use of_core::{CoreError, DatapathId};
use of_transport::{Channel as TransportChannel, ReadOutcome, TransportAddr, TransportProtocol};

use crate::model::Channel;

/// A transport channel that never produces bytes and accepts every write.
/// Stands in for a real TCP/TLS socket in tests that only exercise the FSM,
/// framing, or dispatch logic above the transport.
pub struct NullTransportChannel {
    peer_addr: SocketAddr,
}

impl Default for NullTransportChannel {
    fn default() -> Self {
        Self {
            peer_addr: "127.0.0.1:6633".parse().unwrap(),
        }
    }
}

#[async_trait]
impl TransportChannel for NullTransportChannel {
    async fn read(&self, _buf: &mut [u8]) -> Result<ReadOutcome, CoreError> {
        Ok(ReadOutcome::Closed)
    }

    async fn write_all(&self, _buf: &[u8]) -> Result<(), CoreError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), CoreError> {
        Ok(())
    }

    fn protocol(&self) -> TransportProtocol {
        TransportProtocol::Tcp
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

/// A single fixture channel with a fixed channel id and datapath id, for
/// tests that don't care which values they are.
pub fn fixture_channel() -> Channel {
    use of_core::ChannelId;
    fixture_channel_with_ids(ChannelId::new(1), DatapathId::new(0x42))
}

/// A fixture channel with caller-chosen identifiers, for tests (such as the
/// channel manager's) that need several distinct channels.
pub fn fixture_channel_with_ids(channel_id: of_core::ChannelId, dpid: DatapathId) -> Channel {
    Channel::new(
        channel_id,
        dpid,
        TransportAddr::new(TransportProtocol::Tcp, "127.0.0.1:6633".parse().unwrap()),
        0,
        Arc::new(NullTransportChannel::default()),
    )
}

/// A transport channel that replays one scripted byte sequence to a single
/// reader and records every byte written to it, for end-to-end tests of
/// [`crate::runner::ChannelRunner`] that need a peer to actually speak back.
///
/// The scripted bytes are handed out whole on the first `read` call and the
/// channel reports `Closed` on every call after that, which is enough to
/// drive one Hello exchange to completion without modeling a real
/// byte-at-a-time socket.
pub struct ScriptedTransportChannel {
    to_read: Mutex<Option<Vec<u8>>>,
    written: Mutex<Vec<Vec<u8>>>,
    peer_addr: SocketAddr,
}

impl ScriptedTransportChannel {
    pub fn new(scripted_read: Vec<u8>) -> Self {
        Self {
            to_read: Mutex::new(Some(scripted_read)),
            written: Mutex::new(Vec::new()),
            peer_addr: "127.0.0.1:6633".parse().unwrap(),
        }
    }

    /// Every `write_all` call this channel has observed, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportChannel for ScriptedTransportChannel {
    async fn read(&self, buf: &mut [u8]) -> Result<ReadOutcome, CoreError> {
        let mut slot = self.to_read.lock().unwrap();
        match slot.take() {
            Some(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(ReadOutcome::Data(n))
            }
            None => Ok(ReadOutcome::Closed),
        }
    }

    async fn write_all(&self, buf: &[u8]) -> Result<(), CoreError> {
        self.written.lock().unwrap().push(buf.to_vec());
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), CoreError> {
        Ok(())
    }

    fn protocol(&self) -> TransportProtocol {
        TransportProtocol::Tcp
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}
