//! Accept-loop contract, modeled on `spark-transport-tcp::TcpListener`.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use of_core::CoreError;

use crate::channel::Channel;

/// Accepts inbound controller connections. An implementation binds one
/// socket per `(protocol, local_addr)` pair; TLS-over-TCP and plain TCP are
/// separate `Listener` instances feeding the same channel manager.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Blocks until the next inbound connection is accepted, or a transport
    /// error occurs. Returns the new channel plus its peer address.
    async fn accept(&self) -> Result<(Arc<dyn Channel>, SocketAddr), CoreError>;

    /// The address this listener is bound to.
    fn local_addr(&self) -> SocketAddr;
}
