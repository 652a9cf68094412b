use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use of_core::CoreError;
use of_transport::Channel as ChannelTrait;

use crate::channel::TcpChannel;

/// Thin wrapper around `tokio::net::TcpListener`, matching
/// `spark-transport-tcp::TcpListener`'s role: bind once, hand back
/// [`of_transport::Listener`]-shaped channels forever.
pub struct TcpListener {
    inner: tokio::net::TcpListener,
    local_addr: SocketAddr,
}

impl TcpListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self, CoreError> {
        let inner = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| CoreError::new("transport.bind_failed", e.to_string()).with_cause(e))?;
        let local_addr = inner
            .local_addr()
            .map_err(|e| CoreError::new("transport.local_addr", e.to_string()).with_cause(e))?;
        Ok(Self { inner, local_addr })
    }
}

#[async_trait]
impl of_transport::Listener for TcpListener {
    async fn accept(&self) -> Result<(Arc<dyn ChannelTrait>, SocketAddr), CoreError> {
        let (stream, peer) = self
            .inner
            .accept()
            .await
            .map_err(|e| CoreError::new("transport.accept_failed", e.to_string()).with_cause(e))?;
        let channel: Arc<dyn ChannelTrait> = Arc::new(TcpChannel::new(stream, peer));
        Ok((channel, peer))
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use of_transport::Listener as _;

    #[tokio::test]
    async fn bind_reports_local_addr() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(listener.local_addr().ip().to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn accept_yields_peer_address() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr();

        let server = tokio::spawn(async move { listener.accept().await.unwrap() });
        let _client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (_channel, peer) = server.await.unwrap();
        assert_eq!(peer.ip().to_string(), "127.0.0.1");
    }
}
