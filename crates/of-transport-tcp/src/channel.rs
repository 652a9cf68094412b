use std::net::SocketAddr;

use async_trait::async_trait;
use of_core::CoreError;
use of_transport::{Channel, ReadOutcome, TransportProtocol};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

/// A single TCP controller connection.
///
/// The read half has no internal mutex: OpenFlow channels are read from a
/// single owning task (spec.md §5: "per-channel I/O workers that read/write
/// sockets and run the FSM under the owning channel's lock"), so only the
/// write half — which the echo timer and the read task can both touch — is
/// guarded, mirroring `spark-transport-tcp::TcpChannel`'s choice to
/// serialize writes with `tokio::sync::Mutex`.
pub struct TcpChannel {
    read_half: AsyncMutex<tokio::net::tcp::OwnedReadHalf>,
    write_half: AsyncMutex<tokio::net::tcp::OwnedWriteHalf>,
    peer_addr: SocketAddr,
}

impl TcpChannel {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            read_half: AsyncMutex::new(read_half),
            write_half: AsyncMutex::new(write_half),
            peer_addr,
        }
    }

    pub async fn connect(addr: SocketAddr) -> Result<Self, CoreError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| CoreError::new("transport.connect_failed", e.to_string()).with_cause(e))?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|e| CoreError::new("transport.peer_addr", e.to_string()).with_cause(e))?;
        Ok(Self::new(stream, peer_addr))
    }
}

#[async_trait]
impl Channel for TcpChannel {
    async fn read(&self, buf: &mut [u8]) -> Result<ReadOutcome, CoreError> {
        let mut guard = self.read_half.lock().await;
        let n = guard
            .read(buf)
            .await
            .map_err(|e| CoreError::new("transport.read_failed", e.to_string()).with_cause(e))?;
        if n == 0 {
            Ok(ReadOutcome::Closed)
        } else {
            Ok(ReadOutcome::Data(n))
        }
    }

    async fn write_all(&self, buf: &[u8]) -> Result<(), CoreError> {
        let mut guard = self.write_half.lock().await;
        guard
            .write_all(buf)
            .await
            .map_err(|e| CoreError::new("transport.write_failed", e.to_string()).with_cause(e))
    }

    async fn shutdown(&self) -> Result<(), CoreError> {
        let mut guard = self.write_half.lock().await;
        guard
            .shutdown()
            .await
            .map_err(|e| CoreError::new("transport.shutdown_failed", e.to_string()).with_cause(e))
    }

    fn protocol(&self) -> TransportProtocol {
        TransportProtocol::Tcp
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use of_transport::Channel as _;
    use tokio::net::TcpListener as TokioListener;

    #[tokio::test]
    async fn roundtrip_write_then_read() {
        let listener = TokioListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_task = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            TcpChannel::new(stream, peer)
        });

        let client = TcpChannel::connect(addr).await.unwrap();
        let server = accept_task.await.unwrap();

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        match server.read(&mut buf).await.unwrap() {
            ReadOutcome::Data(5) => assert_eq!(&buf, b"hello"),
            other => panic!("unexpected read outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn zero_byte_read_reports_closed() {
        let listener = TokioListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_task = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            TcpChannel::new(stream, peer)
        });

        let client = TcpChannel::connect(addr).await.unwrap();
        let server = accept_task.await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        let mut buf = [0u8; 16];
        match server.read(&mut buf).await.unwrap() {
            ReadOutcome::Closed => {}
            other => panic!("expected Closed, got {other:?}"),
        }
    }
}
