#![doc = r#"
# of-transport-tcp

Tokio-backed implementation of the [`of_transport`] contract for plain TCP.
Modeled directly on `spark-transport-tcp`: a `tokio::net::TcpStream` wrapped
in an async mutex for the write half (serializing concurrent writers the
same way the teacher's `TcpChannel` does), and a thin `TcpListener` wrapper
around `tokio::net::TcpListener::accept`.

TLS-over-TCP is intentionally not implemented in this crate (see
`DESIGN.md`): the teacher workspace keeps that behind a separate
`spark-transport-tls` crate built on `tokio-rustls`, and this workspace
follows the same split rather than growing one crate that depends on both
plain sockets and a TLS stack.
"#]

mod channel;
mod listener;

pub use channel::TcpChannel;
pub use listener::TcpListener;
