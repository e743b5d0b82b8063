//! Transport Setup
//!
//! Turns accepted or dialed TCP streams and connected UDP sockets into
//! [`Connection`]s with boxed read and write halves.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::debug;

use crate::config::Protocol;
use crate::relay::{BoxedReader, BoxedWriter, ConnectionId};
use crate::Result;

/// A duplex byte stream to one remote peer
pub struct Connection {
    pub id: ConnectionId,
    pub peer_addr: SocketAddr,
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

impl Connection {
    pub fn new(peer_addr: SocketAddr, reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            id: ConnectionId::next(),
            peer_addr,
            reader,
            writer,
        }
    }

    /// Wrap an accepted or dialed TCP stream
    pub fn from_tcp(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", peer_addr, e);
        }
        let (reader, writer) = stream.into_split();
        Self::new(peer_addr, Box::new(reader), Box::new(writer))
    }

    /// Wrap a UDP socket already connected to `peer_addr`
    pub fn from_udp(socket: UdpSocket, peer_addr: SocketAddr) -> Self {
        let socket = Arc::new(socket);
        Self::new(
            peer_addr,
            Box::new(UdpReadHalf(Arc::clone(&socket))),
            Box::new(UdpWriteHalf(socket)),
        )
    }

    /// Dial `addr` over `protocol`, giving up after `dial_timeout`
    pub async fn dial(protocol: Protocol, addr: &str, dial_timeout: Duration) -> Result<Self> {
        timeout(dial_timeout, Self::connect(protocol, addr))
            .await
            .map_err(|_| anyhow!("Connecting to {}://{} timed out after {:?}", protocol, addr, dial_timeout))?
    }

    async fn connect(protocol: Protocol, addr: &str) -> Result<Self> {
        match protocol {
            Protocol::Tcp => {
                let stream = TcpStream::connect(addr)
                    .await
                    .with_context(|| format!("Failed to connect to tcp://{}", addr))?;
                let peer_addr = stream.peer_addr().context("Failed to get peer address")?;
                Ok(Self::from_tcp(stream, peer_addr))
            }
            Protocol::Udp => {
                let peer_addr = tokio::net::lookup_host(addr)
                    .await
                    .with_context(|| format!("Failed to resolve {}", addr))?
                    .next()
                    .ok_or_else(|| anyhow!("No addresses resolved for {}", addr))?;
                let local: SocketAddr = if peer_addr.is_ipv4() {
                    "0.0.0.0:0".parse()?
                } else {
                    "[::]:0".parse()?
                };
                let socket = UdpSocket::bind(local)
                    .await
                    .context("Failed to bind local udp socket")?;
                socket
                    .connect(peer_addr)
                    .await
                    .with_context(|| format!("Failed to connect to udp://{}", addr))?;
                Ok(Self::from_udp(socket, peer_addr))
            }
        }
    }
}

/// Reads datagrams from a connected UDP socket as a byte stream
struct UdpReadHalf(Arc<UdpSocket>);

/// Sends each write as one datagram on a connected UDP socket
struct UdpWriteHalf(Arc<UdpSocket>);

impl AsyncRead for UdpReadHalf {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.0.poll_recv(cx, buf)
    }
}

impl AsyncWrite for UdpWriteHalf {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.0.poll_send(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"hi").await.unwrap();
        });

        let mut conn = Connection::dial(Protocol::Tcp, &addr.to_string(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(conn.peer_addr, addr);

        let mut buf = [0u8; 2];
        conn.reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn test_dial_udp_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let mut conn = Connection::dial(Protocol::Udp, &addr.to_string(), Duration::from_secs(2))
            .await
            .unwrap();
        conn.writer.write_all(b"ping").await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");

        server.send_to(b"pong", from).await.unwrap();
        let mut reply = [0u8; 16];
        let n = conn.reader.read(&mut reply).await.unwrap();
        assert_eq!(&reply[..n], b"pong");
    }

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = Connection::dial(Protocol::Tcp, &addr.to_string(), Duration::from_secs(2)).await;
        assert!(result.is_err());
    }
}
