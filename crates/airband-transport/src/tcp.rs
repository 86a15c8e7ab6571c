//! TCP transport for SpyServer communication.
//!
//! This module provides [`TcpTransport`], which implements the
//! [`Transport`] trait for SpyServer instances reachable over TCP
//! (the default server listens on port 5555).
//!
//! # Example
//!
//! ```no_run
//! use airband_transport::TcpTransport;
//! use airband_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> airband_core::Result<()> {
//! let mut transport = TcpTransport::connect("192.168.1.100:5555").await?;
//!
//! // Receive stream bytes with a 2 second timeout.
//! let mut buf = [0u8; 4096];
//! let n = transport.receive(&mut buf, Duration::from_secs(2)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use airband_core::error::{Error, Result};
use airband_core::transport::{Transport, TransportReader, TransportWriter};

/// Default connection timeout (5 seconds).
///
/// Generous enough for LAN connections and most internet links, but
/// short enough that an unreachable server fails quickly.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP transport for SpyServer communication.
///
/// The connection is established eagerly via [`connect`](TcpTransport::connect)
/// or [`connect_with_timeout`](TcpTransport::connect_with_timeout).
#[derive(Debug)]
pub struct TcpTransport {
    /// The underlying TCP stream, `None` after `close()` is called.
    stream: Option<TcpStream>,
    /// The address string for logging/debugging.
    addr: String,
}

impl TcpTransport {
    /// Connect to a TCP endpoint using the default timeout.
    ///
    /// The `addr` parameter should be a `host:port` string, e.g.
    /// `"192.168.1.100:5555"`.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_timeout(addr, DEFAULT_CONNECT_TIMEOUT).await
    }

    /// Connect to a TCP endpoint with a specified timeout.
    pub async fn connect_with_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        tracing::debug!(
            addr = %addr,
            timeout_ms = timeout.as_millis(),
            "Connecting to TCP endpoint"
        );

        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                tracing::error!(addr = %addr, "TCP connection timed out");
                Error::Timeout
            })?
            .map_err(|e| {
                tracing::error!(addr = %addr, error = %e, "TCP connection failed");
                map_connect_error(e, addr)
            })?;

        // Disable Nagle's algorithm: control commands are small and
        // latency-sensitive while the stream is live.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(
                addr = %addr,
                error = %e,
                "Failed to set TCP_NODELAY (continuing anyway)"
            );
        }

        tracing::info!(addr = %addr, "TCP connection established");

        Ok(Self {
            stream: Some(stream),
            addr: addr.to_string(),
        })
    }

    /// Wrap an existing `TcpStream` as a `TcpTransport`.
    ///
    /// Useful when a TCP connection has already been established
    /// externally (e.g. accepted from a listener in tests).
    pub fn from_stream(stream: TcpStream, addr: String) -> Self {
        tracing::debug!(addr = %addr, "Wrapping existing TCP stream");
        Self {
            stream: Some(stream),
            addr,
        }
    }

    /// Get the address string this transport was connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        stream.write_all(data).await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to send data");
            map_io_error(e)
        })?;

        stream.flush().await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to flush TCP stream");
            map_io_error(e)
        })?;

        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        let result = tokio::time::timeout(timeout, stream.read(buf)).await;

        match result {
            Ok(Ok(0)) => {
                // TCP: 0 bytes read means the peer has closed the connection.
                tracing::warn!(addr = %self.addr, "Peer closed connection (0 bytes read)");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => {
                tracing::error!(addr = %self.addr, error = %e, "Failed to receive data");
                Err(map_io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!(addr = %self.addr, "Closing TCP connection");

            if let Err(e) = stream.flush().await {
                tracing::warn!(
                    addr = %self.addr,
                    error = %e,
                    "Failed to flush before closing (continuing anyway)"
                );
            }

            if let Err(e) = stream.shutdown().await {
                tracing::warn!(
                    addr = %self.addr,
                    error = %e,
                    "Failed to shutdown TCP stream (continuing anyway)"
                );
            }

            tracing::info!(addr = %self.addr, "TCP connection closed");
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn into_split(mut self: Box<Self>) -> (TransportReader, TransportWriter) {
        // A closed transport yields halves that immediately report EOF /
        // broken pipe, which the client surfaces as ConnectionLost.
        match self.stream.take() {
            Some(stream) => {
                let (r, w) = stream.into_split();
                (Box::new(r), Box::new(w))
            }
            None => {
                let (r, w) = tokio::io::duplex(1);
                drop(w);
                let (rh, wh) = tokio::io::split(r);
                (Box::new(rh), Box::new(wh))
            }
        }
    }
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {}", addr))
        }
        _ => Error::Io(e),
    }
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airband_core::transport::Transport;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Bind a TcpListener on a random available port and return it along
    /// with its address string.
    async fn test_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn connect_send_receive() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"hello");
            stream.write_all(b"world").await.unwrap();
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        assert!(transport.is_connected());

        transport.send(b"hello").await.unwrap();

        let mut buf = [0u8; 16];
        let n = transport
            .receive(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"world");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn receive_timeout() {
        let (listener, addr) = test_listener().await;

        // Accept but never send anything.
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        let mut buf = [0u8; 16];
        let err = transport
            .receive(&mut buf, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));

        server.abort();
    }

    #[tokio::test]
    async fn receive_after_peer_close() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        server.await.unwrap();

        let mut buf = [0u8; 16];
        let err = transport
            .receive(&mut buf, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionLost));
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
        });

        let mut transport = TcpTransport::connect(&addr).await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());

        let err = transport.send(b"data").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn split_halves_carry_data() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping");
            stream.write_all(b"pong").await.unwrap();
        });

        let transport = Box::new(TcpTransport::connect(&addr).await.unwrap());
        let (mut reader, mut writer) = (transport as Box<dyn Transport>).into_split();

        writer.write_all(b"ping").await.unwrap();
        writer.flush().await.unwrap();

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        server.await.unwrap();
    }
}
