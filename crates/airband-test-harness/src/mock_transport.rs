//! In-memory transport for unit tests.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

use airband_core::{Error, Result, Transport, TransportReader, TransportWriter};

/// Transport over an in-memory duplex pipe, no sockets involved.
///
/// [`MockTransport::pair`] returns the transport plus the remote end the
/// test drives directly: bytes written to the remote appear on the
/// transport's receive path and vice versa.
pub struct MockTransport {
    reader: ReadHalf<DuplexStream>,
    writer: WriteHalf<DuplexStream>,
    connected: bool,
}

impl MockTransport {
    pub fn pair() -> (MockTransport, DuplexStream) {
        let (local, remote) = tokio::io::duplex(256 * 1024);
        let (reader, writer) = tokio::io::split(local);
        (
            MockTransport {
                reader,
                writer,
                connected: true,
            },
            remote,
        )
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        self.writer.write_all(data).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        match tokio::time::timeout(timeout, self.reader.read(buf)).await {
            Err(_) => Err(Error::Timeout),
            Ok(Ok(0)) => Err(Error::ConnectionLost),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        let _ = self.writer.shutdown().await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn into_split(self: Box<Self>) -> (TransportReader, TransportWriter) {
        (Box::new(self.reader), Box::new(self.writer))
    }
}
