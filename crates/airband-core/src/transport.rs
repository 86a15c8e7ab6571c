//! Transport trait for SDR server communication.
//!
//! The [`Transport`] trait abstracts over the byte-stream link to a
//! SpyServer-compatible server. Implementations exist for plain TCP and
//! for in-memory duplex pipes used by the test harness.
//!
//! The client session operates on a `Transport` rather than directly on a
//! socket, enabling both real server connections and deterministic unit
//! testing against a scripted mock.
//!
//! A streaming session needs to read sample frames continuously while
//! command bytes are written from other tasks, so the trait also supports
//! splitting into independently owned read/write halves via
//! [`Transport::into_split`].

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;

/// The read half of a split transport.
pub type TransportReader = Box<dyn AsyncRead + Send + Unpin>;

/// The write half of a split transport.
pub type TransportWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Asynchronous byte-level transport to an SDR server.
///
/// Implementations handle connection state at the physical layer.
/// Protocol-level concerns (message framing, command encoding) are handled
/// by the client session that consumes this trait.
#[async_trait]
pub trait Transport: Send {
    /// Send raw bytes to the server.
    ///
    /// Implementations should not return until all bytes have been written
    /// to the underlying transport.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the server into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if no data is received within the deadline, and
    /// [`Error::ConnectionLost`](crate::error::Error::ConnectionLost) on EOF.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Consume the transport, yielding independently owned read and write
    /// halves.
    ///
    /// The streaming client reads frames on one task while control commands
    /// are written from another; the halves make that possible without a
    /// shared lock around a blocked read.
    fn into_split(self: Box<Self>) -> (TransportReader, TransportWriter);
}
