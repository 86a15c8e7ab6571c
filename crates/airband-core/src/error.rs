//! Error types for airband.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! application-layer errors are all captured here.

/// The error type for all airband operations.
///
/// Variants cover the failure modes of a streaming SDR client: physical
/// transport failures, protocol decode errors, timeouts, and invalid
/// parameters.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP socket, WebSocket bridge).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed header, truncated payload).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for data or a connection.
    #[error("timeout")]
    Timeout,

    /// An invalid parameter was passed to a control operation.
    ///
    /// This includes configuration errors such as a filter tap count
    /// above the fixed maximum, which is rejected at construction.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No connection to the server has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the server was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// A sample or audio stream was closed unexpectedly.
    #[error("stream closed")]
    StreamClosed,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
