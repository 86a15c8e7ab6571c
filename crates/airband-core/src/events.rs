//! Asynchronous session event types.
//!
//! Events are emitted by the client session through a
//! [`tokio::sync::broadcast`] channel when session state changes. UI layers
//! subscribe to these for connection indicators and receiver-state displays
//! without polling; the sample-data path uses synchronous watcher callbacks
//! instead and never goes through this channel.

/// An event emitted when session state changes.
///
/// Events are delivered on a best-effort basis through a bounded broadcast
/// channel; slow consumers may miss events under load.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Successfully connected and the hello handshake was sent.
    Connected,

    /// The connection to the server was closed or lost.
    Disconnected,

    /// Device info arrived and stream rates were negotiated.
    DeviceReady {
        /// Maximum device sample rate in samples per second.
        max_sample_rate: u32,
        /// Number of power-of-two decimation stages the device supports.
        decimation_stages: u32,
    },

    /// A client sync snapshot arrived; the receiver state mirror was updated.
    Synced {
        /// Current receiver gain setting.
        gain: u32,
        /// Device centre frequency in hertz.
        centre_frequency: u32,
    },

    /// The IQ sample rate changed (stream renegotiation or retune).
    SampleRateChanged {
        /// New IQ sample rate in samples per second.
        sample_rate: u32,
    },

    /// A transport or protocol error occurred during streaming.
    ///
    /// Streaming stops and the session transitions to disconnected; the
    /// caller decides whether to reconnect.
    Error {
        /// Human-readable description of the failure.
        message: String,
    },
}
