//! The `Tuner` trait -- the control surface a channel scanner drives.
//!
//! A tuner composes the receive DSP chain (filters, AGC, carrier-lock or
//! squelch detection, demodulation) behind a uniform interface: tune to a
//! frequency, ask whether a signal is present, and subscribe to the
//! demodulated output. The scanner programs against `dyn Tuner`, which
//! also allows deterministic scan-loop testing with a scripted fake.

use async_trait::async_trait;

use crate::error::Result;

/// Receives demodulated audio chunks as they are produced.
///
/// Invoked synchronously on the sample-processing path, once per processed
/// batch, in registration order.
pub type AudioHandler = Box<dyn FnMut(&[f32]) + Send>;

/// Notified when the IQ sample rate changes (samples per second).
pub type SampleRateHandler = Box<dyn FnMut(u32) + Send>;

/// Notified with the signal-present verdict, once per processed batch.
pub type SignalHandler = Box<dyn FnMut(bool) + Send>;

/// Uniform control surface over a receive pipeline.
///
/// `tune` is deliberately open-loop: it issues the frequency change and
/// waits a fixed settle delay rather than a server-confirmed sync, so
/// callers must treat completion as "probably settled".
#[async_trait]
pub trait Tuner: Send + Sync {
    /// Retune the receiver to `freq_hz` and wait for it to settle.
    ///
    /// Resets carrier-lock state, since the lock loop must re-acquire
    /// after a frequency step.
    async fn tune(&self, freq_hz: u64) -> Result<()>;

    /// Whether the active lock/squelch strategy currently detects a signal.
    fn signal_present(&self) -> bool;

    /// Set the gain ceiling for the AGC loop.
    fn set_max_gain(&self, max_gain: u32);

    /// Register a handler for demodulated audio chunks.
    fn on_demodulated_audio(&self, handler: AudioHandler);

    /// Register a handler for IQ sample-rate changes.
    fn on_sample_rate_changed(&self, handler: SampleRateHandler);

    /// Register a handler for per-batch signal-detected events.
    fn on_signal_detected(&self, handler: SignalHandler);
}
