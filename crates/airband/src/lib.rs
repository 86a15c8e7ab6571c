//! # airband -- Async SpyServer Client and Channel Scanner
//!
//! `airband` is an asynchronous Rust library for streaming IQ samples
//! from a SpyServer-compatible SDR server, demodulating AM airband (and
//! narrow FM) voice, and scanning banks of channels the way a hardware
//! scanner does.
//!
//! ## Quick Start
//!
//! Add `airband` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! airband = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Connect, tune a channel, and watch the squelch:
//!
//! ```no_run
//! use airband::{ClientOptions, SpyServerClient, SpyServerTuner, TcpTransport, Tuner, TunerOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = TcpTransport::connect("airspy.local:5555").await?;
//!     let client = SpyServerClient::connect(Box::new(transport), ClientOptions::default()).await?;
//!     let tuner = SpyServerTuner::new(client.clone(), TunerOptions::default());
//!     client.start_streaming()?;
//!
//!     tuner.tune(124_750_000).await?;
//!     println!("signal present: {}", tuner.signal_present());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                  | Purpose                                      |
//! |------------------------|----------------------------------------------|
//! | `airband-core`         | Traits ([`Transport`], [`Tuner`]), channel model, errors |
//! | `airband-transport`    | TCP transport implementation                 |
//! | `airband-proto`        | SpyServer wire protocol: framing, messages, commands |
//! | `airband-dsp`          | FIR filters, AGC, PLL, squelch, demodulators |
//! | `airband-client`       | Session, tuner pipeline, audio scheduler, scanner |
//! | **`airband`**          | This facade crate -- re-exports everything   |
//!
//! The scanner programs against `dyn Tuner`, so scan logic is testable
//! without a server and reusable over future receiver backends.
//!
//! ## Receive chain
//!
//! IQ batches arrive as unsigned 8-bit interleaved pairs and flow
//! through normalization, a Blackman-Harris low-pass pair, the AGC
//! loop (which feeds gain back to the server), and a PLL that both
//! demodulates AM and provides the carrier-lock squelch. Demodulated
//! audio is packed into pooled quarter-second buffers with crossfaded
//! seams and precise start times for gapless playback.

pub use airband_core::{
    AudioHandler, Channel, ChannelBank, ChannelId, ChannelList, Error, Result, SampleRateHandler,
    SessionEvent, SignalHandler, Transport, Tuner,
};

pub use airband_transport::TcpTransport;

pub use airband_client::{
    AudioScheduler, ClientOptions, DemodMode, ScanState, ScanTarget, ScheduledBuffer,
    SpyServerClient, SpyServerTuner, Scanner, SquelchStrategy, StreamPlayer, TunerOptions,
};

/// Wire protocol types, for applications that need raw stream access.
pub mod proto {
    pub use airband_proto::{
        ClientSync, DeviceInfo, DeviceType, MessageHeader, MessageType, StreamType,
    };
}

/// Signal-processing blocks, reusable outside the built-in pipeline.
pub mod dsp {
    pub use airband_dsp::{
        low_pass, Agc, Discriminator, FirFilter, PhaseLockLoop, QuadratureDemod,
        SpectralPeakDetector, Window,
    };
}
