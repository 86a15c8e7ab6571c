//! SpyServer client: session management, the receive pipeline, audio
//! scheduling, and the channel scanner.

pub mod audio;
pub mod client;
pub mod scanner;
pub mod tuner;

pub use audio::{AudioScheduler, BufferSink, ScheduledBuffer, StreamPlayer};
pub use client::{ClientOptions, SampleRateWatcher, SpyServerClient};
pub use scanner::{ScanState, ScanTarget, Scanner};
pub use tuner::{DemodMode, SpyServerTuner, SquelchStrategy, TunerOptions};
