//! airband-core: Core traits, types, and error definitions for airband.
//!
//! This crate defines the server-agnostic abstractions the rest of the
//! workspace builds on. Applications depend on these types without pulling
//! in the wire protocol or the DSP chain.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel to an SDR server
//! - [`Tuner`] -- the control surface a scanner drives
//! - [`Channel`] / [`ChannelBank`] -- the in-process channel model
//! - [`SessionEvent`] -- asynchronous session state notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod channel;
pub mod error;
pub mod events;
pub mod transport;
pub mod tuner;

// Re-export key types at crate root for ergonomic `use airband_core::*`.
pub use channel::{Channel, ChannelBank, ChannelId, ChannelList};
pub use error::{Error, Result};
pub use events::SessionEvent;
pub use transport::{Transport, TransportReader, TransportWriter};
pub use tuner::{AudioHandler, SampleRateHandler, SignalHandler, Tuner};
