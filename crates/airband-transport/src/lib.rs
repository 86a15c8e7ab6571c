//! airband-transport: byte-stream transports for the airband client.
//!
//! SpyServer speaks its binary protocol over a plain TCP socket, so
//! [`TcpTransport`] is the only production transport. The test harness
//! crate provides an in-memory duplex transport with the same interface
//! for deterministic protocol testing.

pub mod tcp;

pub use tcp::TcpTransport;
