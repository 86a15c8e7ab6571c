//! Test support for airband: a scripted mock SpyServer and an in-memory
//! transport.
//!
//! Nothing in this crate is intended for production use.

pub mod frames;
pub mod mock_server;
pub mod mock_transport;

pub use mock_server::{MockSpyServer, ReceivedCommand};
pub use mock_transport::MockTransport;
