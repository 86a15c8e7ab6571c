//! SpyServer wire protocol: message headers, status bodies, stream
//! reassembly, command encoding, and message dispatch.
//!
//! Parsers here are pure functions over byte slices; nothing in this
//! crate touches the network.

pub mod client_sync;
pub mod command;
pub mod decoder;
pub mod device_info;
pub mod framing;
pub mod header;

pub use client_sync::{ClientSync, CLIENT_SYNC_SIZE};
pub use command::{
    encode_get, encode_hello, encode_ping, encode_set, encode_sync_request, stream_mode,
    CommandType, Setting, StreamFormat, PROTOCOL_VERSION,
};
pub use decoder::{ClientSyncWatcher, DeviceInfoWatcher, MessageDecoder, SampleWatcher};
pub use device_info::{DeviceInfo, DeviceType, DEVICE_INFO_SIZE};
pub use framing::{Frame, FrameAssembler};
pub use header::{MessageHeader, MessageType, ProtocolVersion, StreamType, HEADER_SIZE};
