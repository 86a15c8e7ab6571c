//! Client command encoding.
//!
//! Commands are framed as `[commandType: u32 LE][argsLength: u32 LE][args]`.
//! The hello exchange carries the client's protocol version and a UTF-8
//! identifier; everything else is a setting id plus a 32-bit value.

use bytes::{BufMut, BytesMut};

/// Protocol version this client speaks, packed `major.minor.patch`.
pub const PROTOCOL_VERSION: u32 = (2 << 24) | 1700;

/// Command type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CommandType {
    Hello = 0,
    GetSetting = 1,
    SetSetting = 2,
    Ping = 3,
}

/// Setting ids for [`CommandType::SetSetting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Setting {
    StreamingMode = 0,
    StreamingEnabled = 1,
    Gain = 2,
    IqFormat = 100,
    IqFrequency = 101,
    IqDecimation = 102,
    IqDigitalGain = 103,
    FftFormat = 200,
    FftFrequency = 201,
    FftDecimation = 202,
    FftDbOffset = 203,
    FftDbRange = 204,
    FftDisplayPixels = 205,
}

/// Sample formats for the IQ and FFT format settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StreamFormat {
    Uint8 = 1,
    Int16 = 2,
    Int24 = 3,
    Float = 4,
    Dint4 = 5,
}

/// Streaming mode bitmask values for [`Setting::StreamingMode`].
pub mod stream_mode {
    /// IQ channel enabled.
    pub const IQ_ONLY: u32 = 1;
    /// FFT channel enabled.
    pub const FFT_ONLY: u32 = 2;
    /// Both channels enabled.
    pub const FFT_IQ: u32 = 3;
}

fn encode_command(command_type: CommandType, args: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(8 + args.len());
    buf.put_u32_le(command_type as u32);
    buf.put_u32_le(args.len() as u32);
    buf.put_slice(args);
    buf.to_vec()
}

/// Encode the hello command opening a session.
///
/// Args are the client protocol version followed by the UTF-8 client
/// identifier, unterminated.
pub fn encode_hello(client_id: &str) -> Vec<u8> {
    let mut args = BytesMut::with_capacity(4 + client_id.len());
    args.put_u32_le(PROTOCOL_VERSION);
    args.put_slice(client_id.as_bytes());
    encode_command(CommandType::Hello, &args)
}

/// Encode a set-setting command.
pub fn encode_set(setting: Setting, value: u32) -> Vec<u8> {
    let mut args = BytesMut::with_capacity(8);
    args.put_u32_le(setting as u32);
    args.put_u32_le(value);
    encode_command(CommandType::SetSetting, &args)
}

/// Encode a get-setting command.
pub fn encode_get(setting: Setting) -> Vec<u8> {
    encode_command(CommandType::GetSetting, &(setting as u32).to_le_bytes())
}

/// Encode a keepalive ping.
pub fn encode_ping() -> Vec<u8> {
    encode_command(CommandType::Ping, &[])
}

/// Encode the sync-request sequence.
///
/// Re-sending the stream format settings prompts the server to reply
/// with a fresh client sync, which is how the client learns that its
/// state-changing commands took effect.
pub fn encode_sync_request() -> Vec<Vec<u8>> {
    vec![
        encode_set(Setting::FftFormat, StreamFormat::Uint8 as u32),
        encode_set(Setting::IqFormat, StreamFormat::Uint8 as u32),
    ]
}
