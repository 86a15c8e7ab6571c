//! SpyServer message header parsing.
//!
//! Every message starts with a fixed 20-byte header of five little-endian
//! u32 fields:
//!
//! ```text
//! [protocolVersion][messageType][streamType][sequence][length]
//! ```
//!
//! `length` is the payload byte count that follows the header. The header
//! is immutable once parsed.

use airband_core::{Error, Result};

/// Message header size in bytes.
pub const HEADER_SIZE: usize = 20;

/// Message type identifier from the header's second field.
///
/// The id space groups sample formats by hundreds: IQ variants at 100+,
/// demodulated audio (AF) at 200+, FFT at 300+. This client streams in
/// unsigned 8-bit formats only; the other variants are decoded to their
/// type so unknown-type logging stays precise, but their payloads are not
/// interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Device capability announcement, once per session.
    DeviceInfo,
    /// Receiver state snapshot, sent after control commands.
    ClientSync,
    /// Reply to a ping command.
    Pong,
    /// Reply to a get-setting command.
    ReadSetting,
    /// Interleaved unsigned 8-bit I/Q samples.
    Uint8Iq,
    /// Interleaved signed 16-bit I/Q samples.
    Int16Iq,
    /// Interleaved signed 24-bit I/Q samples.
    Int24Iq,
    /// Interleaved float32 I/Q samples.
    FloatIq,
    /// Unsigned 8-bit demodulated audio.
    Uint8Af,
    /// Signed 16-bit demodulated audio.
    Int16Af,
    /// Signed 24-bit demodulated audio.
    Int24Af,
    /// Float32 demodulated audio.
    FloatAf,
    /// Packed 4-bit FFT magnitude bins.
    Dint4Fft,
    /// Unsigned 8-bit FFT magnitude bins.
    Uint8Fft,
    /// Unrecognized message type id.
    Unknown(u32),
}

impl MessageType {
    /// Map a raw header field to a message type.
    pub fn from_raw(raw: u32) -> MessageType {
        match raw {
            0 => MessageType::DeviceInfo,
            1 => MessageType::ClientSync,
            2 => MessageType::Pong,
            3 => MessageType::ReadSetting,
            100 => MessageType::Uint8Iq,
            101 => MessageType::Int16Iq,
            102 => MessageType::Int24Iq,
            103 => MessageType::FloatIq,
            200 => MessageType::Uint8Af,
            201 => MessageType::Int16Af,
            202 => MessageType::Int24Af,
            203 => MessageType::FloatAf,
            300 => MessageType::Dint4Fft,
            301 => MessageType::Uint8Fft,
            other => MessageType::Unknown(other),
        }
    }

    /// The raw wire id for this type.
    pub fn raw(&self) -> u32 {
        match *self {
            MessageType::DeviceInfo => 0,
            MessageType::ClientSync => 1,
            MessageType::Pong => 2,
            MessageType::ReadSetting => 3,
            MessageType::Uint8Iq => 100,
            MessageType::Int16Iq => 101,
            MessageType::Int24Iq => 102,
            MessageType::FloatIq => 103,
            MessageType::Uint8Af => 200,
            MessageType::Int16Af => 201,
            MessageType::Int24Af => 202,
            MessageType::FloatAf => 203,
            MessageType::Dint4Fft => 300,
            MessageType::Uint8Fft => 301,
            MessageType::Unknown(raw) => raw,
        }
    }
}

/// Stream identifier from the header's third field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// Status/control stream.
    Status,
    /// IQ sample stream.
    Iq,
    /// Demodulated audio stream.
    Af,
    /// FFT magnitude stream.
    Fft,
    /// Unrecognized stream id.
    Unknown(u32),
}

impl StreamType {
    /// Map a raw header field to a stream type.
    pub fn from_raw(raw: u32) -> StreamType {
        match raw {
            0 => StreamType::Status,
            1 => StreamType::Iq,
            2 => StreamType::Af,
            4 => StreamType::Fft,
            other => StreamType::Unknown(other),
        }
    }
}

/// Protocol version packed as `major.minor.patch` in 32 bits:
/// major in the top byte, minor in the next, patch in the low 16 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    /// Major version (top 8 bits).
    pub major: u8,
    /// Minor version (next 8 bits).
    pub minor: u8,
    /// Patch/build number (low 16 bits).
    pub patch: u16,
}

impl ProtocolVersion {
    /// Unpack a raw 32-bit version field.
    pub fn from_raw(raw: u32) -> Self {
        ProtocolVersion {
            major: (raw >> 24) as u8,
            minor: ((raw >> 16) & 0xFF) as u8,
            patch: (raw & 0xFFFF) as u16,
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Parsed 20-byte SpyServer message header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// Server protocol version.
    pub protocol_version: ProtocolVersion,
    /// Message type.
    pub message_type: MessageType,
    /// Stream the message belongs to.
    pub stream_type: StreamType,
    /// Monotonically increasing per-stream sequence number.
    pub sequence: u32,
    /// Payload byte count following the header.
    pub length: u32,
}

impl MessageHeader {
    /// Parse a header from the first [`HEADER_SIZE`] bytes of `data`.
    ///
    /// Fails with [`Error::Protocol`] if the buffer is too short.
    pub fn parse(data: &[u8]) -> Result<MessageHeader> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Protocol(format!(
                "message header too short: {} bytes, need {}",
                data.len(),
                HEADER_SIZE
            )));
        }

        let field = |i: usize| {
            u32::from_le_bytes([data[i * 4], data[i * 4 + 1], data[i * 4 + 2], data[i * 4 + 3]])
        };

        Ok(MessageHeader {
            protocol_version: ProtocolVersion::from_raw(field(0)),
            message_type: MessageType::from_raw(field(1)),
            stream_type: StreamType::from_raw(field(2)),
            sequence: field(3),
            length: field(4),
        })
    }

    /// Encode this header into 20 wire bytes.
    ///
    /// Used by the test harness to script server frames.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let raw_version = ((self.protocol_version.major as u32) << 24)
            | ((self.protocol_version.minor as u32) << 16)
            | self.protocol_version.patch as u32;
        let raw_stream = match self.stream_type {
            StreamType::Status => 0,
            StreamType::Iq => 1,
            StreamType::Af => 2,
            StreamType::Fft => 4,
            StreamType::Unknown(raw) => raw,
        };

        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&raw_version.to_le_bytes());
        buf[4..8].copy_from_slice(&self.message_type.raw().to_le_bytes());
        buf[8..12].copy_from_slice(&raw_stream.to_le_bytes());
        buf[12..16].copy_from_slice(&self.sequence.to_le_bytes());
        buf[16..20].copy_from_slice(&self.length.to_le_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_header(version: u32, msg_type: u32, stream: u32, seq: u32, len: u32) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        for field in [version, msg_type, stream, seq, len] {
            buf.extend_from_slice(&field.to_le_bytes());
        }
        buf
    }

    #[test]
    fn parse_valid_header() {
        let raw_version = (2 << 24) | (0 << 16) | 1700;
        let buf = build_header(raw_version, 100, 1, 42, 4096);
        let header = MessageHeader::parse(&buf).unwrap();

        assert_eq!(header.protocol_version.major, 2);
        assert_eq!(header.protocol_version.minor, 0);
        assert_eq!(header.protocol_version.patch, 1700);
        assert_eq!(header.protocol_version.to_string(), "2.0.1700");
        assert_eq!(header.message_type, MessageType::Uint8Iq);
        assert_eq!(header.stream_type, StreamType::Iq);
        assert_eq!(header.sequence, 42);
        assert_eq!(header.length, 4096);
    }

    #[test]
    fn reject_truncated_header() {
        let err = MessageHeader::parse(&[0u8; 19]).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn reject_empty_buffer() {
        let err = MessageHeader::parse(&[]).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn message_type_mapping() {
        let known: &[(u32, MessageType)] = &[
            (0, MessageType::DeviceInfo),
            (1, MessageType::ClientSync),
            (2, MessageType::Pong),
            (3, MessageType::ReadSetting),
            (100, MessageType::Uint8Iq),
            (101, MessageType::Int16Iq),
            (102, MessageType::Int24Iq),
            (103, MessageType::FloatIq),
            (200, MessageType::Uint8Af),
            (201, MessageType::Int16Af),
            (202, MessageType::Int24Af),
            (203, MessageType::FloatAf),
            (300, MessageType::Dint4Fft),
            (301, MessageType::Uint8Fft),
        ];
        for &(raw, expected) in known {
            assert_eq!(MessageType::from_raw(raw), expected, "raw {}", raw);
            assert_eq!(expected.raw(), raw);
        }
        assert_eq!(MessageType::from_raw(999), MessageType::Unknown(999));
        assert_eq!(MessageType::Unknown(999).raw(), 999);
    }

    #[test]
    fn stream_type_mapping() {
        assert_eq!(StreamType::from_raw(0), StreamType::Status);
        assert_eq!(StreamType::from_raw(1), StreamType::Iq);
        assert_eq!(StreamType::from_raw(2), StreamType::Af);
        assert_eq!(StreamType::from_raw(4), StreamType::Fft);
        assert_eq!(StreamType::from_raw(3), StreamType::Unknown(3));
    }

    #[test]
    fn encode_round_trip() {
        let header = MessageHeader {
            protocol_version: ProtocolVersion::from_raw((2 << 24) | 1700),
            message_type: MessageType::Uint8Fft,
            stream_type: StreamType::Fft,
            sequence: 7,
            length: 512,
        };
        let parsed = MessageHeader::parse(&header.encode()).unwrap();
        assert_eq!(parsed, header);
    }
}
