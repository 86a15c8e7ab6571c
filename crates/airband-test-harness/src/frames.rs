//! Scripted server frame builders.

use airband_proto::{MessageHeader, MessageType, ProtocolVersion, StreamType, PROTOCOL_VERSION};

fn frame(message_type: MessageType, stream_type: StreamType, sequence: u32, payload: &[u8]) -> Vec<u8> {
    let header = MessageHeader {
        protocol_version: ProtocolVersion::from_raw(PROTOCOL_VERSION),
        message_type,
        stream_type,
        sequence,
        length: payload.len() as u32,
    };
    let mut buf = header.encode().to_vec();
    buf.extend_from_slice(payload);
    buf
}

/// Fields for a scripted device info frame, defaulting to an Airspy-like
/// profile.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub device_type: u32,
    pub serial: u32,
    pub max_sample_rate: u32,
    pub max_bandwidth: u32,
    pub decimation_stages: u32,
    pub gain_stages: u32,
    pub max_gain: u32,
    pub min_frequency: u32,
    pub max_frequency: u32,
    pub adc_resolution_bits: u32,
    pub min_iq_decimation: u32,
    pub forced_iq_format: u32,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        DeviceProfile {
            device_type: 1,
            serial: 0x1234,
            max_sample_rate: 10_000_000,
            max_bandwidth: 8_000_000,
            decimation_stages: 11,
            gain_stages: 22,
            max_gain: 21,
            min_frequency: 24_000_000,
            max_frequency: 1_800_000_000,
            adc_resolution_bits: 12,
            min_iq_decimation: 1,
            forced_iq_format: 0,
        }
    }
}

/// Build a device info frame.
pub fn device_info(profile: &DeviceProfile) -> Vec<u8> {
    let fields = [
        profile.device_type,
        profile.serial,
        profile.max_sample_rate,
        profile.max_bandwidth,
        profile.decimation_stages,
        profile.gain_stages,
        profile.max_gain,
        profile.min_frequency,
        profile.max_frequency,
        profile.adc_resolution_bits,
        profile.min_iq_decimation,
        profile.forced_iq_format,
    ];
    let payload: Vec<u8> = fields.iter().flat_map(|f| f.to_le_bytes()).collect();
    frame(MessageType::DeviceInfo, StreamType::Status, 0, &payload)
}

/// Build a client sync frame.
pub fn client_sync(gain: u32, centre_frequency: u32, can_control: bool) -> Vec<u8> {
    let fields = [
        can_control as u32,
        gain,
        centre_frequency,
        centre_frequency,
        centre_frequency,
        24_000_000,
        1_800_000_000,
        24_000_000,
        1_800_000_000,
    ];
    let payload: Vec<u8> = fields.iter().flat_map(|f| f.to_le_bytes()).collect();
    frame(MessageType::ClientSync, StreamType::Status, 0, &payload)
}

/// Build an unsigned 8-bit IQ sample frame.
pub fn iq_samples(sequence: u32, payload: &[u8]) -> Vec<u8> {
    frame(MessageType::Uint8Iq, StreamType::Iq, sequence, payload)
}

/// Build an unsigned 8-bit FFT frame.
pub fn fft_frame(sequence: u32, bins: &[u8]) -> Vec<u8> {
    frame(MessageType::Uint8Fft, StreamType::Fft, sequence, bins)
}

/// Build a frame with an arbitrary raw message type id.
pub fn raw_frame(message_type: u32, payload: &[u8]) -> Vec<u8> {
    frame(MessageType::from_raw(message_type), StreamType::Status, 0, payload)
}
