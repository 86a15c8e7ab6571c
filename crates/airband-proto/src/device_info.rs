//! Device info message body.

use airband_core::{Error, Result};

/// Device info payload size: twelve little-endian u32 fields.
pub const DEVICE_INFO_SIZE: usize = 48;

/// Hardware family reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Invalid,
    AirspyOne,
    AirspyHf,
    RtlSdr,
    Unknown(u32),
}

impl DeviceType {
    fn from_raw(raw: u32) -> DeviceType {
        match raw {
            0 => DeviceType::Invalid,
            1 => DeviceType::AirspyOne,
            2 => DeviceType::AirspyHf,
            3 => DeviceType::RtlSdr,
            other => DeviceType::Unknown(other),
        }
    }
}

/// Capabilities of the radio behind the server, sent once after hello.
///
/// Sample rate negotiation works off `max_sample_rate` and
/// `decimation_stages`: each stage halves the rate, so the achievable
/// rates are `max_sample_rate >> n` for each stage index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_type: DeviceType,
    pub device_serial: u32,
    pub max_sample_rate: u32,
    pub max_bandwidth: u32,
    pub decimation_stages: u32,
    pub gain_stages: u32,
    pub max_gain: u32,
    pub min_frequency: u32,
    pub max_frequency: u32,
    pub adc_resolution_bits: u32,
    pub min_iq_decimation: u32,
    pub forced_iq_format: bool,
}

impl DeviceInfo {
    /// Parse a device info body.
    ///
    /// Fails with [`Error::Protocol`] if the payload is shorter than the
    /// twelve required fields. Extra trailing bytes are ignored.
    pub fn parse(data: &[u8]) -> Result<DeviceInfo> {
        if data.len() < DEVICE_INFO_SIZE {
            return Err(Error::Protocol(format!(
                "device info too short: {} bytes, need {}",
                data.len(),
                DEVICE_INFO_SIZE
            )));
        }

        let field = |i: usize| {
            u32::from_le_bytes([data[i * 4], data[i * 4 + 1], data[i * 4 + 2], data[i * 4 + 3]])
        };

        Ok(DeviceInfo {
            device_type: DeviceType::from_raw(field(0)),
            device_serial: field(1),
            max_sample_rate: field(2),
            max_bandwidth: field(3),
            decimation_stages: field(4),
            gain_stages: field(5),
            max_gain: field(6),
            min_frequency: field(7),
            max_frequency: field(8),
            adc_resolution_bits: field(9),
            min_iq_decimation: field(10),
            forced_iq_format: field(11) > 0,
        })
    }

    /// Sample rates this device can stream at, from fastest to slowest.
    ///
    /// One entry per decimation stage, each stage halving the previous
    /// rate.
    pub fn available_sample_rates(&self) -> Vec<u32> {
        (0..self.decimation_stages)
            .map(|stage| self.max_sample_rate >> stage)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn airspy_device_info_bytes() -> Vec<u8> {
        let fields: [u32; 12] = [
            1,          // AirspyOne
            0x5EA1,     // serial
            10_000_000, // max sample rate
            8_000_000,  // max bandwidth
            11,         // decimation stages
            22,         // gain stages
            21,         // max gain
            24_000_000, // min frequency
            1_800_000_000,
            12, // adc bits
            1,  // min iq decimation
            0,  // forced iq format
        ];
        let mut buf = Vec::with_capacity(DEVICE_INFO_SIZE);
        for field in fields {
            buf.extend_from_slice(&field.to_le_bytes());
        }
        buf
    }

    #[test]
    fn parse_airspy_info() {
        let info = DeviceInfo::parse(&airspy_device_info_bytes()).unwrap();
        assert_eq!(info.device_type, DeviceType::AirspyOne);
        assert_eq!(info.device_serial, 0x5EA1);
        assert_eq!(info.max_sample_rate, 10_000_000);
        assert_eq!(info.decimation_stages, 11);
        assert_eq!(info.max_gain, 21);
        assert!(!info.forced_iq_format);
    }

    #[test]
    fn reject_short_body() {
        let err = DeviceInfo::parse(&[0u8; 47]).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn trailing_bytes_ignored() {
        let mut buf = airspy_device_info_bytes();
        buf.extend_from_slice(&[0xAA; 8]);
        assert!(DeviceInfo::parse(&buf).is_ok());
    }

    #[test]
    fn sample_rates_halve_per_stage() {
        let info = DeviceInfo::parse(&airspy_device_info_bytes()).unwrap();
        let rates = info.available_sample_rates();
        assert_eq!(rates.len(), 11);
        assert_eq!(rates[0], 10_000_000);
        assert_eq!(rates[1], 5_000_000);
        assert_eq!(rates[10], 10_000_000 >> 10);
        for window in rates.windows(2) {
            assert_eq!(window[0] / 2, window[1]);
        }
    }

    #[test]
    fn unknown_device_type() {
        let mut buf = airspy_device_info_bytes();
        buf[0..4].copy_from_slice(&77u32.to_le_bytes());
        let info = DeviceInfo::parse(&buf).unwrap();
        assert_eq!(info.device_type, DeviceType::Unknown(77));
    }
}
