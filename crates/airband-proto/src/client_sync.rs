//! Client sync message body.

use airband_core::{Error, Result};

/// Client sync payload size: nine little-endian u32 fields.
pub const CLIENT_SYNC_SIZE: usize = 36;

/// Snapshot of the server-side receiver state.
///
/// Sent after the hello exchange and again whenever a control command
/// changes state, so the client can mirror the authoritative values
/// instead of assuming its commands were applied verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSync {
    /// Whether this client is allowed to change receiver settings.
    pub can_control: bool,
    /// Current RF gain setting.
    pub gain: u32,
    /// Hardware centre frequency in Hz.
    pub device_centre_frequency: u32,
    /// IQ channel centre frequency in Hz.
    pub iq_centre_frequency: u32,
    /// FFT channel centre frequency in Hz.
    pub fft_centre_frequency: u32,
    /// Lowest tunable IQ centre frequency in Hz.
    pub min_iq_centre_frequency: u32,
    /// Highest tunable IQ centre frequency in Hz.
    pub max_iq_centre_frequency: u32,
    /// Lowest tunable FFT centre frequency in Hz.
    pub min_fft_centre_frequency: u32,
    /// Highest tunable FFT centre frequency in Hz.
    pub max_fft_centre_frequency: u32,
}

impl ClientSync {
    /// Parse a client sync body.
    pub fn parse(data: &[u8]) -> Result<ClientSync> {
        if data.len() < CLIENT_SYNC_SIZE {
            return Err(Error::Protocol(format!(
                "client sync too short: {} bytes, need {}",
                data.len(),
                CLIENT_SYNC_SIZE
            )));
        }

        let field = |i: usize| {
            u32::from_le_bytes([data[i * 4], data[i * 4 + 1], data[i * 4 + 2], data[i * 4 + 3]])
        };

        Ok(ClientSync {
            can_control: field(0) > 0,
            gain: field(1),
            device_centre_frequency: field(2),
            iq_centre_frequency: field(3),
            fft_centre_frequency: field(4),
            min_iq_centre_frequency: field(5),
            max_iq_centre_frequency: field(6),
            min_fft_centre_frequency: field(7),
            max_fft_centre_frequency: field(8),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_bytes(fields: [u32; 9]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CLIENT_SYNC_SIZE);
        for field in fields {
            buf.extend_from_slice(&field.to_le_bytes());
        }
        buf
    }

    #[test]
    fn parse_controllable_state() {
        let buf = sync_bytes([
            1,
            14,
            124_500_000,
            124_500_000,
            124_500_000,
            24_000_000,
            1_800_000_000,
            24_000_000,
            1_800_000_000,
        ]);
        let sync = ClientSync::parse(&buf).unwrap();
        assert!(sync.can_control);
        assert_eq!(sync.gain, 14);
        assert_eq!(sync.iq_centre_frequency, 124_500_000);
        assert_eq!(sync.max_fft_centre_frequency, 1_800_000_000);
    }

    #[test]
    fn parse_read_only_state() {
        let sync = ClientSync::parse(&sync_bytes([0; 9])).unwrap();
        assert!(!sync.can_control);
    }

    #[test]
    fn reject_short_body() {
        let err = ClientSync::parse(&[0u8; 35]).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }
}
