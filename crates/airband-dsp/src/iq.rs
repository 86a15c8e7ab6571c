//! Wire sample conversion.

use num_complex::Complex32;

/// Map one unsigned 8-bit sample into [-1, 1].
#[inline]
pub fn normalize_u8(byte: u8) -> f32 {
    2.0 * (byte as f32 / 255.0 - 0.5)
}

/// Convert interleaved unsigned 8-bit I/Q bytes into complex samples.
///
/// A trailing odd byte, which a well-formed stream never produces, is
/// dropped.
pub fn decode_iq_u8(bytes: &[u8]) -> Vec<Complex32> {
    bytes
        .chunks_exact(2)
        .map(|pair| Complex32::new(normalize_u8(pair[0]), normalize_u8(pair[1])))
        .collect()
}

/// Convert unsigned 8-bit FFT magnitude bins to floats.
pub fn decode_fft_u8(bytes: &[u8]) -> Vec<f32> {
    bytes.iter().map(|&b| b as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_range() {
        assert!((normalize_u8(0) + 1.0).abs() < 1e-6);
        assert!((normalize_u8(255) - 1.0).abs() < 1e-6);
        // 127/255 sits just below midscale.
        assert!(normalize_u8(127) < 0.0);
        assert!(normalize_u8(128) > 0.0);
    }

    #[test]
    fn interleaved_pairs() {
        let samples = decode_iq_u8(&[0, 255, 128, 128]);
        assert_eq!(samples.len(), 2);
        assert!((samples[0].re + 1.0).abs() < 1e-6);
        assert!((samples[0].im - 1.0).abs() < 1e-6);
        assert!(samples[1].re.abs() < 0.01);
    }

    #[test]
    fn odd_trailing_byte_dropped() {
        assert_eq!(decode_iq_u8(&[1, 2, 3]).len(), 1);
    }
}
