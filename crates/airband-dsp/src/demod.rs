//! FM demodulators.

use num_complex::Complex32;

/// Three-sample delay line exposing a two-sample central difference.
#[derive(Debug, Clone, Default)]
struct DerivativeFilter {
    taps: [f32; 3],
}

impl DerivativeFilter {
    /// Push a sample, returning `x[n] - x[n-2]`.
    fn process(&mut self, sample: f32) -> f32 {
        self.taps[2] = self.taps[1];
        self.taps[1] = self.taps[0];
        self.taps[0] = sample;
        sample - self.taps[2]
    }

    /// The previous input, `x[n-1]`.
    fn delayed(&self) -> f32 {
        self.taps[1]
    }

    fn reset(&mut self) {
        self.taps = [0.0; 3];
    }
}

/// Derivative-based FM discriminator.
///
/// Differentiates each rail and forms
/// `(i[n-1] * dq - q[n-1] * di) / (i^2 + q^2)`, the classic
/// amplitude-normalized frequency detector. Output is in radians per
/// sample, unscaled.
#[derive(Debug, Clone, Default)]
pub struct Discriminator {
    d_i: DerivativeFilter,
    d_q: DerivativeFilter,
}

impl Discriminator {
    pub fn new() -> Discriminator {
        Discriminator::default()
    }

    pub fn process(&mut self, sample: Complex32) -> f32 {
        let di = self.d_i.process(sample.re);
        let dq = self.d_q.process(sample.im);
        let magnitude_sq = sample.re * sample.re + sample.im * sample.im;
        if magnitude_sq == 0.0 {
            return 0.0;
        }
        (self.d_i.delayed() * dq - self.d_q.delayed() * di) / magnitude_sq
    }

    pub fn reset(&mut self) {
        self.d_i.reset();
        self.d_q.reset();
    }
}

/// Phase-difference FM demodulator.
///
/// Output is `gain * arg(x[n] * conj(x[n-1]))`: the instantaneous
/// frequency in radians per sample, scaled.
#[derive(Debug, Clone)]
pub struct QuadratureDemod {
    gain: f32,
    previous: Complex32,
}

impl QuadratureDemod {
    pub fn new(gain: f32) -> QuadratureDemod {
        QuadratureDemod {
            gain,
            previous: Complex32::new(0.0, 0.0),
        }
    }

    pub fn process(&mut self, sample: Complex32) -> f32 {
        let out = self.gain * (sample * self.previous.conj()).arg();
        self.previous = sample;
        out
    }

    pub fn reset(&mut self) {
        self.previous = Complex32::new(0.0, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    fn fm_tone(freq_cycles_per_sample: f32, len: usize) -> Vec<Complex32> {
        (0..len)
            .map(|n| Complex32::from_polar(1.0, TAU * freq_cycles_per_sample * n as f32))
            .collect()
    }

    #[test]
    fn derivative_filter_central_difference() {
        let mut filter = DerivativeFilter::default();
        let inputs = [1.0, 2.0, 4.0, 7.0];
        let mut outputs = Vec::new();
        for x in inputs {
            outputs.push(filter.process(x));
        }
        assert_eq!(outputs, vec![1.0, 2.0, 3.0, 5.0]);
        assert_eq!(filter.delayed(), 4.0);
    }

    #[test]
    fn discriminator_output_proportional_to_frequency() {
        // After the delay line fills, a constant-frequency tone yields a
        // constant 2 * sin(omega): the two-sample central difference
        // doubles the single-step detector response.
        for freq in [0.01f32, 0.02, -0.015] {
            let mut disc = Discriminator::new();
            let mut last = 0.0;
            for sample in fm_tone(freq, 50) {
                last = disc.process(sample);
            }
            let expected = 2.0 * (TAU * freq).sin();
            assert!(
                (last - expected).abs() < 1e-3,
                "freq {}: got {}, expected {}",
                freq,
                last,
                expected
            );
        }
    }

    #[test]
    fn discriminator_amplitude_invariance() {
        let mut unit = Discriminator::new();
        let mut scaled = Discriminator::new();
        let mut outputs = Vec::new();
        for sample in fm_tone(0.02, 50) {
            outputs.push((unit.process(sample), scaled.process(sample * 3.0)));
        }
        for (a, b) in outputs.iter().skip(5) {
            assert!((a - b).abs() < 1e-4, "output should not depend on amplitude");
        }
    }

    #[test]
    fn discriminator_handles_zero_sample() {
        let mut disc = Discriminator::new();
        assert_eq!(disc.process(Complex32::new(0.0, 0.0)), 0.0);
    }

    #[test]
    fn quadrature_demod_measures_phase_step() {
        let mut demod = QuadratureDemod::new(2.0);
        let mut last = 0.0;
        for sample in fm_tone(0.01, 20) {
            last = demod.process(sample);
        }
        assert!((last - 2.0 * TAU * 0.01).abs() < 1e-5);
    }

    #[test]
    fn quadrature_demod_sign_follows_rotation() {
        let mut demod = QuadratureDemod::new(1.0);
        let mut last = 0.0;
        for sample in fm_tone(-0.01, 20) {
            last = demod.process(sample);
        }
        assert!(last < 0.0);
    }
}
