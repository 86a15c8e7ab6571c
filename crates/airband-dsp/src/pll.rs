//! Carrier tracking loop.

use num_complex::Complex32;
use std::f32::consts::TAU;

/// Second-order phase-locked loop with a lock quality metric.
///
/// `alpha` sets the phase correction rate; the frequency correction rate
/// is derived as `0.5 * alpha^2`. The lock metric is a smoothed square of
/// the phase error: it decays toward zero while tracking a coherent
/// carrier and stays high on noise, which makes it usable as a squelch.
#[derive(Debug, Clone)]
pub struct PhaseLockLoop {
    alpha: f32,
    beta: f32,
    phase: f32,
    frequency: f32,
    lock: f32,
}

/// Output of one PLL step.
#[derive(Debug, Clone, Copy)]
pub struct PllOutput {
    /// Coherently demodulated amplitude (the in-phase projection onto
    /// the tracked carrier).
    pub am: f32,
    /// Instantaneous phase error in radians.
    pub error: f32,
}

const LOCK_SMOOTHING: f32 = 0.005;
const INITIAL_LOCK: f32 = 0.5;

impl PhaseLockLoop {
    pub fn new(alpha: f32) -> PhaseLockLoop {
        PhaseLockLoop {
            alpha,
            beta: 0.5 * alpha * alpha,
            phase: 0.0,
            frequency: 0.0,
            lock: INITIAL_LOCK,
        }
    }

    /// Advance the loop by one sample.
    pub fn process(&mut self, sample: Complex32) -> PllOutput {
        let oscillator = Complex32::from_polar(1.0, self.phase);
        let mixed = sample * oscillator.conj();
        let error = mixed.arg();

        self.lock = LOCK_SMOOTHING * error * error + (1.0 - LOCK_SMOOTHING) * self.lock;
        self.phase += self.alpha * error;
        self.frequency += self.beta * error;
        self.phase = (self.phase + self.frequency).rem_euclid(TAU);

        PllOutput { am: mixed.re, error }
    }

    /// Smoothed squared phase error. Low values mean the loop is locked.
    pub fn lock(&self) -> f32 {
        self.lock
    }

    /// Whether the lock metric has dropped below the squelch threshold.
    pub fn locked(&self, squelch: f32) -> bool {
        self.lock < squelch
    }

    /// Estimated carrier offset in radians per sample.
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Back to the unlocked initial state.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.frequency = 0.0;
        self.lock = INITIAL_LOCK;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SQUELCH: f32 = 0.15;

    fn tone(freq_cycles_per_sample: f32, len: usize) -> Vec<Complex32> {
        (0..len)
            .map(|n| Complex32::from_polar(1.0, TAU * freq_cycles_per_sample * n as f32))
            .collect()
    }

    #[test]
    fn locks_onto_offset_carrier() {
        let mut pll = PhaseLockLoop::new(0.04);
        for sample in tone(0.005, 1500) {
            pll.process(sample);
        }
        assert!(pll.locked(SQUELCH), "lock metric {} should be below squelch", pll.lock());
        // Tracked frequency should approach the carrier offset.
        assert!((pll.frequency() - TAU * 0.005).abs() < 0.005);
    }

    #[test]
    fn stays_unlocked_on_noise() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut pll = PhaseLockLoop::new(0.04);
        for _ in 0..2000 {
            let sample = Complex32::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            pll.process(sample);
        }
        assert!(!pll.locked(SQUELCH), "noise should not lock, metric {}", pll.lock());
    }

    #[test]
    fn am_tracks_envelope_once_locked() {
        let mut pll = PhaseLockLoop::new(0.04);
        // Settle on the carrier first.
        for sample in tone(0.005, 1000) {
            pll.process(sample);
        }
        // Amplitude-modulate the same carrier and check the demodulated
        // output follows the envelope.
        let mut outputs = Vec::new();
        for n in 1000..1500usize {
            let envelope = 1.0 + 0.5 * (TAU * 0.002 * n as f32).sin();
            let carrier = Complex32::from_polar(envelope, TAU * 0.005 * n as f32);
            outputs.push((pll.process(carrier).am, envelope));
        }
        for (am, envelope) in outputs.iter().skip(100) {
            assert!((am - envelope).abs() < 0.1, "am {} envelope {}", am, envelope);
        }
    }

    #[test]
    fn reset_restores_initial_metric() {
        let mut pll = PhaseLockLoop::new(0.04);
        for sample in tone(0.005, 1500) {
            pll.process(sample);
        }
        assert!(pll.locked(SQUELCH));
        pll.reset();
        assert!(!pll.locked(SQUELCH));
        assert_eq!(pll.frequency(), 0.0);
    }
}
