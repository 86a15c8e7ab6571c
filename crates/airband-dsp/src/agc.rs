//! Automatic gain control.
//!
//! Gain tracking is a PID loop (proportional-only in practice) driving
//! the measured block energy toward a target that scales with the sample
//! rate. The controller outputs a gain adjustment per block; the caller
//! decides when the accumulated gain has moved far enough to be worth
//! sending to the radio.

use num_complex::Complex32;

/// Textbook PID controller with a fixed timestep.
#[derive(Debug, Clone)]
pub struct PidController {
    kp: f32,
    ki: f32,
    kd: f32,
    dt: f32,
    integral_prior: f32,
    error_prior: f32,
}

impl PidController {
    pub fn new(kp: f32, ki: f32, kd: f32, dt: f32) -> PidController {
        PidController {
            kp,
            ki,
            kd,
            dt,
            integral_prior: 0.0,
            error_prior: 0.0,
        }
    }

    /// One controller step toward `desired` given the `actual` reading.
    pub fn run(&mut self, desired: f32, actual: f32) -> f32 {
        let error = desired - actual;
        let integral = self.integral_prior + error * self.dt;
        let derivative = (error - self.error_prior) / self.dt;
        self.integral_prior = integral;
        self.error_prior = error;
        self.kp * error + self.ki * integral + self.kd * derivative
    }

    pub fn reset(&mut self) {
        self.integral_prior = 0.0;
        self.error_prior = 0.0;
    }
}

/// Exponentially smoothed energy estimate.
///
/// Smoothing happens in the power domain: readings are squared before
/// blending, and the estimate is the root of the blend. Same fixed
/// point as a linear smoother, but transients weigh in by energy.
#[derive(Debug, Clone)]
pub struct EnergyEstimator {
    delta: f32,
    estimate: f32,
}

impl EnergyEstimator {
    pub fn new(delta: f32) -> EnergyEstimator {
        EnergyEstimator {
            delta,
            estimate: 0.0,
        }
    }

    /// Blend a new reading into the running estimate.
    pub fn update(&mut self, value: f32) -> f32 {
        self.estimate =
            (self.delta * value * value + (1.0 - self.delta) * self.estimate * self.estimate)
                .sqrt();
        self.estimate
    }

    pub fn estimate(&self) -> f32 {
        self.estimate
    }

    pub fn reset(&mut self) {
        self.estimate = 0.0;
    }
}

/// Euclidean norm of a complex sample block.
pub fn l2_norm(samples: &[Complex32]) -> f32 {
    samples
        .iter()
        .map(|s| s.re * s.re + s.im * s.im)
        .sum::<f32>()
        .sqrt()
}

const SMOOTHING_DELTA: f32 = 0.1;
const GAIN_KP: f32 = 0.1;
// Target block energy per 9375 Hz of sample rate, calibrated against
// Airspy hardware at the rates this client streams at.
const TARGET_ENERGY_DIVISOR: f32 = 9375.0;

/// Block-energy driven gain tracker.
#[derive(Debug, Clone)]
pub struct Agc {
    pid: PidController,
    energy: EnergyEstimator,
    target: f32,
    gain: f32,
    max_gain: f32,
}

impl Agc {
    /// Gain starts at the ceiling so a quiet channel is audible from
    /// the first batch; the loop walks it down when the signal is hot.
    pub fn new(sample_rate: u32, max_gain: u32) -> Agc {
        let max_gain = (max_gain as f32).max(1.0);
        Agc {
            pid: PidController::new(GAIN_KP, 0.0, 0.0, 1.0),
            energy: EnergyEstimator::new(SMOOTHING_DELTA),
            target: sample_rate as f32 / TARGET_ENERGY_DIVISOR,
            gain: max_gain,
            max_gain,
        }
    }

    /// Fold one IQ block into the loop and return the updated gain.
    pub fn update(&mut self, block: &[Complex32]) -> f32 {
        let estimate = self.energy.update(l2_norm(block));
        let adjustment = self.pid.run(self.target, estimate);
        self.gain = (self.gain + adjustment).clamp(1.0, self.max_gain);
        self.gain
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Reseed the loop, clamping the seed into the valid gain range.
    pub fn reset(&mut self, gain: f32) {
        self.gain = gain.clamp(1.0, self.max_gain);
        self.pid.reset();
        self.energy.reset();
    }

    pub fn set_max_gain(&mut self, max_gain: u32) {
        self.max_gain = max_gain as f32;
        self.gain = self.gain.clamp(1.0, self.max_gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_proportional_only() {
        let mut pid = PidController::new(0.1, 0.0, 0.0, 1.0);
        assert!((pid.run(10.0, 4.0) - 0.6).abs() < 1e-6);
        // Same error again: no integral or derivative contribution.
        assert!((pid.run(10.0, 4.0) - 0.6).abs() < 1e-6);
    }

    #[test]
    fn pid_integral_accumulates() {
        let mut pid = PidController::new(0.0, 1.0, 0.0, 1.0);
        assert!((pid.run(1.0, 0.0) - 1.0).abs() < 1e-6);
        assert!((pid.run(1.0, 0.0) - 2.0).abs() < 1e-6);
        assert!((pid.run(1.0, 0.0) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn pid_derivative_reacts_to_change() {
        let mut pid = PidController::new(0.0, 0.0, 1.0, 1.0);
        assert!((pid.run(1.0, 0.0) - 1.0).abs() < 1e-6);
        assert!(pid.run(1.0, 0.0).abs() < 1e-6);
    }

    #[test]
    fn l2_norm_matches_by_hand() {
        let block = [Complex32::new(3.0, 4.0), Complex32::new(0.0, 0.0)];
        assert!((l2_norm(&block) - 5.0).abs() < 1e-6);
        assert_eq!(l2_norm(&[]), 0.0);
    }

    #[test]
    fn energy_estimator_converges() {
        let mut est = EnergyEstimator::new(0.1);
        for _ in 0..100 {
            est.update(5.0);
        }
        assert!((est.estimate() - 5.0).abs() < 1e-3);
    }

    #[test]
    fn energy_estimator_blends_in_power_domain() {
        // First reading from a zero estimate lands at sqrt(delta) * x,
        // not delta * x as a linear smoother would.
        let mut est = EnergyEstimator::new(0.1);
        let first = est.update(5.0);
        assert!((first - 5.0 * 0.1f32.sqrt()).abs() < 1e-5, "got {}", first);
    }

    #[test]
    fn new_seeds_gain_at_ceiling() {
        let agc = Agc::new(9375, 21);
        assert!((agc.gain() - 21.0).abs() < 1e-6);
    }

    #[test]
    fn weak_signal_drives_gain_up() {
        let mut agc = Agc::new(9375, 21);
        agc.reset(1.0);
        let quiet = vec![Complex32::new(1e-3, 0.0); 512];
        for _ in 0..50 {
            agc.update(&quiet);
        }
        assert!(agc.gain() > 1.0);
        assert!(agc.gain() <= 21.0);
    }

    #[test]
    fn strong_signal_drives_gain_down_to_floor() {
        let mut agc = Agc::new(9375, 21);
        agc.reset(21.0);
        let loud = vec![Complex32::new(1.0, 1.0); 4096];
        for _ in 0..200 {
            agc.update(&loud);
        }
        assert!((agc.gain() - 1.0).abs() < 1e-6, "gain should bottom out at 1");
    }

    #[test]
    fn reset_clamps_seed() {
        let mut agc = Agc::new(9375, 21);
        agc.reset(100.0);
        assert!((agc.gain() - 21.0).abs() < 1e-6);
        agc.reset(-5.0);
        assert!((agc.gain() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn max_gain_change_reclamps() {
        let mut agc = Agc::new(9375, 21);
        agc.reset(21.0);
        agc.set_max_gain(10);
        assert!((agc.gain() - 10.0).abs() < 1e-6);
    }
}
