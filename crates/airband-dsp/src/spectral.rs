//! Spectrum-based signal detection.
//!
//! An alternative squelch for signals the PLL cannot track: watch the
//! FFT stream, estimate the noise floor, and flag a signal whenever a
//! bin rises far enough above it.

use std::time::{Duration, Instant};

const DEFAULT_THRESHOLD_DB: f32 = 2.0;
const MEASUREMENT_WINDOW: Duration = Duration::from_millis(150);
// Bins excluded from the floor estimate so the signal itself (and its
// immediate skirts) cannot drag the floor up.
const PEAK_BINS_DROPPED: usize = 3;

/// Noise-floor relative peak detector over a stream of FFT frames.
///
/// Frames are averaged per bin across a 150 ms window. At the end of
/// each window the floor is the mean of all bins minus the three
/// strongest, and a signal is declared when the strongest bin exceeds
/// the floor by the threshold in dB.
#[derive(Debug, Clone)]
pub struct SpectralPeakDetector {
    threshold_db: f32,
    means: Vec<f32>,
    frames: u32,
    window_start: Option<Instant>,
    signal: bool,
}

impl Default for SpectralPeakDetector {
    fn default() -> Self {
        SpectralPeakDetector::new(DEFAULT_THRESHOLD_DB)
    }
}

impl SpectralPeakDetector {
    pub fn new(threshold_db: f32) -> SpectralPeakDetector {
        SpectralPeakDetector {
            threshold_db,
            means: Vec::new(),
            frames: 0,
            window_start: None,
            signal: false,
        }
    }

    /// Fold one FFT frame in, stamped now.
    ///
    /// Returns `Some(decision)` when this frame closes a measurement
    /// window, `None` while one is still filling.
    pub fn add_frame(&mut self, bins: &[f32]) -> Option<bool> {
        self.add_frame_at(bins, Instant::now())
    }

    /// Clock-injectable variant of [`add_frame`](Self::add_frame).
    pub fn add_frame_at(&mut self, bins: &[f32], now: Instant) -> Option<bool> {
        if bins.is_empty() {
            return None;
        }
        if bins.len() != self.means.len() {
            // Resolution changed mid-stream, start the window over.
            self.means = vec![0.0; bins.len()];
            self.frames = 0;
            self.window_start = Some(now);
        }
        if self.window_start.is_none() {
            self.window_start = Some(now);
        }

        self.frames += 1;
        let n = self.frames as f32;
        for (mean, &bin) in self.means.iter_mut().zip(bins) {
            *mean += (bin - *mean) / n;
        }

        let started = self.window_start.unwrap_or(now);
        if now.duration_since(started) < MEASUREMENT_WINDOW {
            return None;
        }

        self.signal = self.measure();
        self.frames = 0;
        self.means.fill(0.0);
        self.window_start = Some(now);
        Some(self.signal)
    }

    fn measure(&self) -> bool {
        if self.means.len() <= PEAK_BINS_DROPPED {
            return false;
        }
        let mut sorted = self.means.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let floor_bins = &sorted[..sorted.len() - PEAK_BINS_DROPPED];
        let floor = floor_bins.iter().sum::<f32>() / floor_bins.len() as f32;
        let peak = sorted[sorted.len() - 1];
        if floor <= 0.0 || peak <= 0.0 {
            return false;
        }

        20.0 * peak.log10() - 20.0 * floor.log10() > self.threshold_db
    }

    /// Decision from the most recently completed window.
    pub fn signal_present(&self) -> bool {
        self.signal
    }

    /// Drop accumulated state, e.g. after retuning.
    pub fn reset(&mut self) {
        self.means.clear();
        self.frames = 0;
        self.window_start = None;
        self.signal = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_frame(level: f32, n: usize) -> Vec<f32> {
        vec![level; n]
    }

    fn frame_with_peak(floor: f32, peak: f32, n: usize) -> Vec<f32> {
        let mut bins = vec![floor; n];
        bins[n / 2] = peak;
        bins
    }

    fn run_window(detector: &mut SpectralPeakDetector, frame: &[f32]) -> bool {
        let start = Instant::now();
        assert!(detector.add_frame_at(frame, start).is_none());
        detector
            .add_frame_at(frame, start + Duration::from_millis(160))
            .unwrap()
    }

    #[test]
    fn flat_spectrum_is_quiet() {
        let mut detector = SpectralPeakDetector::default();
        assert!(!run_window(&mut detector, &flat_frame(40.0, 64)));
        assert!(!detector.signal_present());
    }

    #[test]
    fn strong_peak_is_detected() {
        let mut detector = SpectralPeakDetector::default();
        // 100 over a floor of 40 is roughly 8 dB.
        assert!(run_window(&mut detector, &frame_with_peak(40.0, 100.0, 64)));
        assert!(detector.signal_present());
    }

    #[test]
    fn peak_below_threshold_is_ignored() {
        let mut detector = SpectralPeakDetector::default();
        // About 0.8 dB over the floor.
        assert!(!run_window(&mut detector, &frame_with_peak(40.0, 44.0, 64)));
    }

    #[test]
    fn no_decision_before_window_elapses() {
        let mut detector = SpectralPeakDetector::default();
        let start = Instant::now();
        for i in 0..5 {
            let at = start + Duration::from_millis(i * 20);
            assert!(detector
                .add_frame_at(&frame_with_peak(40.0, 100.0, 64), at)
                .is_none());
        }
    }

    #[test]
    fn bin_count_change_restarts_window() {
        let mut detector = SpectralPeakDetector::default();
        let start = Instant::now();
        detector.add_frame_at(&flat_frame(40.0, 64), start);
        // Resolution change close to the window boundary must not close
        // the old window with mismatched bins.
        let decision = detector.add_frame_at(
            &frame_with_peak(40.0, 100.0, 128),
            start + Duration::from_millis(140),
        );
        assert!(decision.is_none());
    }

    #[test]
    fn frames_average_within_window() {
        let mut detector = SpectralPeakDetector::default();
        let start = Instant::now();
        // A frame with a 3.5 dB peak, averaged against many quiet ones,
        // falls below the threshold.
        detector.add_frame_at(&frame_with_peak(40.0, 60.0, 64), start);
        for i in 1..10 {
            detector.add_frame_at(&flat_frame(40.0, 64), start + Duration::from_millis(i * 10));
        }
        let decision = detector
            .add_frame_at(&flat_frame(40.0, 64), start + Duration::from_millis(160))
            .unwrap();
        assert!(!decision, "single outlier frame should average away");
    }

    #[test]
    fn reset_clears_decision() {
        let mut detector = SpectralPeakDetector::default();
        assert!(run_window(&mut detector, &frame_with_peak(40.0, 100.0, 64)));
        detector.reset();
        assert!(!detector.signal_present());
    }
}
