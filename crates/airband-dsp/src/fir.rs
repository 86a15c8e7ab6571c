//! FIR filtering and windowed-sinc filter design.
//!
//! The design routine is a port of the Iowa Hills windowed-sinc
//! generator: an ideal low-pass impulse response shaped by one of the
//! classic window functions. Coefficients are computed in f64 and
//! truncated to f32 for the runtime path.

use airband_core::{Error, Result};
use std::f64::consts::PI;

/// Maximum supported tap count.
pub const MAX_TAPS: usize = 256;

/// Window functions for filter design.
///
/// `beta` is only meaningful for the parameterized windows (Kaiser,
/// Sinc, Sine); the rest ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    None,
    Kaiser,
    Sinc,
    Sine,
    Hann,
    Hamming,
    Blackman,
    FlatTop,
    BlackmanHarris,
    BlackmanNuttall,
    Nuttall,
    KaiserBessel,
    Trapezoid,
    Gauss,
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        x.sin() / x
    }
}

/// Zeroth-order modified Bessel function, series truncated at nine terms.
fn bessel(x: f64) -> f64 {
    let mut sum = 0.0;
    for i in 1..10 {
        let x_to_i = (x / 2.0).powi(i);
        let mut factorial = 1.0;
        for j in 1..=i {
            factorial *= j as f64;
        }
        sum += (x_to_i / factorial).powi(2);
    }
    1.0 + sum
}

/// Evaluate the window function over `n` points.
fn window_coefficients(window: Window, n: usize, beta: f64) -> Vec<f64> {
    let mut win = vec![1.0f64; n];
    if window == Window::None {
        return win;
    }

    let m = n;
    let dm = (m + 1) as f64;
    // Half-point count matching a float-bounded `j < M/2` loop: the
    // centre point is included when M is odd.
    let half = (m + 1) / 2;

    match window {
        Window::None => {}
        Window::Kaiser => {
            for (j, w) in win.iter_mut().enumerate().take(m) {
                let arg = beta * (1.0 - (((2 * j + 2) as f64 - dm) / dm).powi(2)).sqrt();
                *w = bessel(arg) / bessel(beta);
            }
        }
        Window::Sinc => {
            for (j, w) in win.iter_mut().enumerate().take(m) {
                *w = sinc(((2 * j + 1) as f64 - m as f64) / dm * PI).powf(beta);
            }
        }
        Window::Sine => {
            for (j, w) in win.iter_mut().enumerate().take(half) {
                *w = ((j + 1) as f64 * PI / dm).sin().powf(beta);
            }
        }
        Window::Hann => {
            for (j, w) in win.iter_mut().enumerate().take(half) {
                *w = 0.5 - 0.5 * ((j + 1) as f64 * PI * 2.0 / dm).cos();
            }
        }
        Window::Hamming => {
            for (j, w) in win.iter_mut().enumerate().take(half) {
                *w = 0.54 - 0.46 * ((j + 1) as f64 * PI * 2.0 / dm).cos();
            }
        }
        Window::Blackman => {
            for (j, w) in win.iter_mut().enumerate().take(half) {
                let arg = (j + 1) as f64 * PI * 2.0 / dm;
                *w = 0.42 - 0.50 * arg.cos() + 0.08 * (arg * 2.0).cos();
            }
        }
        Window::FlatTop => {
            for (j, w) in win.iter_mut().enumerate().take(m / 2 + 1) {
                let arg = (j + 1) as f64 * PI * 2.0 / dm;
                *w = 1.0 - 1.932_934_889_692_27 * arg.cos()
                    + 1.283_497_696_740_27 * (arg * 2.0).cos()
                    - 0.381_308_016_816_19 * (arg * 3.0).cos()
                    + 0.029_297_302_585_11 * (arg * 4.0).cos();
            }
        }
        Window::BlackmanHarris => {
            for (j, w) in win.iter_mut().enumerate().take(half) {
                let arg = (j + 1) as f64 * PI * 2.0 / dm;
                *w = 0.35875 - 0.48829 * arg.cos() + 0.14128 * (arg * 2.0).cos()
                    - 0.01168 * (arg * 3.0).cos();
            }
        }
        Window::BlackmanNuttall => {
            for (j, w) in win.iter_mut().enumerate().take(half) {
                let arg = (j + 1) as f64 * PI * 2.0 / dm;
                *w = 0.3635819 - 0.4891775 * arg.cos() + 0.1365995 * (arg * 2.0).cos()
                    - 0.0106411 * (arg * 3.0).cos();
            }
        }
        Window::Nuttall => {
            for (j, w) in win.iter_mut().enumerate().take(half) {
                let arg = (j + 1) as f64 * PI * 2.0 / dm;
                *w = 0.355768 - 0.487396 * arg.cos() + 0.144232 * (arg * 2.0).cos()
                    - 0.012604 * (arg * 3.0).cos();
            }
        }
        Window::KaiserBessel => {
            for (j, w) in win.iter_mut().enumerate().take(m / 2 + 1) {
                let arg = (j + 1) as f64 * PI / dm;
                *w = 0.402 - 0.498 * (arg * 2.0).cos() + 0.098 * (arg * 4.0).cos()
                    + 0.001 * (arg * 6.0).cos();
            }
        }
        Window::Trapezoid => {
            let mut k = m / 2;
            if m % 2 != 0 {
                k += 1;
            }
            for (j, w) in win.iter_mut().enumerate().take(k) {
                *w = (j + 1) as f64 / k as f64;
            }
        }
        Window::Gauss => {
            for (j, w) in win.iter_mut().enumerate().take(half) {
                let arg = ((j + 1) as f64 - dm / 2.0) / (dm / 2.0) * 2.7183;
                *w = (-(arg * arg)).exp();
            }
        }
    }

    // Fold the first half onto the tail to make the window symmetric.
    for j in 0..half {
        win[n - j - 1] = win[j];
    }
    win
}

/// Design a windowed-sinc low-pass filter.
///
/// The prototype is `omega_c * sinc(omega_c * (j - (N-1)/2) * pi)` with
/// `omega_c = 2 * cutoff / sample_rate`, evaluated per tap and shaped by
/// the chosen window.
pub fn low_pass(
    num_taps: usize,
    window: Window,
    beta: f64,
    sample_rate: f64,
    cutoff_hz: f64,
) -> Result<Vec<f32>> {
    if num_taps == 0 || num_taps > MAX_TAPS {
        return Err(Error::InvalidParameter(format!(
            "tap count {} outside 1..={}",
            num_taps, MAX_TAPS
        )));
    }
    if cutoff_hz <= 0.0 || cutoff_hz * 2.0 > sample_rate {
        return Err(Error::InvalidParameter(format!(
            "cutoff {} Hz not below Nyquist for {} Hz sample rate",
            cutoff_hz, sample_rate
        )));
    }

    let omega_c = 2.0 * cutoff_hz / sample_rate;
    let centre = (num_taps as f64 - 1.0) / 2.0;
    let mut taps: Vec<f64> = (0..num_taps)
        .map(|j| {
            let arg = j as f64 - centre;
            omega_c * sinc(omega_c * arg * PI)
        })
        .collect();

    let win = window_coefficients(window, num_taps, beta);
    for (tap, w) in taps.iter_mut().zip(&win) {
        *tap *= w;
    }

    Ok(taps.into_iter().map(|t| t as f32).collect())
}

/// Single-rail FIR filter with a circular delay line.
///
/// For complex IQ, run one instance per rail.
#[derive(Debug, Clone)]
pub struct FirFilter {
    taps: Vec<f32>,
    delay: Vec<f32>,
    ptr: usize,
}

impl FirFilter {
    pub fn new(taps: Vec<f32>) -> Result<FirFilter> {
        if taps.is_empty() || taps.len() > MAX_TAPS {
            return Err(Error::InvalidParameter(format!(
                "tap count {} outside 1..={}",
                taps.len(),
                MAX_TAPS
            )));
        }
        let delay = vec![0.0; taps.len()];
        Ok(FirFilter { taps, delay, ptr: 0 })
    }

    /// Push one sample through the filter.
    pub fn process(&mut self, sample: f32) -> f32 {
        self.delay[self.ptr] = sample;
        let mut acc = 0.0;
        let mut idx = self.ptr;
        for &tap in &self.taps {
            acc += tap * self.delay[idx];
            idx = if idx == 0 { self.delay.len() - 1 } else { idx - 1 };
        }
        self.ptr = (self.ptr + 1) % self.delay.len();
        acc
    }

    /// Clear the delay line.
    pub fn reset(&mut self) {
        self.delay.fill(0.0);
        self.ptr = 0;
    }

    pub fn taps(&self) -> &[f32] {
        &self.taps
    }
}
