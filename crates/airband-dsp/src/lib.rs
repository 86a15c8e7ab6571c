//! Signal processing blocks for the airband receiver chain.
//!
//! Everything here is synchronous and allocation-light: blocks hold
//! their own state and are driven one sample or one frame at a time by
//! the client's stream tasks.

pub mod agc;
pub mod demod;
pub mod fir;
pub mod iq;
pub mod pll;
pub mod spectral;

pub use agc::{l2_norm, Agc, EnergyEstimator, PidController};
pub use demod::{Discriminator, QuadratureDemod};
pub use fir::{low_pass, FirFilter, Window, MAX_TAPS};
pub use iq::{decode_fft_u8, decode_iq_u8, normalize_u8};
pub use pll::{PhaseLockLoop, PllOutput};
pub use spectral::SpectralPeakDetector;
