//! Digital signal processing for the compressor
//!
//! This module provides the building blocks of the processing chain:
//! - One-pole parameter smoothers
//! - State-variable filters for the detector sidechain
//! - Metering envelope followers
//! - The stereo-linked compressor engine with hold
//! - The per-sample signal router that ties them together
//!
//! All stages are designed for:
//! - Zero allocations in the hot path
//! - Sample-by-sample processing with no lookahead
//! - Continuous parameter modulation without clicks

pub mod compressor;
pub mod envelope;
pub mod filter;
pub mod meter;
pub mod router;
pub mod smoother;

pub use compressor::{CompressorEngine, GainCurve};
pub use envelope::{DetectionMode, EnvelopeFollower};
pub use filter::{FilterMode, SvfFilter};
pub use meter::{MeterFrame, MeterSink};
pub use router::SignalRouter;
pub use smoother::Smoother;

/// Parameter constraints for DSP stages
///
/// The core clamps to these ranges on its own so that a misbehaving caller
/// can never push a stage into an unstable or degenerate state.
pub mod params {
    /// Lowest level the detector reports; silence sits here
    pub const DETECTOR_FLOOR_DB: f32 = -96.0;

    /// Deepest gain reduction the engine will ever apply
    pub const GAIN_REDUCTION_FLOOR_DB: f32 = -80.0;

    /// Compressor ratio range (1:1 = no compression)
    pub const RATIO_MIN: f32 = 1.0;
    pub const RATIO_MAX: f32 = 100.0;

    /// Knee is a fraction of `KNEE_SPAN_DB`
    pub const KNEE_MIN: f32 = 0.0;
    pub const KNEE_MAX: f32 = 1.0;
    pub const KNEE_SPAN_DB: f32 = 20.0;

    /// Filter cutoff range (Hz); the upper bound is further limited by Nyquist
    pub const CUTOFF_MIN: f32 = 20.0;
    pub const CUTOFF_MAX: f32 = 20_000.0;
    pub const NYQUIST_MARGIN: f32 = 0.999;

    /// Filter resonance (Q) range
    pub const RESONANCE_MIN: f32 = 0.5;
    pub const RESONANCE_MAX: f32 = 10.0;
    pub const RESONANCE_DEFAULT: f32 = 0.707;

    /// Default time constant for control smoothing (ms)
    pub const SMOOTHING_MS: f32 = 5.0;

    /// Magnitudes below this are flushed to zero in recursive state
    pub const DENORMAL_THRESHOLD: f32 = 1.0e-15;
}

/// Convert decibels to linear gain
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, floored at `DETECTOR_FLOOR_DB`
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    let magnitude = gain.abs();
    if magnitude <= 0.0 {
        params::DETECTOR_FLOOR_DB
    } else {
        (20.0 * magnitude.log10()).max(params::DETECTOR_FLOOR_DB)
    }
}

/// Flush values too small to matter so recursive state never goes subnormal
#[inline]
pub fn flush_denormal(value: f32) -> f32 {
    if value.abs() < params::DENORMAL_THRESHOLD {
        0.0
    } else {
        value
    }
}

/// One-pole decay coefficient for a time constant in milliseconds
///
/// A non-positive time constant yields 0, i.e. the state jumps straight to
/// its target.
#[inline]
pub fn time_constant_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let samples = time_ms * 0.001 * sample_rate;
    if samples > 0.0 {
        (-1.0 / samples).exp()
    } else {
        0.0
    }
}

/// Fast arctangent approximation valid over the whole real line
///
/// Uses the cubic approximation on [-1, 1] and the identity
/// `atan(x) = ±π/2 − atan(1/x)` outside it. Odd, monotonic, bounded by π/2,
/// max error ≈ 0.0015 rad.
#[inline]
pub fn atan_approx(x: f32) -> f32 {
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    #[inline]
    fn inner(x: f32) -> f32 {
        let a = x.abs();
        FRAC_PI_4 * x - x * (a - 1.0) * (0.2447 + 0.0663 * a)
    }

    if x.abs() <= 1.0 {
        inner(x)
    } else {
        FRAC_PI_2.copysign(x) - inner(1.0 / x)
    }
}
