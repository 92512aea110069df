//! One-pole exponential smoothing of control values
//!
//! Every user-facing control that multiplies into the audio path goes through
//! a [`Smoother`] so that automation or UI jumps never land as a step in the
//! signal. The smoother does no bounds checking; callers clamp targets.

use super::{flush_denormal, time_constant_coeff};
use tracing::trace;

/// Exponential one-pole smoother
///
/// `value = target + a * (value - target)` with
/// `a = exp(-1 / (time_ms * 0.001 * sample_rate))`.
#[derive(Debug, Clone, PartialEq)]
pub struct Smoother {
    value: f32,
    coeff: f32,
    time_ms: f32,
    sample_rate: f32,
}

impl Smoother {
    /// Create a smoother resting at `initial`
    pub fn new(time_ms: f32, sample_rate: f32, initial: f32) -> Self {
        let mut smoother = Self {
            value: initial,
            coeff: 0.0,
            time_ms,
            sample_rate,
        };
        smoother.init(time_ms, sample_rate);
        smoother
    }

    /// Reconfigure the time constant and sample rate
    ///
    /// Only the coefficient is recomputed; the current value is kept so a
    /// sample-rate change does not make the control jump.
    pub fn init(&mut self, time_ms: f32, sample_rate: f32) {
        self.time_ms = time_ms;
        self.sample_rate = sample_rate;
        self.coeff = time_constant_coeff(time_ms, sample_rate);
        trace!(time_ms, sample_rate, coeff = self.coeff, "Smoother initialised");
    }

    /// Advance one sample toward `target` and return the smoothed value
    #[inline]
    pub fn process(&mut self, target: f32) -> f32 {
        self.value = target + flush_denormal(self.coeff * (self.value - target));
        self.value
    }

    /// Jump straight to `value` without smoothing
    pub fn set_value(&mut self, value: f32) {
        self.value = value;
    }

    /// Current smoothed value
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Time constant in milliseconds
    pub fn time_ms(&self) -> f32 {
        self.time_ms
    }

    /// Sample rate the coefficient was computed for
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}
