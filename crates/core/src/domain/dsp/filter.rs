//! State-variable filter used to shape the detector sidechain
//!
//! Topology-preserving transform (trapezoidal integrators), which stays
//! stable for any positive cutoff below Nyquist and keeps its integrator
//! state meaningful while the cutoff is being modulated. Retuning only
//! recomputes coefficients; the two integrators per channel are never reset
//! by a parameter change, so sweeping the cutoff does not click.

use super::{db_to_gain, flush_denormal, params};
use crate::domain::audio::Channel;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Response of a filter instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMode {
    LowPass,
    HighPass,
}

/// Pre-computed TPT coefficients
#[derive(Debug, Clone, Copy, PartialEq)]
struct SvfCoeffs {
    /// Damping, 1/Q
    k: f32,
    a1: f32,
    a2: f32,
    a3: f32,
}

impl SvfCoeffs {
    fn new(sample_rate: f32, cutoff: f32, resonance: f32) -> Self {
        let g = (std::f32::consts::PI * cutoff / sample_rate).tan();
        let k = 1.0 / resonance;
        let a1 = 1.0 / (1.0 + g * (g + k));
        let a2 = g * a1;
        let a3 = g * a2;
        Self { k, a1, a2, a3 }
    }
}

/// Integrator state of one channel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SvfState {
    ic1eq: f32,
    ic2eq: f32,
}

/// Two-channel state-variable filter
#[derive(Debug, Clone, PartialEq)]
pub struct SvfFilter {
    mode: FilterMode,
    sample_rate: f32,
    cutoff: f32,
    resonance: f32,
    gain_db: f32,
    output_gain: f32,
    coeffs: SvfCoeffs,
    states: [SvfState; 2],
}

impl SvfFilter {
    /// Create a filter for the given sample rate
    pub fn new(mode: FilterMode, sample_rate: f32, cutoff: f32, resonance: f32) -> Self {
        let mut filter = Self {
            mode,
            sample_rate,
            cutoff,
            resonance,
            gain_db: 0.0,
            output_gain: 1.0,
            coeffs: SvfCoeffs::new(sample_rate, params::CUTOFF_MIN, params::RESONANCE_DEFAULT),
            states: [SvfState::default(); 2],
        };
        filter.set_filter(mode, cutoff, resonance, 0.0);
        filter
    }

    /// Low-pass instance with the default resonance
    pub fn low_pass(sample_rate: f32, cutoff: f32) -> Self {
        Self::new(FilterMode::LowPass, sample_rate, cutoff, params::RESONANCE_DEFAULT)
    }

    /// High-pass instance with the default resonance
    pub fn high_pass(sample_rate: f32, cutoff: f32) -> Self {
        Self::new(FilterMode::HighPass, sample_rate, cutoff, params::RESONANCE_DEFAULT)
    }

    /// Configure mode, cutoff, resonance and pass-band gain in one go
    pub fn set_filter(&mut self, mode: FilterMode, cutoff: f32, resonance: f32, gain_db: f32) {
        self.mode = mode;
        self.resonance = resonance.clamp(params::RESONANCE_MIN, params::RESONANCE_MAX);
        self.gain_db = gain_db;
        self.output_gain = db_to_gain(gain_db);
        self.cutoff = self.clamp_cutoff(cutoff);
        self.update_coefficients();
        trace!(
            "SVF configured: {:?} {:.1}Hz Q={:.3} {:.1}dB",
            self.mode,
            self.cutoff,
            self.resonance,
            self.gain_db
        );
    }

    /// Change the sample rate; integrator state is kept
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.cutoff = self.clamp_cutoff(self.cutoff);
        self.update_coefficients();
    }

    /// Retune the cutoff without touching integrator state
    #[inline]
    pub fn set_cutoff_freq(&mut self, cutoff: f32) {
        let cutoff = self.clamp_cutoff(cutoff);
        if cutoff != self.cutoff {
            self.cutoff = cutoff;
            self.update_coefficients();
        }
    }

    /// Change the resonance (Q) without touching integrator state
    pub fn set_resonance(&mut self, resonance: f32) {
        self.resonance = resonance.clamp(params::RESONANCE_MIN, params::RESONANCE_MAX);
        self.update_coefficients();
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    pub fn resonance(&self) -> f32 {
        self.resonance
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Highest cutoff accepted at the current sample rate
    pub fn max_cutoff(&self) -> f32 {
        0.5 * self.sample_rate * params::NYQUIST_MARGIN
    }

    fn clamp_cutoff(&self, cutoff: f32) -> f32 {
        let upper = self.max_cutoff().max(params::CUTOFF_MIN);
        if cutoff.is_nan() {
            params::CUTOFF_MIN
        } else {
            cutoff.clamp(params::CUTOFF_MIN, upper)
        }
    }

    fn update_coefficients(&mut self) {
        self.coeffs = SvfCoeffs::new(self.sample_rate, self.cutoff, self.resonance);
    }

    /// Filter one sample of `channel`
    #[inline]
    pub fn process_audio_sample(&mut self, sample: f32, channel: Channel) -> f32 {
        let SvfCoeffs { k, a1, a2, a3 } = self.coeffs;
        let state = &mut self.states[channel.index()];

        let v3 = sample - state.ic2eq;
        let v1 = a1 * state.ic1eq + a2 * v3;
        let v2 = state.ic2eq + a2 * state.ic1eq + a3 * v3;
        state.ic1eq = flush_denormal(2.0 * v1 - state.ic1eq);
        state.ic2eq = flush_denormal(2.0 * v2 - state.ic2eq);

        let out = match self.mode {
            FilterMode::LowPass => v2,
            FilterMode::HighPass => sample - k * v1 - v2,
        };
        out * self.output_gain
    }

    /// Filter a mono buffer in place on one channel's state
    pub fn process(&mut self, buffer: &mut [f32], channel: Channel) {
        for sample in buffer.iter_mut() {
            *sample = self.process_audio_sample(*sample, channel);
        }
    }

    /// Clear both channels' integrators
    pub fn reset(&mut self) {
        self.states = [SvfState::default(); 2];
    }
}
