//! Envelope follower for level metering
//!
//! Feeds the visualization side channel only; the compressor runs its own
//! detector with hold and never reads these levels.

use super::{flush_denormal, time_constant_coeff};
use serde::{Deserialize, Serialize};

/// How the follower measures the incoming signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionMode {
    /// Rectified sample value
    Peak,
    /// Root of a running mean square over `rms_window_ms`
    Rms,
}

/// Peak/RMS level follower with independent attack and release
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeFollower {
    mode: DetectionMode,
    attack_ms: f32,
    release_ms: f32,
    rms_window_ms: f32,
    sample_rate: f32,
    attack_coeff: f32,
    release_coeff: f32,
    rms_coeff: f32,
    mean_square: f32,
    level: f32,
}

impl EnvelopeFollower {
    pub fn new(
        mode: DetectionMode,
        attack_ms: f32,
        release_ms: f32,
        rms_window_ms: f32,
        sample_rate: f32,
    ) -> Self {
        let mut follower = Self {
            mode,
            attack_ms,
            release_ms,
            rms_window_ms,
            sample_rate,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            rms_coeff: 0.0,
            mean_square: 0.0,
            level: 0.0,
        };
        follower.init(mode, attack_ms, release_ms, rms_window_ms, sample_rate);
        follower
    }

    /// Metering defaults: peak, instant attack, 75 ms release
    pub fn meter(sample_rate: f32) -> Self {
        Self::new(DetectionMode::Peak, 0.0, 75.0, 60.0, sample_rate)
    }

    /// Reconfigure timing; the running level is kept
    pub fn init(
        &mut self,
        mode: DetectionMode,
        attack_ms: f32,
        release_ms: f32,
        rms_window_ms: f32,
        sample_rate: f32,
    ) {
        self.mode = mode;
        self.attack_ms = attack_ms.max(0.0);
        self.release_ms = release_ms.max(0.0);
        self.rms_window_ms = rms_window_ms.max(0.0);
        self.sample_rate = sample_rate;
        self.attack_coeff = time_constant_coeff(self.attack_ms, sample_rate);
        self.release_coeff = time_constant_coeff(self.release_ms, sample_rate);
        self.rms_coeff = time_constant_coeff(self.rms_window_ms, sample_rate);
    }

    /// Change the sample rate, keeping every time constant
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.init(
            self.mode,
            self.attack_ms,
            self.release_ms,
            self.rms_window_ms,
            sample_rate,
        );
    }

    /// Feed one sample, returning the linear level
    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let input = match self.mode {
            DetectionMode::Peak => sample.abs(),
            DetectionMode::Rms => {
                let square = sample * sample;
                self.mean_square =
                    flush_denormal(square + self.rms_coeff * (self.mean_square - square));
                self.mean_square.sqrt()
            }
        };

        let coeff = if input > self.level {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.level = flush_denormal(input + coeff * (self.level - input));
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    pub fn reset(&mut self) {
        self.mean_square = 0.0;
        self.level = 0.0;
    }
}
