//! Stereo-linked compressor engine
//!
//! The detector takes the louder of the two channels (max of absolute
//! values), so both sides always receive the same gain reduction and the
//! stereo image never shifts. The envelope is a decoupled peak detector in
//! the dB domain:
//!
//! 1. release stage: new peaks are captured instantly and re-arm the hold
//!    counter; once hold has expired the stage falls with the release time
//!    constant
//! 2. attack stage: one-pole smoothing of the release stage output with the
//!    attack time constant
//!
//! The smoothed envelope is mapped through the static [`GainCurve`].

use super::{gain_to_db, params, time_constant_coeff};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Static gain-reduction curve
///
/// Maps a detector level (dB) to a gain reduction (dB, always ≤ 0). Kept as
/// a plain value so a plotting collaborator can evaluate it without touching
/// the running engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainCurve {
    pub threshold_db: f32,
    pub ratio: f32,
    /// Full knee width in dB
    pub knee_db: f32,
}

impl GainCurve {
    /// Build a curve from a knee fraction in [0, 1]
    pub fn new(threshold_db: f32, ratio: f32, knee: f32) -> Self {
        let knee = knee.clamp(params::KNEE_MIN, params::KNEE_MAX);
        Self {
            threshold_db,
            ratio: ratio.max(params::RATIO_MIN),
            knee_db: knee * params::KNEE_SPAN_DB,
        }
    }

    /// Gain reduction in dB for a detector level in dB
    #[inline]
    pub fn gain_reduction_db(&self, level_db: f32) -> f32 {
        let slope = 1.0 / self.ratio - 1.0;
        let overshoot = level_db - self.threshold_db;
        let half_knee = 0.5 * self.knee_db;

        let reduction = if overshoot <= -half_knee {
            0.0
        } else if overshoot < half_knee {
            // Quadratic blend; matches both neighbours in value and slope
            let x = overshoot + half_knee;
            slope * x * x / (2.0 * self.knee_db)
        } else {
            slope * overshoot
        };

        reduction.clamp(params::GAIN_REDUCTION_FLOOR_DB, 0.0)
    }

    /// Output level for a given input level, both in dB
    pub fn output_db(&self, level_db: f32) -> f32 {
        level_db + self.gain_reduction_db(level_db)
    }

    /// Lower edge of the knee
    pub fn knee_start_db(&self) -> f32 {
        self.threshold_db - 0.5 * self.knee_db
    }

    /// Upper edge of the knee
    pub fn knee_end_db(&self) -> f32 {
        self.threshold_db + 0.5 * self.knee_db
    }
}

/// Gain-reduction engine with attack, hold and release
#[derive(Debug, Clone, PartialEq)]
pub struct CompressorEngine {
    sample_rate: f32,
    // Parameters
    threshold_db: f32,
    ratio: f32,
    knee: f32,
    attack_ms: f32,
    hold_ms: f32,
    release_ms: f32,
    // Derived
    curve: GainCurve,
    attack_coeff: f32,
    release_coeff: f32,
    hold_samples: u32,
    // Detector state
    peak_db: f32,
    envelope_db: f32,
    hold_remaining: u32,
    gain_reduction_db: f32,
}

impl CompressorEngine {
    /// Create an engine at 0 dB threshold
    pub fn new(
        attack_ms: f32,
        release_ms: f32,
        hold_ms: f32,
        ratio: f32,
        knee: f32,
        sample_rate: f32,
    ) -> Self {
        let mut engine = Self {
            sample_rate,
            threshold_db: 0.0,
            ratio: params::RATIO_MIN,
            knee: 0.0,
            attack_ms: 0.0,
            hold_ms: 0.0,
            release_ms: 0.0,
            curve: GainCurve::new(0.0, params::RATIO_MIN, 0.0),
            attack_coeff: 0.0,
            release_coeff: 0.0,
            hold_samples: 0,
            peak_db: params::DETECTOR_FLOOR_DB,
            envelope_db: params::DETECTOR_FLOOR_DB,
            hold_remaining: 0,
            gain_reduction_db: 0.0,
        };
        engine.init(attack_ms, release_ms, hold_ms, ratio, knee, sample_rate);
        engine
    }

    /// Reconfigure timing and curve for a sample rate
    ///
    /// The running envelope is kept; call [`reset`](Self::reset) to clear it.
    pub fn init(
        &mut self,
        attack_ms: f32,
        release_ms: f32,
        hold_ms: f32,
        ratio: f32,
        knee: f32,
        sample_rate: f32,
    ) {
        self.sample_rate = sample_rate;
        self.attack_ms = attack_ms.max(0.0);
        self.release_ms = release_ms.max(0.0);
        self.hold_ms = hold_ms.max(0.0);
        self.ratio = ratio.max(params::RATIO_MIN);
        self.knee = knee.clamp(params::KNEE_MIN, params::KNEE_MAX);
        self.update_timing();
        self.update_curve();
        debug!(
            sample_rate,
            attack_ms = self.attack_ms,
            release_ms = self.release_ms,
            hold_ms = self.hold_ms,
            ratio = self.ratio,
            knee = self.knee,
            "Compressor initialised"
        );
    }

    /// Set the attack time in milliseconds
    #[inline]
    pub fn set_attack(&mut self, attack_ms: f32) {
        let attack_ms = attack_ms.max(0.0);
        if attack_ms != self.attack_ms {
            self.attack_ms = attack_ms;
            self.attack_coeff = time_constant_coeff(attack_ms, self.sample_rate);
        }
    }

    /// Set the release time in milliseconds
    #[inline]
    pub fn set_release(&mut self, release_ms: f32) {
        let release_ms = release_ms.max(0.0);
        if release_ms != self.release_ms {
            self.release_ms = release_ms;
            self.release_coeff = time_constant_coeff(release_ms, self.sample_rate);
        }
    }

    /// Set the hold time in milliseconds
    ///
    /// A hold already running keeps its remaining count.
    #[inline]
    pub fn set_hold(&mut self, hold_ms: f32) {
        let hold_ms = hold_ms.max(0.0);
        if hold_ms != self.hold_ms {
            self.hold_ms = hold_ms;
            self.hold_samples = Self::ms_to_samples(hold_ms, self.sample_rate);
        }
    }

    /// Set the compression ratio (clamped to ≥ 1)
    #[inline]
    pub fn set_ratio(&mut self, ratio: f32) {
        let ratio = ratio.max(params::RATIO_MIN);
        if ratio != self.ratio {
            self.ratio = ratio;
            self.update_curve();
        }
    }

    /// Set the threshold in dB
    #[inline]
    pub fn set_threshold(&mut self, threshold_db: f32) {
        if threshold_db != self.threshold_db {
            self.threshold_db = threshold_db;
            self.update_curve();
        }
    }

    /// Set the knee as a fraction of `KNEE_SPAN_DB` (clamped to [0, 1])
    #[inline]
    pub fn set_knee(&mut self, knee: f32) {
        let knee = knee.clamp(params::KNEE_MIN, params::KNEE_MAX);
        if knee != self.knee {
            self.knee = knee;
            self.update_curve();
        }
    }

    pub fn attack(&self) -> f32 {
        self.attack_ms
    }

    pub fn release(&self) -> f32 {
        self.release_ms
    }

    pub fn hold(&self) -> f32 {
        self.hold_ms
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn threshold(&self) -> f32 {
        self.threshold_db
    }

    pub fn knee(&self) -> f32 {
        self.knee
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Current static curve
    pub fn curve(&self) -> GainCurve {
        self.curve
    }

    /// Smoothed detector level in dB
    pub fn envelope_db(&self) -> f32 {
        self.envelope_db
    }

    /// Gain reduction produced by the last processed sample
    pub fn gain_reduction_db(&self) -> f32 {
        self.gain_reduction_db
    }

    fn ms_to_samples(ms: f32, sample_rate: f32) -> u32 {
        (ms * 0.001 * sample_rate).round() as u32
    }

    fn update_timing(&mut self) {
        self.attack_coeff = time_constant_coeff(self.attack_ms, self.sample_rate);
        self.release_coeff = time_constant_coeff(self.release_ms, self.sample_rate);
        self.hold_samples = Self::ms_to_samples(self.hold_ms, self.sample_rate);
    }

    fn update_curve(&mut self) {
        self.curve = GainCurve::new(self.threshold_db, self.ratio, self.knee);
    }

    /// Advance the detector by one stereo frame and return the gain reduction
    ///
    /// The returned value is ≤ 0 dB and applies to both channels.
    #[inline]
    pub fn process_stereo(&mut self, left: f32, right: f32) -> f32 {
        let level_db = gain_to_db(left.abs().max(right.abs()));

        if level_db >= self.peak_db {
            self.peak_db = level_db;
            self.hold_remaining = self.hold_samples;
        } else if self.hold_remaining > 0 {
            self.hold_remaining -= 1;
        } else {
            self.peak_db = level_db + self.release_coeff * (self.peak_db - level_db);
        }

        // Attack smooths rises only; falls follow the hold/release stage
        self.envelope_db = if self.peak_db > self.envelope_db {
            self.peak_db + self.attack_coeff * (self.envelope_db - self.peak_db)
        } else {
            self.peak_db
        };
        self.gain_reduction_db = self.curve.gain_reduction_db(self.envelope_db);
        self.gain_reduction_db
    }

    /// Return the detector to silence
    pub fn reset(&mut self) {
        self.peak_db = params::DETECTOR_FLOOR_DB;
        self.envelope_db = params::DETECTOR_FLOOR_DB;
        self.hold_remaining = 0;
        self.gain_reduction_db = 0.0;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE_RATE: f32 = 48000.0;

    fn generate_test_signal(samples: usize, frequency: f32, amplitude: f32) -> Vec<f32> {
        (0..samples)
            .map(|i| {
                amplitude * (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE).sin()
            })
            .collect()
    }

    fn engine(threshold_db: f32, ratio: f32, knee: f32) -> CompressorEngine {
        let mut comp = CompressorEngine::new(10.0, 250.0, 0.0, ratio, knee, SAMPLE_RATE);
        comp.set_threshold(threshold_db);
        comp
    }

    fn ms(ms: f32) -> usize {
        (ms * 0.001 * SAMPLE_RATE) as usize
    }

    // -------------------------------------------------------------------------
    // Gain Curve Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_curve_hard_knee() {
        let curve = GainCurve::new(-10.0, 4.0, 0.0);
        assert_eq!(curve.knee_db, 0.0);
        assert_eq!(curve.gain_reduction_db(-10.0), 0.0);
        assert_eq!(curve.gain_reduction_db(-30.0), 0.0);
        assert!((curve.gain_reduction_db(-2.0) + 6.0).abs() < 1e-5);
    }

    #[test]
    fn test_curve_knee_midpoint() {
        // At the threshold the quadratic gives slope * W / 8
        let curve = GainCurve::new(-20.0, 2.0, 0.5);
        assert_eq!(curve.knee_db, 10.0);
        let expected = (0.5 - 1.0) * 10.0 / 8.0;
        assert!((curve.gain_reduction_db(-20.0) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_curve_clamps_inputs() {
        let curve = GainCurve::new(-10.0, 0.25, 3.0);
        assert_eq!(curve.ratio, params::RATIO_MIN);
        assert_eq!(curve.knee_db, params::KNEE_SPAN_DB);
    }

    #[test]
    fn test_curve_reduction_floor() {
        let curve = GainCurve::new(-90.0, 100.0, 0.0);
        assert_eq!(curve.gain_reduction_db(0.0), params::GAIN_REDUCTION_FLOOR_DB);
    }

    #[test]
    fn test_curve_output_db() {
        let curve = GainCurve::new(-4.0, 4.0, 0.0);
        assert!((curve.output_db(0.0) - (-3.0)).abs() < 1e-5);
        assert_eq!(curve.knee_start_db(), -4.0);
        assert_eq!(curve.knee_end_db(), -4.0);
    }

    proptest! {
        #[test]
        fn prop_unity_ratio_never_compresses(
            threshold in -60.0f32..0.0,
            knee in 0.0f32..=1.0,
            level in -96.0f32..24.0,
        ) {
            let curve = GainCurve::new(threshold, 1.0, knee);
            prop_assert_eq!(curve.gain_reduction_db(level), 0.0);
        }

        #[test]
        fn prop_below_knee_is_untouched(
            threshold in -60.0f32..0.0,
            ratio in 1.0f32..100.0,
            knee in 0.0f32..=1.0,
            below in 0.001f32..60.0,
        ) {
            let curve = GainCurve::new(threshold, ratio, knee);
            let level = curve.knee_start_db() - below;
            prop_assert_eq!(curve.gain_reduction_db(level), 0.0);
        }

        #[test]
        fn prop_above_knee_follows_ratio(
            threshold in -60.0f32..0.0,
            ratio in 1.0f32..100.0,
            knee in 0.0f32..=1.0,
            above in 0.0f32..12.0,
        ) {
            let curve = GainCurve::new(threshold, ratio, knee);
            let level = curve.knee_end_db() + above;
            let expected = (threshold - level) * (1.0 - 1.0 / ratio);
            prop_assert!((curve.gain_reduction_db(level) - expected).abs() < 1e-3);
        }

        #[test]
        fn prop_knee_is_continuous(
            threshold in -60.0f32..0.0,
            ratio in 1.0f32..100.0,
            knee in 0.01f32..=1.0,
        ) {
            let curve = GainCurve::new(threshold, ratio, knee);
            let eps = 1e-3;
            for edge in [curve.knee_start_db(), curve.knee_end_db()] {
                let below = curve.gain_reduction_db(edge - eps);
                let above = curve.gain_reduction_db(edge + eps);
                // Slope is at most 1 dB/dB, so no jump beyond 2 * eps
                prop_assert!((above - below).abs() <= 2.0 * eps + 1e-4);
            }
        }

        #[test]
        fn prop_never_boosts(
            threshold in -60.0f32..0.0,
            ratio in 1.0f32..100.0,
            knee in 0.0f32..=1.0,
            level in -96.0f32..24.0,
        ) {
            let curve = GainCurve::new(threshold, ratio, knee);
            prop_assert!(curve.gain_reduction_db(level) <= 0.0);
        }
    }

    // -------------------------------------------------------------------------
    // Engine Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_engine_creation() {
        let comp = CompressorEngine::new(10.0, 250.0, 0.0, 4.0, 0.5, SAMPLE_RATE);
        assert_eq!(comp.attack(), 10.0);
        assert_eq!(comp.release(), 250.0);
        assert_eq!(comp.hold(), 0.0);
        assert_eq!(comp.ratio(), 4.0);
        assert_eq!(comp.knee(), 0.5);
        assert_eq!(comp.envelope_db(), params::DETECTOR_FLOOR_DB);
        assert_eq!(comp.gain_reduction_db(), 0.0);
    }

    #[test]
    fn test_engine_param_limits() {
        let mut comp = engine(-10.0, 4.0, 0.5);

        comp.set_ratio(0.5);
        assert_eq!(comp.ratio(), params::RATIO_MIN);

        comp.set_knee(2.0);
        assert_eq!(comp.knee(), params::KNEE_MAX);
        comp.set_knee(-1.0);
        assert_eq!(comp.knee(), params::KNEE_MIN);

        comp.set_attack(-5.0);
        comp.set_release(-5.0);
        comp.set_hold(-5.0);
        assert_eq!(comp.attack(), 0.0);
        assert_eq!(comp.release(), 0.0);
        assert_eq!(comp.hold(), 0.0);
    }

    #[test]
    fn test_steady_state_sine_scenario() {
        let mut comp = CompressorEngine::new(10.0, 250.0, 0.0, 4.0, 0.0, SAMPLE_RATE);
        comp.set_threshold(-4.0);

        let mut gr = 0.0;
        for sample in generate_test_signal(SAMPLE_RATE as usize, 1000.0, 1.0) {
            gr = comp.process_stereo(sample, sample);
        }

        assert!((gr - (-3.0)).abs() < 0.05, "gain reduction {gr}");
    }

    #[test]
    fn test_unity_ratio_never_reduces() {
        let mut comp = engine(-40.0, 1.0, 0.5);
        for sample in generate_test_signal(4800, 440.0, 1.0) {
            assert_eq!(comp.process_stereo(sample, -sample), 0.0);
        }
    }

    #[test]
    fn test_quiet_signal_untouched() {
        let mut comp = engine(-10.0, 8.0, 0.5);
        // -40 dB sine stays far below the knee
        for sample in generate_test_signal(4800, 440.0, 0.01) {
            assert_eq!(comp.process_stereo(sample, sample), 0.0);
        }
    }

    #[test]
    fn test_stereo_link_uses_louder_channel() {
        let mut linked = engine(-20.0, 4.0, 0.0);
        let mut mirrored = engine(-20.0, 4.0, 0.0);

        let mut gr_a = 0.0;
        let mut gr_b = 0.0;
        for _ in 0..ms(200.0) {
            gr_a = linked.process_stereo(0.9, 0.01);
            gr_b = mirrored.process_stereo(0.01, -0.9);
        }

        assert_eq!(gr_a, gr_b);
        assert!(gr_a < -10.0);
    }

    #[test]
    fn test_attack_time_shapes_onset() {
        let mut fast = CompressorEngine::new(1.0, 250.0, 0.0, 4.0, 0.0, SAMPLE_RATE);
        let mut slow = CompressorEngine::new(50.0, 250.0, 0.0, 4.0, 0.0, SAMPLE_RATE);
        fast.set_threshold(-20.0);
        slow.set_threshold(-20.0);

        let mut gr_fast = 0.0;
        let mut gr_slow = 0.0;
        for _ in 0..ms(5.0) {
            gr_fast = fast.process_stereo(1.0, 1.0);
            gr_slow = slow.process_stereo(1.0, 1.0);
        }

        assert!(gr_fast < gr_slow);
    }

    #[test]
    fn test_release_recovers_toward_zero() {
        let mut comp = CompressorEngine::new(1.0, 50.0, 0.0, 4.0, 0.0, SAMPLE_RATE);
        comp.set_threshold(-20.0);
        for _ in 0..ms(100.0) {
            comp.process_stereo(1.0, 1.0);
        }
        let compressed = comp.gain_reduction_db();

        let mut gr = compressed;
        for _ in 0..ms(500.0) {
            gr = comp.process_stereo(0.0, 0.0);
        }

        assert!(compressed < -14.0);
        assert_eq!(gr, 0.0);
    }

    #[test]
    fn test_release_independent_of_attack() {
        let recovered = |attack_ms: f32| {
            let mut comp = CompressorEngine::new(attack_ms, 10.0, 0.0, 4.0, 0.0, SAMPLE_RATE);
            comp.set_threshold(-20.0);
            for _ in 0..ms(2000.0) {
                comp.process_stereo(1.0, 1.0);
            }
            assert!(comp.gain_reduction_db() < -14.9);

            let mut gr = 0.0;
            for _ in 0..ms(50.0) {
                gr = comp.process_stereo(0.0, 0.0);
            }
            gr
        };

        // Five release time constants leave the detector near the floor
        let fast = recovered(1.0);
        let slow = recovered(250.0);
        assert_eq!(fast, 0.0);
        assert_eq!(slow, 0.0);
    }

    #[test]
    fn test_hold_sustains_reduction() {
        let hold_ms = 50.0;
        let mut comp = CompressorEngine::new(1.0, 20.0, hold_ms, 4.0, 0.0, SAMPLE_RATE);
        comp.set_threshold(-20.0);

        for _ in 0..ms(100.0) {
            comp.process_stereo(1.0, 1.0);
        }
        let at_drop = comp.gain_reduction_db();
        assert!(at_drop < -14.0);

        // Reduction must not move toward 0 dB while hold runs
        for _ in 0..ms(hold_ms) {
            let gr = comp.process_stereo(0.0, 0.0);
            assert!(gr <= at_drop + 1e-4, "gr {gr} released during hold");
        }

        // Afterwards the release takes over
        let mut gr = at_drop;
        for _ in 0..ms(20.0) {
            gr = comp.process_stereo(0.0, 0.0);
        }
        assert!(gr > at_drop + 1.0);
    }

    #[test]
    fn test_zero_hold_releases_immediately() {
        let mut comp = CompressorEngine::new(1.0, 20.0, 0.0, 4.0, 0.0, SAMPLE_RATE);
        comp.set_threshold(-20.0);
        for _ in 0..ms(100.0) {
            comp.process_stereo(1.0, 1.0);
        }
        let at_drop = comp.gain_reduction_db();

        let mut gr = at_drop;
        for _ in 0..ms(10.0) {
            gr = comp.process_stereo(0.0, 0.0);
        }
        assert!(gr > at_drop + 1.0);
    }

    #[test]
    fn test_setters_keep_envelope() {
        let mut comp = engine(-20.0, 4.0, 0.0);
        for _ in 0..ms(50.0) {
            comp.process_stereo(0.5, 0.5);
        }
        let envelope = comp.envelope_db();

        comp.set_attack(30.0);
        comp.set_release(400.0);
        comp.set_hold(20.0);
        comp.set_ratio(8.0);
        comp.set_threshold(-10.0);
        comp.set_knee(0.3);

        assert_eq!(comp.envelope_db(), envelope);
        assert_eq!(comp.threshold(), -10.0);
    }

    #[test]
    fn test_reset() {
        let mut comp = engine(-20.0, 4.0, 0.0);
        for _ in 0..ms(50.0) {
            comp.process_stereo(1.0, 1.0);
        }
        comp.reset();

        assert_eq!(comp.envelope_db(), params::DETECTOR_FLOOR_DB);
        assert_eq!(comp.process_stereo(0.01, 0.01), 0.0);
    }

    #[test]
    fn test_init_changes_sample_rate() {
        let mut comp = engine(-20.0, 4.0, 0.0);
        comp.init(5.0, 100.0, 10.0, 2.0, 0.25, 96000.0);
        assert_eq!(comp.sample_rate(), 96000.0);
        assert_eq!(comp.ratio(), 2.0);
        assert_eq!(comp.knee(), 0.25);
        // Threshold is not part of init
        assert_eq!(comp.threshold(), -20.0);
    }
}
