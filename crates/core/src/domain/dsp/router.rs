//! Per-sample orchestration of the compressor chain
//!
//! For every frame the router advances all control smoothers, retunes the
//! detector filters and the compressor from the smoothed values, then:
//!
//! 1. keeps a dry copy of the main input
//! 2. in colored mode, soft-saturates the output path above the threshold
//! 3. picks the detector source (main or sidechain) and filters it
//! 4. asks the compressor for the shared gain reduction
//! 5. applies gain reduction and makeup gain to the output path
//! 6. blends dry/wet, or substitutes the audition signal
//!
//! Everything that depends on the sample rate lives in a chain that only
//! exists after [`SignalRouter::prepare`]; processing without it is an error.

use super::compressor::{CompressorEngine, GainCurve};
use super::envelope::EnvelopeFollower;
use super::filter::SvfFilter;
use super::meter::{MeterFrame, MeterSink};
use super::smoother::Smoother;
use super::{atan_approx, db_to_gain, gain_to_db, params};
use crate::domain::audio::{validate_sample_rate, AudioError, Channel, Result};
use crate::domain::config::{EngineConfig, ParameterSettings};
use crate::domain::params::{Mode, ParamId, ParameterSet, ParameterTargets, RoutingConfig};
use tracing::{debug, info};

/// Soft saturation used by the colored mode
///
/// Identity up to `boundary`, then an arctangent shoulder that joins it
/// without a jump and flattens toward `boundary + π/10`.
#[inline]
pub fn waveshape(sample: f32, boundary: f32) -> f32 {
    let magnitude = sample.abs();
    if magnitude <= boundary {
        sample
    } else {
        let excess = magnitude - boundary;
        (boundary + atan_approx(5.0 * excess) / 5.0).copysign(sample)
    }
}

/// One smoother per control that feeds audio-rate math
#[derive(Debug, Clone)]
struct SmootherBank {
    gain: Smoother,
    threshold: Smoother,
    attack: Smoother,
    release: Smoother,
    hold: Smoother,
    ratio: Smoother,
    knee: Smoother,
    mix: Smoother,
    cutoff_hp: Smoother,
    cutoff_lp: Smoother,
}

/// Smoothed control values of one frame
#[derive(Debug, Clone, Copy)]
struct Frame {
    gain_db: f32,
    threshold_db: f32,
    attack_ms: f32,
    release_ms: f32,
    hold_ms: f32,
    ratio: f32,
    knee: f32,
    mix: f32,
    cutoff_hp: f32,
    cutoff_lp: f32,
}

impl SmootherBank {
    fn new(time_ms: f32, sample_rate: f32, targets: &ParameterTargets) -> Self {
        let smoother = |initial: f32| Smoother::new(time_ms, sample_rate, initial);
        Self {
            gain: smoother(targets.gain_db),
            threshold: smoother(targets.threshold_db),
            attack: smoother(targets.attack_ms),
            release: smoother(targets.release_ms),
            hold: smoother(targets.hold_ms),
            ratio: smoother(targets.ratio),
            knee: smoother(targets.knee),
            mix: smoother(targets.mix),
            cutoff_hp: smoother(targets.cutoff_hp),
            cutoff_lp: smoother(targets.cutoff_lp),
        }
    }

    fn all_mut(&mut self) -> [&mut Smoother; 10] {
        [
            &mut self.gain,
            &mut self.threshold,
            &mut self.attack,
            &mut self.release,
            &mut self.hold,
            &mut self.ratio,
            &mut self.knee,
            &mut self.mix,
            &mut self.cutoff_hp,
            &mut self.cutoff_lp,
        ]
    }

    fn init(&mut self, time_ms: f32, sample_rate: f32) {
        for smoother in self.all_mut() {
            smoother.init(time_ms, sample_rate);
        }
    }

    /// Jump every smoother to its target
    fn snap(&mut self, targets: &ParameterTargets) {
        self.gain.set_value(targets.gain_db);
        self.threshold.set_value(targets.threshold_db);
        self.attack.set_value(targets.attack_ms);
        self.release.set_value(targets.release_ms);
        self.hold.set_value(targets.hold_ms);
        self.ratio.set_value(targets.ratio);
        self.knee.set_value(targets.knee);
        self.mix.set_value(targets.mix);
        self.cutoff_hp.set_value(targets.cutoff_hp);
        self.cutoff_lp.set_value(targets.cutoff_lp);
    }

    /// Advance every smoother by one sample, unconditionally
    #[inline]
    fn process(&mut self, targets: &ParameterTargets) -> Frame {
        Frame {
            gain_db: self.gain.process(targets.gain_db),
            threshold_db: self.threshold.process(targets.threshold_db),
            attack_ms: self.attack.process(targets.attack_ms),
            release_ms: self.release.process(targets.release_ms),
            hold_ms: self.hold.process(targets.hold_ms),
            ratio: self.ratio.process(targets.ratio),
            knee: self.knee.process(targets.knee),
            mix: self.mix.process(targets.mix),
            cutoff_hp: self.cutoff_hp.process(targets.cutoff_hp),
            cutoff_lp: self.cutoff_lp.process(targets.cutoff_lp),
        }
    }
}

/// Sample-rate dependent state
#[derive(Debug, Clone)]
struct Chain {
    sample_rate: f32,
    smoothers: SmootherBank,
    high_pass: SvfFilter,
    low_pass: SvfFilter,
    compressor: CompressorEngine,
    input_meter: EnvelopeFollower,
    output_meter: EnvelopeFollower,
    meter_countdown: usize,
}

impl Chain {
    fn new(sample_rate: f32, smoothing_ms: f32, decimation: usize, targets: &ParameterTargets) -> Self {
        let mut compressor = CompressorEngine::new(
            targets.attack_ms,
            targets.release_ms,
            targets.hold_ms,
            targets.ratio,
            targets.knee,
            sample_rate,
        );
        compressor.set_threshold(targets.threshold_db);

        Self {
            sample_rate,
            smoothers: SmootherBank::new(smoothing_ms, sample_rate, targets),
            high_pass: SvfFilter::high_pass(sample_rate, targets.cutoff_hp),
            low_pass: SvfFilter::low_pass(sample_rate, targets.cutoff_lp),
            compressor,
            input_meter: EnvelopeFollower::meter(sample_rate),
            output_meter: EnvelopeFollower::meter(sample_rate),
            meter_countdown: decimation,
        }
    }

    /// Re-derive every time constant; running state is kept
    fn set_sample_rate(&mut self, sample_rate: f32, smoothing_ms: f32) {
        self.sample_rate = sample_rate;
        self.smoothers.init(smoothing_ms, sample_rate);
        self.high_pass.set_sample_rate(sample_rate);
        self.low_pass.set_sample_rate(sample_rate);
        let c = &self.compressor;
        let (attack, release, hold, ratio, knee) =
            (c.attack(), c.release(), c.hold(), c.ratio(), c.knee());
        self.compressor.init(attack, release, hold, ratio, knee, sample_rate);
        self.input_meter.set_sample_rate(sample_rate);
        self.output_meter.set_sample_rate(sample_rate);
    }

    fn reset(&mut self, targets: &ParameterTargets, decimation: usize) {
        self.smoothers.snap(targets);
        self.high_pass.reset();
        self.low_pass.reset();
        self.compressor.reset();
        self.input_meter.reset();
        self.output_meter.reset();
        self.meter_countdown = decimation;
    }
}

/// The compressor's per-sample signal path
pub struct SignalRouter {
    params: ParameterSet,
    smoothing_ms: f32,
    meter_decimation: usize,
    chain: Option<Chain>,
    meter_sink: Option<Box<dyn MeterSink>>,
    curve_revision: u64,
    notified_revision: u64,
    last_meter: MeterFrame,
}

impl Default for SignalRouter {
    fn default() -> Self {
        Self::new(params::SMOOTHING_MS, 32)
    }
}

impl std::fmt::Debug for SignalRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalRouter")
            .field("params", &self.params)
            .field("smoothing_ms", &self.smoothing_ms)
            .field("meter_decimation", &self.meter_decimation)
            .field("sample_rate", &self.sample_rate())
            .field("has_meter_sink", &self.meter_sink.is_some())
            .finish()
    }
}

impl SignalRouter {
    /// Create an unprepared router with default parameter values
    pub fn new(smoothing_ms: f32, meter_decimation: usize) -> Self {
        Self {
            params: ParameterSet::default(),
            smoothing_ms: smoothing_ms.max(0.0),
            meter_decimation: meter_decimation.max(1),
            chain: None,
            meter_sink: None,
            curve_revision: 1,
            notified_revision: 0,
            last_meter: MeterFrame::SILENT,
        }
    }

    /// Create a router from engine settings and initial parameter values
    ///
    /// The router still has to be prepared before processing.
    pub fn from_config(engine: &EngineConfig, settings: &ParameterSettings) -> Self {
        let mut router = Self::new(engine.smoothing_ms, engine.meter_decimation);
        for (id, raw) in settings.changes() {
            router.on_parameter_changed(id, raw);
        }
        router
    }

    /// (Re)initialize every time-constant based stage for `sample_rate`
    ///
    /// The first call builds the chain with smoothers resting on their
    /// targets. Later calls keep smoothed values, filter integrators and the
    /// compressor envelope.
    pub fn prepare(&mut self, sample_rate: f32) -> Result<()> {
        let sample_rate = validate_sample_rate(sample_rate)?;
        match self.chain.as_mut() {
            Some(chain) => chain.set_sample_rate(sample_rate, self.smoothing_ms),
            None => {
                self.chain = Some(Chain::new(
                    sample_rate,
                    self.smoothing_ms,
                    self.meter_decimation,
                    &self.params.targets,
                ));
            }
        }
        info!(sample_rate, smoothing_ms = self.smoothing_ms, "Signal router prepared");
        Ok(())
    }

    /// Clear filter, envelope and meter state and settle every control
    pub fn reset(&mut self) {
        if let Some(chain) = self.chain.as_mut() {
            chain.reset(&self.params.targets, self.meter_decimation);
        }
        self.last_meter = MeterFrame::SILENT;
        debug!("Signal router reset");
    }

    /// Ingest one host parameter value (display units)
    ///
    /// Returns `false` when the value was rejected.
    pub fn on_parameter_changed(&mut self, id: ParamId, raw: f32) -> bool {
        let accepted = self.params.apply(id, raw);
        if accepted && id.affects_curve() {
            self.curve_revision += 1;
        }
        accepted
    }

    /// Register the observer for meter frames and curve changes
    ///
    /// The current curve is announced on the next block.
    pub fn set_meter_sink(&mut self, sink: Box<dyn MeterSink>) {
        self.meter_sink = Some(sink);
        self.notified_revision = 0;
    }

    pub fn take_meter_sink(&mut self) -> Option<Box<dyn MeterSink>> {
        self.meter_sink.take()
    }

    /// Static curve the compressor is heading toward
    pub fn gain_curve(&self) -> GainCurve {
        let targets = &self.params.targets;
        GainCurve::new(targets.threshold_db, targets.ratio, targets.knee)
    }

    /// Increments whenever threshold, ratio or knee change
    pub fn curve_revision(&self) -> u64 {
        self.curve_revision
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    pub fn routing(&self) -> RoutingConfig {
        self.params.routing
    }

    pub fn parameter_value(&self, id: ParamId) -> f32 {
        self.params.value(id)
    }

    /// Sample rate of the prepared chain
    pub fn sample_rate(&self) -> Option<f32> {
        self.chain.as_ref().map(|chain| chain.sample_rate)
    }

    pub fn is_prepared(&self) -> bool {
        self.chain.is_some()
    }

    pub fn smoothing_ms(&self) -> f32 {
        self.smoothing_ms
    }

    /// Compressor state, once prepared
    pub fn compressor(&self) -> Option<&CompressorEngine> {
        self.chain.as_ref().map(|chain| &chain.compressor)
    }

    /// Most recently emitted meter frame
    pub fn last_meter(&self) -> MeterFrame {
        self.last_meter
    }

    /// Process one block
    ///
    /// `sidechain` of `None` means nothing is connected to the sidechain
    /// bus, which then reads as silence. All buffers must have the length of
    /// `main[0]`.
    pub fn process(
        &mut self,
        main: [&[f32]; 2],
        sidechain: Option<[&[f32]; 2]>,
        output: [&mut [f32]; 2],
        sample_rate: f32,
    ) -> Result<()> {
        let Self {
            params,
            meter_decimation,
            chain,
            meter_sink,
            curve_revision,
            notified_revision,
            last_meter,
            ..
        } = self;

        let chain = chain.as_mut().ok_or(AudioError::NotPrepared)?;
        if chain.sample_rate != sample_rate {
            return Err(AudioError::SampleRateMismatch {
                prepared: chain.sample_rate,
                requested: sample_rate,
            });
        }

        let [main_l, main_r] = main;
        let [out_l, out_r] = output;
        let frames = main_l.len();
        let [sc_l_len, sc_r_len] = sidechain.map_or([frames; 2], |[l, r]| [l.len(), r.len()]);
        let lengths = [main_r.len(), out_l.len(), out_r.len(), sc_l_len, sc_r_len];
        if let Some(&found) = lengths.iter().find(|&&len| len != frames) {
            return Err(AudioError::BufferLengthMismatch {
                expected: frames,
                found,
            });
        }

        // One consistent parameter set for the whole block
        let targets = params.targets;
        let routing = params.routing;

        if let Some(sink) = meter_sink.as_mut() {
            if *notified_revision != *curve_revision {
                sink.on_curve_changed(GainCurve::new(
                    targets.threshold_db,
                    targets.ratio,
                    targets.knee,
                ));
                *notified_revision = *curve_revision;
            }
        }

        for i in 0..frames {
            let frame = chain.smoothers.process(&targets);

            let compressor = &mut chain.compressor;
            compressor.set_threshold(frame.threshold_db);
            compressor.set_ratio(frame.ratio);
            compressor.set_knee(frame.knee);
            compressor.set_attack(frame.attack_ms);
            compressor.set_release(frame.release_ms);
            compressor.set_hold(frame.hold_ms);
            chain.high_pass.set_cutoff_freq(frame.cutoff_hp);
            chain.low_pass.set_cutoff_freq(frame.cutoff_lp);

            let dry = [main_l[i], main_r[i]];
            let side = match sidechain {
                Some([sc_l, sc_r]) => [sc_l[i], sc_r[i]],
                None => [0.0, 0.0],
            };

            let mut wet = dry;
            if routing.mode == Mode::Colored {
                let boundary = db_to_gain(frame.threshold_db);
                for sample in wet.iter_mut() {
                    *sample = waveshape(*sample, boundary);
                }
            }

            let mut detector = if routing.sidechain { side } else { dry };
            for channel in Channel::BOTH {
                let sample = &mut detector[channel.index()];
                if routing.lp_enabled {
                    *sample = chain.low_pass.process_audio_sample(*sample, channel);
                }
                if routing.hp_enabled {
                    *sample = chain.high_pass.process_audio_sample(*sample, channel);
                }
            }

            let gain_reduction_db = compressor.process_stereo(detector[0], detector[1]);
            let gain = db_to_gain(gain_reduction_db) * db_to_gain(frame.gain_db);
            for sample in wet.iter_mut() {
                *sample *= gain;
            }

            let out = if routing.audition {
                if routing.sidechain {
                    side
                } else {
                    detector
                }
            } else {
                let dry_mix = 1.0 - frame.mix;
                [
                    frame.mix * wet[0] + dry_mix * dry[0],
                    frame.mix * wet[1] + dry_mix * dry[1],
                ]
            };
            out_l[i] = out[0];
            out_r[i] = out[1];

            let input_level = chain.input_meter.process(dry[0].abs().max(dry[1].abs()));
            let output_level = chain.output_meter.process(wet[0].abs().max(wet[1].abs()));
            chain.meter_countdown -= 1;
            if chain.meter_countdown == 0 {
                chain.meter_countdown = *meter_decimation;
                let meter = MeterFrame {
                    input_db: gain_to_db(input_level),
                    output_db: gain_to_db(output_level),
                    gain_reduction_db,
                };
                *last_meter = meter;
                if let Some(sink) = meter_sink.as_mut() {
                    sink.on_meter(meter);
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
