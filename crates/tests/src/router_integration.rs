//! Integration tests for the compressor signal path
//!
//! These tests drive the complete chain, either through the signal router
//! directly or through the real-time engine with its parameter mailbox and
//! meter feed, and check the behaviour a listener would notice: gain
//! reduction levels, hold, routing and click-free automation.

use dcomp_core::{
    db_to_gain, CompressorEngine, DcompConfig, ParamId, SignalRouter, SvfFilter,
};
use dcomp_core::domain::audio::Channel;
use dcomp_infra::{EngineHandle, RealtimeEngine};
use dcomp_tests::*;

fn router_with(changes: &[(ParamId, f32)]) -> SignalRouter {
    let mut router = SignalRouter::default();
    for &(id, raw) in changes {
        assert!(router.on_parameter_changed(id, raw), "{id} rejected");
    }
    router.prepare(SAMPLE_RATE).unwrap();
    router
}

fn run_router(
    router: &mut SignalRouter,
    left: &[f32],
    right: &[f32],
    sidechain: Option<[&[f32]; 2]>,
) -> (Vec<f32>, Vec<f32>) {
    let mut out_l = vec![0.0; left.len()];
    let mut out_r = vec![0.0; right.len()];
    router
        .process(
            [left, right],
            sidechain,
            [out_l.as_mut_slice(), out_r.as_mut_slice()],
            SAMPLE_RATE,
        )
        .unwrap();
    (out_l, out_r)
}

/// Process in engine-sized blocks, draining meters after each block
fn run_engine(engine: &mut RealtimeEngine, handle: &mut EngineHandle, input: &[f32]) -> Vec<f32> {
    let mut output = vec![0.0; input.len()];
    let mut scratch = vec![0.0; input.len()];
    let block_size = engine.block_size();

    for (index, block) in input.chunks(block_size).enumerate() {
        let start = index * block_size;
        let end = start + block.len();
        engine
            .process_block(
                [block, block],
                None,
                [&mut output[start..end], &mut scratch[start..end]],
            )
            .unwrap();
        handle.meters.drain();
    }
    output
}

fn engine_with(configure: impl FnOnce(&mut DcompConfig)) -> (RealtimeEngine, EngineHandle) {
    let mut config = DcompConfig::default();
    configure(&mut config);
    RealtimeEngine::new(&config).unwrap()
}

// ============================================================================
// GAIN REDUCTION
// ============================================================================

#[test]
fn test_unity_ratio_never_compresses() {
    let mut router = router_with(&[(ParamId::Ratio, 1.0), (ParamId::Threshold, -60.0)]);
    let left = generate_noise(48_000, 1.0, 11);
    let right = generate_noise(48_000, 1.0, 12);

    let (out_l, out_r) = run_router(&mut router, &left, &right, None);

    assert_eq!(out_l, left);
    assert_eq!(out_r, right);
    assert_eq!(router.compressor().unwrap().gain_reduction_db(), 0.0);
}

#[test]
fn test_steady_state_scenario_through_engine() {
    let (mut engine, mut handle) = engine_with(|config| {
        let p = &mut config.parameters;
        p.threshold_db = -4.0;
        p.ratio = 4.0;
        p.knee = 0.0;
        p.attack_ms = 10.0;
        p.release_ms = 250.0;
        p.hold_ms = 0.0;
    });
    let input = generate_sine_wave(48_000, 1000.0, 1.0, SAMPLE_RATE);
    let output = run_engine(&mut engine, &mut handle, &input);

    let gr = engine.router().compressor().unwrap().gain_reduction_db();
    assert!((gr + 3.0).abs() < 0.05, "gain reduction {gr}");

    let latest = handle.meters.latest().unwrap();
    assert!((latest.gain_reduction_db + 3.0).abs() < 0.05);
    assert!(latest.output_db < latest.input_db);

    // The compressed sine peaks near -3 dBFS
    let tail_peak = output[40_000..].iter().fold(0.0_f32, |p, x| p.max(x.abs()));
    assert!((tail_peak - db_to_gain(-3.0)).abs() < 0.01, "tail peak {tail_peak}");
}

#[test]
fn test_steady_state_at_other_sample_rate() {
    let rate = 44_100.0;
    let (mut engine, mut handle) = engine_with(|config| {
        config.parameters.knee = 0.0;
    });
    engine.set_sample_rate(rate).unwrap();

    let input = generate_sine_wave(44_100, 1000.0, 1.0, rate);
    run_engine(&mut engine, &mut handle, &input);

    let gr = engine.router().compressor().unwrap().gain_reduction_db();
    assert!((gr + 3.0).abs() < 0.05, "gain reduction {gr}");
}

#[test]
fn test_hold_keeps_gain_reduction() {
    let hold_ms = 100.0;
    let mut router = router_with(&[
        (ParamId::Threshold, -20.0),
        (ParamId::Ratio, 4.0),
        (ParamId::Knee, 0.0),
        (ParamId::Attack, 0.0),
        (ParamId::Release, 50.0),
        (ParamId::Hold, hold_ms),
    ]);

    let burst = ms_to_frames(100.0, SAMPLE_RATE);
    let hold = ms_to_frames(hold_ms, SAMPLE_RATE);
    let mut signal = generate_dc(burst, 1.0);
    signal.extend(generate_silence(hold * 3));

    // One-sample blocks to observe gain reduction frame by frame
    let mut trace = Vec::with_capacity(signal.len());
    let mut out_l = [0.0_f32; 1];
    let mut out_r = [0.0_f32; 1];
    for sample in &signal {
        let frame = [*sample];
        router
            .process([&frame, &frame], None, [&mut out_l, &mut out_r], SAMPLE_RATE)
            .unwrap();
        trace.push(router.compressor().unwrap().gain_reduction_db());
    }

    let peak_reduction = trace[burst - 1];
    assert!((peak_reduction + 15.0).abs() < 1e-3);

    for (offset, gr) in trace[burst..burst + hold - 1].iter().enumerate() {
        assert!(
            *gr <= peak_reduction + 1e-4,
            "released {offset} samples into hold: {gr}"
        );
    }

    assert!(trace[burst + hold + ms_to_frames(50.0, SAMPLE_RATE)] > -1.0);
    assert_eq!(*trace.last().unwrap(), 0.0);
}

#[test]
fn test_louder_channel_drives_both() {
    let mut router = router_with(&[(ParamId::Threshold, -20.0), (ParamId::Knee, 0.0)]);
    let loud = generate_sine_wave(9600, 500.0, 1.0, SAMPLE_RATE);
    let quiet = generate_sine_wave(9600, 500.0, 0.01, SAMPLE_RATE);

    let (out_l, out_r) = run_router(&mut router, &loud, &quiet, None);

    // Same gain on both sides: the ratio between channels is preserved
    for i in (4800..9600).step_by(37) {
        if quiet[i].abs() > 1e-4 {
            let left_gain = out_l[i] / loud[i];
            let right_gain = out_r[i] / quiet[i];
            assert!((left_gain - right_gain).abs() < 1e-4, "frame {i}");
            assert!(right_gain < 0.5);
        }
    }
}

// ============================================================================
// ROUTING
// ============================================================================

#[test]
fn test_mix_identity() {
    let left = generate_noise(24_000, 0.9, 3);
    let right = generate_sine_wave(24_000, 300.0, 0.9, SAMPLE_RATE);

    let (mut dry_engine, mut dry_handle) = engine_with(|config| {
        config.parameters.mix_percent = 0.0;
        config.parameters.threshold_db = -30.0;
        config.parameters.gain_db = 12.0;
        config.parameters.mode = dcomp_core::Mode::Colored;
    });
    let mut out_l = vec![0.0; left.len()];
    let mut out_r = vec![0.0; left.len()];
    for (index, (block_l, block_r)) in left.chunks(512).zip(right.chunks(512)).enumerate() {
        let range = index * 512..index * 512 + block_l.len();
        dry_engine
            .process_block(
                [block_l, block_r],
                None,
                [&mut out_l[range.clone()], &mut out_r[range]],
            )
            .unwrap();
    }
    dry_handle.meters.drain();
    assert_eq!(out_l, left);
    assert_eq!(out_r, right);

    // Fully wet equals the compressed signal, frame for frame
    let mut router = router_with(&[(ParamId::Threshold, -30.0)]);
    let (wet_l, wet_r) = run_router(&mut router, &left, &right, None);
    let mut reference = CompressorEngine::new(10.0, 250.0, 0.0, 4.0, 0.5, SAMPLE_RATE);
    reference.set_threshold(-30.0);
    for i in 0..left.len() {
        let gain = db_to_gain(reference.process_stereo(left[i], right[i]));
        assert!((wet_l[i] - left[i] * gain).abs() < 1e-6, "frame {i}");
        assert!((wet_r[i] - right[i] * gain).abs() < 1e-6, "frame {i}");
    }
}

#[test]
fn test_detector_audition_without_sidechain() {
    let mut router = router_with(&[
        (ParamId::ScAudition, 1.0),
        (ParamId::HpEnable, 1.0),
        (ParamId::CutoffHp, 500.0),
    ]);
    let left = generate_noise(9600, 0.8, 21);
    let right = generate_noise(9600, 0.8, 22);

    let (out_l, out_r) = run_router(&mut router, &left, &right, None);

    let mut reference = SvfFilter::high_pass(SAMPLE_RATE, 500.0);
    for i in 0..left.len() {
        let l = reference.process_audio_sample(left[i], Channel::Left);
        let r = reference.process_audio_sample(right[i], Channel::Right);
        assert!((out_l[i] - l).abs() < 1e-6, "frame {i}");
        assert!((out_r[i] - r).abs() < 1e-6, "frame {i}");
    }
}

#[test]
fn test_sidechain_audition_is_unfiltered() {
    let mut router = router_with(&[
        (ParamId::Sidechain, 1.0),
        (ParamId::ScAudition, 1.0),
        (ParamId::HpEnable, 1.0),
        (ParamId::LpEnable, 1.0),
        (ParamId::CutoffHp, 1000.0),
        (ParamId::CutoffLp, 2000.0),
    ]);
    let main = generate_sine_wave(9600, 440.0, 0.5, SAMPLE_RATE);
    let side_l = generate_noise(9600, 1.0, 31);
    let side_r = generate_sine_wave(9600, 50.0, 1.0, SAMPLE_RATE);

    let (out_l, out_r) = run_router(
        &mut router,
        &main,
        &main,
        Some([side_l.as_slice(), side_r.as_slice()]),
    );

    assert_eq!(out_l, side_l);
    assert_eq!(out_r, side_r);
}

#[test]
fn test_filtered_sidechain_ignores_out_of_band_energy() {
    // A loud 50 Hz sidechain is removed by the high-pass before the detector
    let main = generate_sine_wave(24_000, 1000.0, 0.1, SAMPLE_RATE);
    let side = generate_sine_wave(24_000, 50.0, 1.0, SAMPLE_RATE);
    let sc = Some([side.as_slice(), side.as_slice()]);

    let mut unfiltered = router_with(&[(ParamId::Sidechain, 1.0), (ParamId::Threshold, -20.0)]);
    run_router(&mut unfiltered, &main, &main, sc);
    let raw_gr = unfiltered.compressor().unwrap().gain_reduction_db();

    let mut filtered = router_with(&[
        (ParamId::Sidechain, 1.0),
        (ParamId::Threshold, -20.0),
        (ParamId::HpEnable, 1.0),
        (ParamId::CutoffHp, 2000.0),
    ]);
    run_router(&mut filtered, &main, &main, sc);
    let filtered_gr = filtered.compressor().unwrap().gain_reduction_db();

    assert!(raw_gr < -10.0, "raw sidechain gr {raw_gr}");
    assert!(filtered_gr > raw_gr + 10.0, "filtered sidechain gr {filtered_gr}");
}

// ============================================================================
// AUTOMATION AND STABILITY
// ============================================================================

#[test]
fn test_makeup_jump_is_smoothed() {
    let (mut engine, mut handle) = engine_with(|config| {
        config.parameters.ratio = 1.0;
    });
    let input = generate_dc(4800, 0.1);

    let mut output = run_engine(&mut engine, &mut handle, &input[..480]);
    handle.on_parameter_changed(ParamId::Gain, 24.0);
    output.extend(run_engine(&mut engine, &mut handle, &input[480..]));

    let target = 0.1 * db_to_gain(24.0);
    assert!(max_step(&output) < 0.01, "step {}", max_step(&output));
    assert!((output.last().unwrap() - target).abs() < 1e-3);
}

#[test]
fn test_filters_stable_under_modulation() {
    let (mut engine, handle) = engine_with(|config| {
        config.parameters.hp_enabled = true;
        config.parameters.lp_enabled = true;
        config.parameters.sc_audition = true;
    });
    let noise = generate_noise(480_000, 1.0, 99);
    let mut out_l = vec![0.0; 512];
    let mut out_r = vec![0.0; 512];

    for (index, block) in noise.chunks(512).enumerate() {
        let (hp, lp) = if index % 2 == 0 {
            (20.0, 20_000.0)
        } else {
            (18_000.0, 40.0)
        };
        handle.on_parameter_changed(ParamId::CutoffHp, hp);
        handle.on_parameter_changed(ParamId::CutoffLp, lp);

        let frames = block.len();
        engine
            .process_block(
                [block, block],
                None,
                [&mut out_l[..frames], &mut out_r[..frames]],
            )
            .unwrap();
        assert!(
            out_l[..frames].iter().all(|x| x.is_finite() && x.abs() < 10.0),
            "block {index}"
        );
    }
}

#[test]
fn test_meter_feed_is_lossy() {
    let (mut engine, handle) = engine_with(|config| {
        config.engine.meter_queue_capacity = 4;
        config.engine.meter_decimation = 32;
    });
    let input = generate_sine_wave(48_000, 1000.0, 0.5, SAMPLE_RATE);
    let mut out_l = vec![0.0; 512];
    let mut out_r = vec![0.0; 512];

    // Nobody drains the feed; processing must carry on regardless
    for block in input.chunks(512) {
        let frames = block.len();
        engine
            .process_block(
                [block, block],
                None,
                [&mut out_l[..frames], &mut out_r[..frames]],
            )
            .unwrap();
    }

    // One curve event and three frames fit; every later frame is dropped
    assert_eq!(handle.meters.dropped(), 48_000 / 32 - 3);
}

#[test]
fn test_knee_parameter_maps_to_curve() {
    let mut router = SignalRouter::default();
    router.on_parameter_changed(ParamId::Knee, 1.0);
    router.on_parameter_changed(ParamId::Threshold, -10.0);
    router.on_parameter_changed(ParamId::Ratio, 2.0);

    let curve = router.gain_curve();
    assert_eq!(curve.knee_db, 20.0);
    assert_eq!(curve.knee_start_db(), -20.0);
    assert_eq!(curve.knee_end_db(), 0.0);
    assert_eq!(curve.gain_reduction_db(-21.0), 0.0);
    assert!((curve.gain_reduction_db(10.0) + 10.0).abs() < 1e-5);
}
