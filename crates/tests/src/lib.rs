//! Shared signal generators for the dcomp integration tests

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

pub const SAMPLE_RATE: f32 = 48000.0;

/// Sine wave starting at phase 0
pub fn generate_sine_wave(frames: usize, frequency: f32, amplitude: f32, sample_rate: f32) -> Vec<f32> {
    (0..frames)
        .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / sample_rate).sin())
        .collect()
}

/// Constant signal
pub fn generate_dc(frames: usize, level: f32) -> Vec<f32> {
    vec![level; frames]
}

pub fn generate_silence(frames: usize) -> Vec<f32> {
    vec![0.0; frames]
}

/// Uniform white noise in [-amplitude, amplitude), reproducible per seed
pub fn generate_noise(frames: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..frames)
        .map(|_| amplitude * rng.gen_range(-1.0_f32..1.0))
        .collect()
}

/// Number of samples covering `ms` milliseconds
pub fn ms_to_frames(ms: f32, sample_rate: f32) -> usize {
    (ms * 0.001 * sample_rate).round() as usize
}

/// Largest sample-to-sample step
pub fn max_step(signal: &[f32]) -> f32 {
    signal
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .fold(0.0, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generators() {
        assert_eq!(generate_sine_wave(480, 100.0, 1.0, SAMPLE_RATE).len(), 480);
        assert_eq!(generate_dc(3, 0.5), vec![0.5; 3]);
        assert_eq!(generate_noise(64, 1.0, 7), generate_noise(64, 1.0, 7));
        assert!(generate_noise(1024, 0.5, 1).iter().all(|x| x.abs() <= 0.5));
        assert_eq!(ms_to_frames(10.0, SAMPLE_RATE), 480);
        assert_eq!(max_step(&[0.0, 0.5, 0.25]), 0.5);
    }
}
