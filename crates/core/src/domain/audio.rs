//! Audio-level error type and channel addressing shared by every DSP stage

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error, PartialEq)]
pub enum AudioError {
    /// `process` was called before `prepare` ever ran
    #[error("Processor not prepared: call prepare(sample_rate) before processing")]
    NotPrepared,

    /// The host changed the sample rate without re-preparing the chain
    #[error("Sample rate mismatch: prepared for {prepared} Hz, asked to process at {requested} Hz")]
    SampleRateMismatch { prepared: f32, requested: f32 },

    /// Sample rate is not a finite positive number
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f32),

    /// Input/output buffers of one block do not have the same length
    #[error("Buffer length mismatch: expected {expected} frames, found {found}")]
    BufferLengthMismatch { expected: usize, found: usize },

    /// Invalid configuration for the processing chain
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// One side of a stereo pair
///
/// Stateful stages (filters, meters) keep one state per channel so the two
/// sides never smear into each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Left,
    Right,
}

impl Channel {
    /// Both channels in processing order
    pub const BOTH: [Channel; 2] = [Channel::Left, Channel::Right];

    /// Index into per-channel state arrays
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Channel::Left => 0,
            Channel::Right => 1,
        }
    }
}

/// Check that a sample rate can drive time-constant based stages
pub fn validate_sample_rate(sample_rate: f32) -> Result<f32> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(sample_rate)
    } else {
        Err(AudioError::InvalidSampleRate(sample_rate))
    }
}
