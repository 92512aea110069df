//! Visualization side channel
//!
//! The router publishes level and gain-reduction samples through the
//! [`MeterSink`] observer. Delivery is fire-and-forget: a sink must never
//! block the audio thread and is free to drop frames under load.

use super::compressor::GainCurve;
use super::params;
use serde::{Deserialize, Serialize};

/// One metering sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterFrame {
    /// Metered dry input level
    pub input_db: f32,
    /// Metered processed output level (before dry/wet mix)
    pub output_db: f32,
    /// Gain reduction applied to this sample, ≤ 0
    pub gain_reduction_db: f32,
}

impl MeterFrame {
    pub const SILENT: MeterFrame = MeterFrame {
        input_db: params::DETECTOR_FLOOR_DB,
        output_db: params::DETECTOR_FLOOR_DB,
        gain_reduction_db: 0.0,
    };
}

impl Default for MeterFrame {
    fn default() -> Self {
        Self::SILENT
    }
}

/// Observer for metering and curve changes
///
/// Both callbacks run on the audio thread.
pub trait MeterSink: Send {
    /// A new metering sample is available
    fn on_meter(&mut self, frame: MeterFrame);

    /// Threshold, ratio or knee changed; plots of the curve should redraw
    fn on_curve_changed(&mut self, _curve: GainCurve) {}
}
