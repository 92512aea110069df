//! Real-time plumbing around the dcomp DSP core
//!
//! The audio thread owns the [`SignalRouter`](dcomp_core::SignalRouter).
//! Everything else talks to it through wait-free handoffs:
//! - host/UI thread → audio thread: [`ParameterMailbox`]
//! - audio thread → UI thread: [`MeterFeed`](audio::meter_feed)

pub mod audio;

pub use audio::*;
