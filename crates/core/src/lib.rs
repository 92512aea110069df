//! Signal-processing core of the dcomp stereo compressor
//!
//! The crate is organised around a single `domain` module so that the
//! real-time plumbing (`dcomp-infra`) and the command-line front end
//! (`dcomp-app`) only depend on plain DSP types.

pub mod domain;

pub use domain::*;
