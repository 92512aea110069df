//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod dsp;
pub mod params;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{AudioError, Channel, Result};
pub use config::{ConfigError, DcompConfig, EngineConfig, ParameterSettings};
pub use dsp::*;
pub use params::{Mode, ParamId, ParamKind, ParamSpec, ParameterSet, ParameterTargets, RoutingConfig};
