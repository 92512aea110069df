//! Configuration management for dcomp
//!
//! This module provides:
//! - Engine settings (sample rate, block size, smoothing and metering)
//! - Initial control parameter values in host (display) units
//! - TOML serialization with async file IO

use crate::domain::params::{Mode, ParamId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),
}

/// Processing engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Frames per processing block
    pub block_size: usize,

    /// Control smoothing time constant in milliseconds
    pub smoothing_ms: f32,

    /// Emit one meter frame every N samples
    pub meter_decimation: usize,

    /// Capacity of the meter queue between audio and UI threads
    pub meter_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 512,
            smoothing_ms: 5.0,
            meter_decimation: 32,
            meter_queue_capacity: 1024,
        }
    }
}

/// Initial control values, in the same units the host sends them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSettings {
    pub gain_db: f32,
    pub threshold_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub hold_ms: f32,
    pub ratio: f32,
    pub knee: f32,
    pub mode: Mode,
    /// Dry/wet mix in percent
    pub mix_percent: f32,
    pub sidechain: bool,
    pub sc_audition: bool,
    pub cutoff_hp_hz: f32,
    pub cutoff_lp_hz: f32,
    pub hp_enabled: bool,
    pub lp_enabled: bool,
}

impl Default for ParameterSettings {
    fn default() -> Self {
        let default = |id: ParamId| id.spec().default;
        Self {
            gain_db: default(ParamId::Gain),
            threshold_db: default(ParamId::Threshold),
            attack_ms: default(ParamId::Attack),
            release_ms: default(ParamId::Release),
            hold_ms: default(ParamId::Hold),
            ratio: default(ParamId::Ratio),
            knee: default(ParamId::Knee),
            mode: Mode::from_value(default(ParamId::Mode)),
            mix_percent: default(ParamId::Mix),
            sidechain: false,
            sc_audition: false,
            cutoff_hp_hz: default(ParamId::CutoffHp),
            cutoff_lp_hz: default(ParamId::CutoffLp),
            hp_enabled: false,
            lp_enabled: false,
        }
    }
}

fn flag(on: bool) -> f32 {
    if on {
        1.0
    } else {
        0.0
    }
}

impl ParameterSettings {
    /// Raw host value of one parameter
    pub fn get(&self, id: ParamId) -> f32 {
        match id {
            ParamId::Gain => self.gain_db,
            ParamId::Threshold => self.threshold_db,
            ParamId::Attack => self.attack_ms,
            ParamId::Release => self.release_ms,
            ParamId::Hold => self.hold_ms,
            ParamId::Ratio => self.ratio,
            ParamId::Knee => self.knee,
            ParamId::Mode => self.mode.as_value(),
            ParamId::Mix => self.mix_percent,
            ParamId::Sidechain => flag(self.sidechain),
            ParamId::ScAudition => flag(self.sc_audition),
            ParamId::CutoffHp => self.cutoff_hp_hz,
            ParamId::CutoffLp => self.cutoff_lp_hz,
            ParamId::HpEnable => flag(self.hp_enabled),
            ParamId::LpEnable => flag(self.lp_enabled),
        }
    }

    /// Overwrite one parameter with a raw host value
    ///
    /// Values are stored as given; range handling happens at ingestion.
    pub fn set(&mut self, id: ParamId, raw: f32) {
        match id {
            ParamId::Gain => self.gain_db = raw,
            ParamId::Threshold => self.threshold_db = raw,
            ParamId::Attack => self.attack_ms = raw,
            ParamId::Release => self.release_ms = raw,
            ParamId::Hold => self.hold_ms = raw,
            ParamId::Ratio => self.ratio = raw,
            ParamId::Knee => self.knee = raw,
            ParamId::Mode => self.mode = Mode::from_value(raw),
            ParamId::Mix => self.mix_percent = raw,
            ParamId::Sidechain => self.sidechain = raw >= 0.5,
            ParamId::ScAudition => self.sc_audition = raw >= 0.5,
            ParamId::CutoffHp => self.cutoff_hp_hz = raw,
            ParamId::CutoffLp => self.cutoff_lp_hz = raw,
            ParamId::HpEnable => self.hp_enabled = raw >= 0.5,
            ParamId::LpEnable => self.lp_enabled = raw >= 0.5,
        }
    }

    /// Parse a `name=value` assignment, e.g. `threshold=-12` or `mode=colored`
    pub fn set_from_str(&mut self, assignment: &str) -> Result<ParamId> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| ConfigError::Invalid(format!("expected name=value, got '{assignment}'")))?;
        let key = key.trim();
        let value = value.trim();

        let id = ParamId::from_key(key).ok_or_else(|| ConfigError::UnknownParameter(key.to_string()))?;
        let raw = match (id, value.to_ascii_lowercase().as_str()) {
            (ParamId::Mode, "clean") => 0.0,
            (ParamId::Mode, "colored") => 1.0,
            (_, "on" | "true") => 1.0,
            (_, "off" | "false") => 0.0,
            (_, number) => number
                .parse::<f32>()
                .map_err(|_| ConfigError::Invalid(format!("'{value}' is not a valid value for {key}")))?,
        };

        self.set(id, raw);
        Ok(id)
    }

    /// Every parameter as a `(ParamId, raw)` pair, ready for ingestion
    pub fn changes(&self) -> impl Iterator<Item = (ParamId, f32)> + '_ {
        ParamId::ALL.into_iter().map(move |id| (id, self.get(id)))
    }
}

/// Complete dcomp configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DcompConfig {
    pub engine: EngineConfig,
    pub parameters: ParameterSettings,
}

impl DcompConfig {
    /// Load configuration from a TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!(engine = ?config.engine, "Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to a TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if engine.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".to_string()));
        }
        if engine.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be positive".to_string()));
        }
        if engine.meter_decimation == 0 {
            return Err(ConfigError::Invalid("meter_decimation must be positive".to_string()));
        }
        if engine.meter_queue_capacity == 0 {
            return Err(ConfigError::Invalid("meter_queue_capacity must be positive".to_string()));
        }
        if !engine.smoothing_ms.is_finite() || engine.smoothing_ms < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "smoothing_ms must be a non-negative number, got {}",
                engine.smoothing_ms
            )));
        }
        Ok(())
    }
}
