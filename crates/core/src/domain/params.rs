//! Control parameters and the host-facing ingestion boundary
//!
//! The host layer addresses parameters by [`ParamId`] and sends raw values in
//! display units (dB, ms, %, Hz, 0/1 toggles). [`ParameterSet::apply`]
//! clamps them and performs the unit conversions exactly once, producing the
//! targets the smoothers chase plus the block-rate routing flags.

use crate::domain::dsp::params as dsp_params;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{trace, warn};

/// Identifier of a control parameter, stable across versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamId {
    Gain = 0,
    Threshold,
    Attack,
    Release,
    Hold,
    Ratio,
    Knee,
    Mode,
    Mix,
    Sidechain,
    ScAudition,
    CutoffHp,
    CutoffLp,
    HpEnable,
    LpEnable,
}

impl ParamId {
    pub const COUNT: usize = 15;

    pub const ALL: [ParamId; ParamId::COUNT] = [
        ParamId::Gain,
        ParamId::Threshold,
        ParamId::Attack,
        ParamId::Release,
        ParamId::Hold,
        ParamId::Ratio,
        ParamId::Knee,
        ParamId::Mode,
        ParamId::Mix,
        ParamId::Sidechain,
        ParamId::ScAudition,
        ParamId::CutoffHp,
        ParamId::CutoffLp,
        ParamId::HpEnable,
        ParamId::LpEnable,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Range, default and display metadata
    pub fn spec(self) -> &'static ParamSpec {
        &PARAM_SPECS[self.index()]
    }

    /// Short machine-readable key (config files, command line)
    pub fn key(self) -> &'static str {
        match self {
            ParamId::Gain => "gain",
            ParamId::Threshold => "threshold",
            ParamId::Attack => "attack",
            ParamId::Release => "release",
            ParamId::Hold => "hold",
            ParamId::Ratio => "ratio",
            ParamId::Knee => "knee",
            ParamId::Mode => "mode",
            ParamId::Mix => "mix",
            ParamId::Sidechain => "sidechain",
            ParamId::ScAudition => "sc_audition",
            ParamId::CutoffHp => "cutoff_hp",
            ParamId::CutoffLp => "cutoff_lp",
            ParamId::HpEnable => "hp_enable",
            ParamId::LpEnable => "lp_enable",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.key() == key)
    }

    /// Whether a change reshapes the static compression curve
    pub fn affects_curve(self) -> bool {
        matches!(self, ParamId::Threshold | ParamId::Ratio | ParamId::Knee)
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec().name)
    }
}

/// Value semantics of a parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    Continuous,
    Bool,
    /// Index into the listed labels
    Enum(&'static [&'static str]),
}

/// Static description of a control parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: f32,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    /// Exponent of the normalized → plain mapping (host knob feel)
    pub shape: Option<f32>,
    pub unit: &'static str,
    pub kind: ParamKind,
}

impl ParamSpec {
    const fn continuous(
        name: &'static str,
        default: f32,
        min: f32,
        max: f32,
        step: f32,
        shape: Option<f32>,
        unit: &'static str,
    ) -> Self {
        Self {
            name,
            default,
            min,
            max,
            step,
            shape,
            unit,
            kind: ParamKind::Continuous,
        }
    }

    const fn toggle(name: &'static str) -> Self {
        Self {
            name,
            default: 0.0,
            min: 0.0,
            max: 1.0,
            step: 1.0,
            shape: None,
            unit: "",
            kind: ParamKind::Bool,
        }
    }

    /// Bring a raw value into range according to the parameter kind
    ///
    /// NaN is mapped to the default.
    pub fn clamp(&self, raw: f32) -> f32 {
        if raw.is_nan() {
            return self.default;
        }
        match self.kind {
            ParamKind::Continuous => raw.clamp(self.min, self.max),
            ParamKind::Bool => {
                if raw >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            ParamKind::Enum(_) => raw.round().clamp(self.min, self.max),
        }
    }

    /// Map a normalized host value in [0, 1] to plain units
    pub fn from_normalized(&self, normalized: f32) -> f32 {
        let n = normalized.clamp(0.0, 1.0);
        let shaped = match self.shape {
            Some(shape) => n.powf(shape),
            None => n,
        };
        self.clamp(self.min + (self.max - self.min) * shaped)
    }

    /// Map a plain value to a normalized host value in [0, 1]
    pub fn to_normalized(&self, value: f32) -> f32 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.0;
        }
        let linear = ((self.clamp(value) - self.min) / span).clamp(0.0, 1.0);
        match self.shape {
            Some(shape) => linear.powf(1.0 / shape),
            None => linear,
        }
    }

    /// Human-readable value with unit
    pub fn display(&self, value: f32) -> String {
        let value = self.clamp(value);
        match self.kind {
            ParamKind::Continuous if self.unit.is_empty() => format!("{value:.2}"),
            ParamKind::Continuous => format!("{value:.1} {}", self.unit),
            ParamKind::Bool => if value >= 0.5 { "on" } else { "off" }.to_string(),
            ParamKind::Enum(labels) => labels
                .get(value as usize)
                .map(|label| label.to_string())
                .unwrap_or_else(|| format!("{value}")),
        }
    }
}

const MODE_LABELS: &[&str] = &["Clean", "Colored"];

static PARAM_SPECS: [ParamSpec; ParamId::COUNT] = [
    ParamSpec::continuous("Gain", 0.0, -24.0, 24.0, 0.1, None, "dB"),
    ParamSpec::continuous("Threshold", -4.0, -60.0, 0.0, 0.1, None, "dB"),
    ParamSpec::continuous("Attack", 10.0, 0.0, 250.0, 0.1, Some(2.0), "ms"),
    ParamSpec::continuous("Release", 250.0, 10.0, 1000.0, 1.0, Some(2.0), "ms"),
    ParamSpec::continuous("Hold", 0.0, 0.0, 300.0, 1.0, Some(2.0), "ms"),
    ParamSpec::continuous("Ratio", 4.0, 1.0, 100.0, 0.1, Some(4.0), ": 1"),
    ParamSpec::continuous("Knee", 0.5, 0.0, 1.0, 0.1, None, ""),
    ParamSpec {
        name: "Mode",
        default: 0.0,
        min: 0.0,
        max: 1.0,
        step: 1.0,
        shape: None,
        unit: "",
        kind: ParamKind::Enum(MODE_LABELS),
    },
    ParamSpec::continuous("Mix", 100.0, 0.0, 100.0, 1.0, None, "%"),
    ParamSpec::toggle("Sidechain"),
    ParamSpec::toggle("Audition Sidechain"),
    ParamSpec::continuous("Highpass", 20.0, 20.0, 20_000.0, 1.0, Some(2.0), "Hz"),
    ParamSpec::continuous("Lowpass", 20_000.0, 20.0, 20_000.0, 1.0, Some(2.0), "Hz"),
    ParamSpec::toggle("Highpass: Enabled"),
    ParamSpec::toggle("Lowpass: Enabled"),
];

/// Output colouring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Clean,
    /// Soft-saturate the output path above the threshold
    Colored,
}

impl Mode {
    pub fn from_value(value: f32) -> Self {
        if value >= 0.5 {
            Mode::Colored
        } else {
            Mode::Clean
        }
    }

    pub fn as_value(self) -> f32 {
        match self {
            Mode::Clean => 0.0,
            Mode::Colored => 1.0,
        }
    }
}

/// Block-rate routing flags, read once per sample without smoothing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub sidechain: bool,
    pub audition: bool,
    pub hp_enabled: bool,
    pub lp_enabled: bool,
    pub mode: Mode,
}

/// Smoother targets in internal units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterTargets {
    pub gain_db: f32,
    pub threshold_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub hold_ms: f32,
    pub ratio: f32,
    /// Knee fraction in [0, 1]
    pub knee: f32,
    /// Dry/wet fraction in [0, 1]
    pub mix: f32,
    pub cutoff_hp: f32,
    pub cutoff_lp: f32,
}

impl Default for ParameterTargets {
    fn default() -> Self {
        let mut set = ParameterSet::unset();
        for id in ParamId::ALL {
            set.apply(id, id.spec().default);
        }
        set.targets
    }
}

/// Everything the host can change: smoother targets plus routing flags
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub targets: ParameterTargets,
    pub routing: RoutingConfig,
}

impl ParameterSet {
    fn unset() -> Self {
        Self {
            targets: ParameterTargets {
                gain_db: 0.0,
                threshold_db: 0.0,
                attack_ms: 0.0,
                release_ms: 0.0,
                hold_ms: 0.0,
                ratio: dsp_params::RATIO_MIN,
                knee: 0.0,
                mix: 1.0,
                cutoff_hp: dsp_params::CUTOFF_MIN,
                cutoff_lp: dsp_params::CUTOFF_MAX,
            },
            routing: RoutingConfig::default(),
        }
    }

    /// Ingest one host value in display units
    ///
    /// Returns `false` (and leaves everything untouched) for non-finite
    /// values.
    pub fn apply(&mut self, id: ParamId, raw: f32) -> bool {
        if !raw.is_finite() {
            warn!(param = %id, raw, "Rejected non-finite parameter value");
            return false;
        }

        let value = id.spec().clamp(raw);
        let targets = &mut self.targets;
        let routing = &mut self.routing;
        match id {
            ParamId::Gain => targets.gain_db = value,
            ParamId::Threshold => targets.threshold_db = value,
            ParamId::Attack => targets.attack_ms = value,
            ParamId::Release => targets.release_ms = value,
            ParamId::Hold => targets.hold_ms = value,
            ParamId::Ratio => targets.ratio = value,
            ParamId::Knee => targets.knee = value,
            ParamId::Mode => routing.mode = Mode::from_value(value),
            ParamId::Mix => targets.mix = value / 100.0,
            ParamId::Sidechain => routing.sidechain = value >= 0.5,
            ParamId::ScAudition => routing.audition = value >= 0.5,
            ParamId::CutoffHp => targets.cutoff_hp = value,
            ParamId::CutoffLp => targets.cutoff_lp = value,
            ParamId::HpEnable => routing.hp_enabled = value >= 0.5,
            ParamId::LpEnable => routing.lp_enabled = value >= 0.5,
        }

        trace!(param = %id, raw, value, "Parameter changed");
        true
    }

    /// Current value of a parameter, back in display units
    pub fn value(&self, id: ParamId) -> f32 {
        let targets = &self.targets;
        let routing = &self.routing;
        let flag = |on: bool| if on { 1.0 } else { 0.0 };
        match id {
            ParamId::Gain => targets.gain_db,
            ParamId::Threshold => targets.threshold_db,
            ParamId::Attack => targets.attack_ms,
            ParamId::Release => targets.release_ms,
            ParamId::Hold => targets.hold_ms,
            ParamId::Ratio => targets.ratio,
            ParamId::Knee => targets.knee,
            ParamId::Mode => routing.mode.as_value(),
            ParamId::Mix => targets.mix * 100.0,
            ParamId::Sidechain => flag(routing.sidechain),
            ParamId::ScAudition => flag(routing.audition),
            ParamId::CutoffHp => targets.cutoff_hp,
            ParamId::CutoffLp => targets.cutoff_lp,
            ParamId::HpEnable => flag(routing.hp_enabled),
            ParamId::LpEnable => flag(routing.lp_enabled),
        }
    }
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            targets: ParameterTargets::default(),
            routing: RoutingConfig::default(),
        }
    }
}
