//! dcomp CLI Application

mod wav;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dcomp_core::{DcompConfig, GainCurve, MeterFrame, ParamId, ParamKind, ParameterSettings, SignalRouter};
use dcomp_infra::RealtimeEngine;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use wav::StereoBuffer;

#[derive(Parser)]
#[command(name = "dcomp")]
#[command(about = "A stereo dynamics compressor", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress a WAV file
    Render {
        /// Input WAV file
        #[arg(short, long)]
        input: PathBuf,

        /// Output WAV file (32-bit float)
        #[arg(short, long)]
        output: PathBuf,

        /// WAV file feeding the sidechain bus
        #[arg(long)]
        sidechain: Option<PathBuf>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override a parameter, e.g. --set threshold=-18 --set mode=colored
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,

        /// Write a JSON metering summary
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print the static transfer curve
    Curve {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override a parameter
        #[arg(long = "set", value_name = "NAME=VALUE")]
        overrides: Vec<String>,
    },

    /// List the control parameters
    Params,

    /// Write the default configuration
    InitConfig {
        path: PathBuf,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Metering summary of one render
#[derive(Debug, Serialize)]
struct RenderReport {
    input: PathBuf,
    output: PathBuf,
    sample_rate: u32,
    frames: usize,
    duration_secs: f64,
    input_peak_db: f32,
    output_peak_db: f32,
    max_gain_reduction_db: f32,
    mean_gain_reduction_db: f32,
    meter_frames: usize,
    dropped_meter_frames: u64,
    curve: GainCurve,
    parameters: ParameterSettings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "dcomp=debug,dcomp_core=debug,dcomp_infra=debug,info"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Command::Render {
            input,
            output,
            sidechain,
            config,
            overrides,
            report,
        } => {
            let config = load_config(config.as_deref(), &overrides).await?;
            render(&input, &output, sidechain.as_deref(), config, report.as_deref()).await
        }
        Command::Curve { config, overrides } => {
            let config = load_config(config.as_deref(), &overrides).await?;
            print_curve(&config);
            Ok(())
        }
        Command::Params => {
            print_params();
            Ok(())
        }
        Command::InitConfig { path, force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to replace it)", path.display());
            }
            DcompConfig::default()
                .save_to_file(&path)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Default configuration written");
            Ok(())
        }
    }
}

/// Load the configuration file (or defaults) and apply `name=value` overrides
async fn load_config(path: Option<&Path>, overrides: &[String]) -> Result<DcompConfig> {
    let mut config = match path {
        Some(path) => DcompConfig::load_from_file(path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => DcompConfig::default(),
    };

    for assignment in overrides {
        let id = config
            .parameters
            .set_from_str(assignment)
            .with_context(|| format!("Invalid --set '{assignment}'"))?;
        debug!(param = %id, value = config.parameters.get(id), "Parameter override");
    }

    Ok(config)
}

async fn render(
    input: &Path,
    output: &Path,
    sidechain: Option<&Path>,
    mut config: DcompConfig,
    report: Option<&Path>,
) -> Result<()> {
    let source = wav::read_stereo(input)?;
    if source.sample_rate != config.engine.sample_rate {
        debug!(
            configured = config.engine.sample_rate,
            file = source.sample_rate,
            "Using the input file's sample rate"
        );
        config.engine.sample_rate = source.sample_rate;
    }

    let side = match sidechain {
        Some(path) => {
            let mut side = wav::read_stereo(path)?;
            if side.sample_rate != source.sample_rate {
                bail!(
                    "Sidechain runs at {} Hz but the input runs at {} Hz",
                    side.sample_rate,
                    source.sample_rate
                );
            }
            if side.frames() != source.frames() {
                warn!(
                    sidechain = side.frames(),
                    input = source.frames(),
                    "Sidechain length differs from input; padding or truncating"
                );
                side.fit_to(source.frames());
            }
            Some(side)
        }
        None => {
            if config.parameters.sidechain {
                warn!("Sidechain enabled without a sidechain file; the detector hears silence");
            }
            None
        }
    };

    let (mut engine, mut handle) = RealtimeEngine::new(&config)?;
    let mut processed = StereoBuffer::silent(source.frames(), source.sample_rate);
    let mut meters: Vec<MeterFrame> = Vec::new();

    info!(
        input = %input.display(),
        frames = source.frames(),
        sample_rate = source.sample_rate,
        "Rendering"
    );

    let block_size = engine.block_size();
    let mut start = 0;
    while start < source.frames() {
        let end = (start + block_size).min(source.frames());
        let range = start..end;

        let side_block = side
            .as_ref()
            .map(|s| [&s.left[range.clone()], &s.right[range.clone()]]);
        engine.process_block(
            [&source.left[range.clone()], &source.right[range.clone()]],
            side_block,
            [&mut processed.left[range.clone()], &mut processed.right[range]],
        )?;
        meters.extend(handle.meters.drain());

        start = end;
    }

    wav::write_stereo(output, &processed)?;

    let summary = RenderReport {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        sample_rate: source.sample_rate,
        frames: source.frames(),
        duration_secs: source.frames() as f64 / source.sample_rate as f64,
        input_peak_db: dcomp_core::gain_to_db(source.peak()),
        output_peak_db: dcomp_core::gain_to_db(processed.peak()),
        max_gain_reduction_db: meters
            .iter()
            .map(|m| m.gain_reduction_db)
            .fold(0.0, f32::min),
        mean_gain_reduction_db: if meters.is_empty() {
            0.0
        } else {
            meters.iter().map(|m| m.gain_reduction_db).sum::<f32>() / meters.len() as f32
        },
        meter_frames: meters.len(),
        dropped_meter_frames: handle.meters.dropped(),
        curve: engine.router().gain_curve(),
        parameters: config.parameters.clone(),
    };

    info!(
        output = %output.display(),
        max_gain_reduction_db = summary.max_gain_reduction_db,
        output_peak_db = summary.output_peak_db,
        "Render complete"
    );

    if let Some(path) = report {
        let json = serde_json::to_string_pretty(&summary)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    Ok(())
}

fn print_curve(config: &DcompConfig) {
    let curve = SignalRouter::from_config(&config.engine, &config.parameters).gain_curve();

    println!(
        "Threshold {:.1} dB, ratio {:.2}:1, knee {:.1} dB ({:.1} .. {:.1} dB)",
        curve.threshold_db,
        curve.ratio,
        curve.knee_db,
        curve.knee_start_db(),
        curve.knee_end_db()
    );
    println!("{:>10} {:>10} {:>10}", "in (dB)", "gr (dB)", "out (dB)");
    for step in 0..=20 {
        let level = -60.0 + 3.0 * step as f32;
        println!(
            "{:>10.1} {:>10.2} {:>10.2}",
            level,
            curve.gain_reduction_db(level),
            curve.output_db(level)
        );
    }
}

fn print_params() {
    println!(
        "{:>2}  {:<12} {:<20} {:>12} {:>20}",
        "id", "key", "name", "default", "range"
    );
    for id in ParamId::ALL {
        let spec = id.spec();
        let range = match spec.kind {
            ParamKind::Continuous => format!("{} .. {} {}", spec.min, spec.max, spec.unit),
            ParamKind::Bool => "off | on".to_string(),
            ParamKind::Enum(labels) => labels.join(" | "),
        };
        println!(
            "{:>2}  {:<12} {:<20} {:>12} {:>20}",
            id.index(),
            id.key(),
            spec.name,
            spec.display(spec.default),
            range.trim_end()
        );
    }
}
