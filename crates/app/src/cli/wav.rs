//! WAV file IO for offline rendering

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::{debug, warn};

/// De-interleaved stereo audio
#[derive(Debug, Clone, PartialEq)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
    pub sample_rate: u32,
}

impl StereoBuffer {
    pub fn silent(frames: usize, sample_rate: u32) -> Self {
        Self {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
            sample_rate,
        }
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    /// Pad with silence or truncate to exactly `frames`
    pub fn fit_to(&mut self, frames: usize) {
        self.left.resize(frames, 0.0);
        self.right.resize(frames, 0.0);
    }

    /// Largest absolute sample over both channels
    pub fn peak(&self) -> f32 {
        self.left
            .iter()
            .chain(&self.right)
            .fold(0.0_f32, |peak, x| peak.max(x.abs()))
    }
}

/// Read a WAV file as stereo floats
///
/// Integer formats are scaled to [-1, 1). Mono is duplicated to both
/// channels; channels beyond the second are ignored.
pub fn read_stereo(path: &Path) -> Result<StereoBuffer> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("{} has no audio channels", path.display());
    }
    if channels > 2 {
        warn!(channels, path = %path.display(), "Only the first two channels are processed");
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("Failed to decode {}", path.display()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("Failed to decode {}", path.display()))?
        }
    };

    let frames = samples.len() / channels;
    let mut buffer = StereoBuffer::silent(frames, spec.sample_rate);
    for (frame, chunk) in samples.chunks_exact(channels).enumerate() {
        buffer.left[frame] = chunk[0];
        buffer.right[frame] = if channels > 1 { chunk[1] } else { chunk[0] };
    }

    debug!(
        path = %path.display(),
        frames,
        channels,
        sample_rate = spec.sample_rate,
        "WAV loaded"
    );
    Ok(buffer)
}

/// Write stereo floats as a 32-bit float WAV file
pub fn write_stereo(path: &Path, buffer: &StereoBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for (left, right) in buffer.left.iter().zip(&buffer.right) {
        writer.write_sample(*left)?;
        writer.write_sample(*right)?;
    }
    writer
        .finalize()
        .with_context(|| format!("Failed to finalize {}", path.display()))?;

    debug!(path = %path.display(), frames = buffer.frames(), "WAV written");
    Ok(())
}
