//! Mixing of normalized per-track renders into one file.
//!
//! Both mixers follow the same contract: inputs are averaged with equal
//! weight over the length of the longest input (shorter inputs count as
//! silence once they end), then a fixed makeup gain is applied.

use super::engine::RenderResult;
use super::export::{read_wav, write_wav, WavSampleFormat};
use crate::error::{PipelineError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Makeup gain applied after averaging, in dB.
pub const DEFAULT_MAKEUP_GAIN_DB: f64 = 12.0;

/// Longest stderr excerpt kept in an error.
const STDERR_TAIL: usize = 2000;

/// Sums rendered files into one output file.
pub trait Mixer {
    /// Checks the mixer can run at all. Called before any rendering.
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    fn mix(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

/// Mixes by running ffmpeg's `amix` and `volume` filters.
#[derive(Debug, Clone)]
pub struct FfmpegMixer {
    program: PathBuf,
    makeup_gain_db: f64,
}

impl FfmpegMixer {
    pub fn new(program: impl Into<PathBuf>, makeup_gain_db: f64) -> Self {
        Self {
            program: program.into(),
            makeup_gain_db,
        }
    }

    /// The `-filter_complex` expression for `input_count` inputs.
    pub fn filter_expression(&self, input_count: usize) -> String {
        format!(
            "amix=inputs={}:duration=longest,volume={:+}dB",
            input_count, self.makeup_gain_db
        )
    }

    /// Full argument list: one `-i` per input, the filter, overwrite, output.
    pub fn command_args(&self, inputs: &[PathBuf], output: &Path) -> Vec<OsString> {
        let mut args = Vec::with_capacity(inputs.len() * 2 + 4);
        for input in inputs {
            args.push(OsString::from("-i"));
            args.push(input.as_os_str().to_owned());
        }
        args.push(OsString::from("-filter_complex"));
        args.push(OsString::from(self.filter_expression(inputs.len())));
        args.push(OsString::from("-y"));
        args.push(output.as_os_str().to_owned());
        args
    }

    fn run(&self, args: &[OsString]) -> Result<()> {
        let program = self.program.display().to_string();
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| PipelineError::ExternalToolFailure {
                program: program.clone(),
                status: None,
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let start = stderr
                .char_indices()
                .rev()
                .nth(STDERR_TAIL)
                .map_or(0, |(i, _)| i);
            return Err(PipelineError::ExternalToolFailure {
                program,
                status: output.status.code(),
                stderr: stderr[start..].trim().to_string(),
            });
        }
        Ok(())
    }
}

impl Mixer for FfmpegMixer {
    fn preflight(&self) -> Result<()> {
        self.run(&[OsString::from("-version")])
    }

    fn mix(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        if inputs.is_empty() {
            return Err(PipelineError::NothingToMix);
        }
        tracing::info!(
            "Mixing {} files with {} ({})",
            inputs.len(),
            self.program.display(),
            self.filter_expression(inputs.len())
        );
        self.run(&self.command_args(inputs, output))
    }
}

/// Mixes in-process with hound. Needs no external tool.
#[derive(Debug, Clone)]
pub struct InternalMixer {
    makeup_gain_db: f64,
    format: WavSampleFormat,
}

impl InternalMixer {
    pub fn new(makeup_gain_db: f64, format: WavSampleFormat) -> Self {
        Self {
            makeup_gain_db,
            format,
        }
    }

    /// Averages `buffers` and applies the makeup gain.
    ///
    /// # Errors
    ///
    /// Returns `NothingToMix` for an empty list and `Config` when sample
    /// rates differ.
    pub fn mix_buffers(&self, buffers: &[RenderResult]) -> Result<RenderResult> {
        let first = buffers.first().ok_or(PipelineError::NothingToMix)?;
        if let Some(other) = buffers.iter().find(|b| b.sample_rate != first.sample_rate) {
            return Err(PipelineError::Config(format!(
                "cannot mix {} Hz with {} Hz",
                first.sample_rate, other.sample_rate
            )));
        }

        let channel_count = buffers.iter().map(|b| b.channel_count()).max().unwrap_or(1);
        let frames = buffers.iter().map(|b| b.frames()).max().unwrap_or(0);
        let scale = (10f64.powf(self.makeup_gain_db / 20.0) / buffers.len() as f64) as f32;

        let mut mixed = RenderResult::silence(first.sample_rate, channel_count, frames);
        for buffer in buffers {
            if buffer.channels.is_empty() {
                continue;
            }
            for (c, out) in mixed.channels.iter_mut().enumerate() {
                // Mono inputs feed every output channel
                let source = &buffer.channels[c.min(buffer.channel_count() - 1)];
                for (o, s) in out.iter_mut().zip(source) {
                    *o += s * scale;
                }
            }
        }
        Ok(mixed)
    }
}

impl Mixer for InternalMixer {
    fn mix(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        tracing::info!(
            "Mixing {} files in-process ({:+} dB makeup)",
            inputs.len(),
            self.makeup_gain_db
        );
        let buffers = inputs.iter().map(read_wav).collect::<Result<Vec<_>>>()?;
        let mixed = self.mix_buffers(&buffers)?;
        write_wav(&mixed, output, self.format)
    }
}
