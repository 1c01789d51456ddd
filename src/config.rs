//! Render configuration.
//!
//! A run is described by a JSON file listing the input MIDI file, the output
//! path, and one (plugin, preset) pair per synthesizer slot. Slots are
//! positional: slot 0 plays track 1, slot 1 plays track 2, and so on.

use crate::audio::engine::{BLOCK_SIZE, SAMPLE_RATE};
use crate::audio::export::WavSampleFormat;
use crate::audio::gain::DEFAULT_TARGET_DB;
use crate::audio::mixer::DEFAULT_MAKEUP_GAIN_DB;
use crate::error::{PipelineError, Result};
use crate::midi::analyzer::DEFAULT_TAIL_SECONDS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Which mixer sums the normalized renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixerKind {
    /// External ffmpeg process.
    #[default]
    Ffmpeg,
    /// In-process mixing with hound.
    Internal,
}

impl std::str::FromStr for MixerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ffmpeg" => Ok(MixerKind::Ffmpeg),
            "internal" => Ok(MixerKind::Internal),
            other => Err(format!("unknown mixer '{}', expected ffmpeg or internal", other)),
        }
    }
}

/// One synthesizer slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotConfig {
    /// Plugin to instantiate (a SoundFont for the bundled host).
    pub plugin: PathBuf,

    /// Preset file; `.json` or `.bin`.
    pub preset: PathBuf,

    /// Instance name. Defaults to `my_synth_<n>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SlotConfig {
    /// Name of slot `index` (0-based).
    pub fn display_name(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("my_synth_{}", index + 1))
    }
}

fn default_sample_rate() -> u32 {
    SAMPLE_RATE
}

fn default_block_size() -> usize {
    BLOCK_SIZE
}

fn default_makeup_gain_db() -> f64 {
    DEFAULT_MAKEUP_GAIN_DB
}

fn default_target_db() -> f64 {
    DEFAULT_TARGET_DB
}

fn default_tail_seconds() -> f64 {
    DEFAULT_TAIL_SECONDS
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("mixed.wav")
}

/// Everything one render run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Input MIDI file. Track 0 holds tempo, tracks 1..N the parts.
    pub midi_path: PathBuf,

    /// Mixed output WAV file.
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Positional synthesizer slots.
    pub slots: Vec<SlotConfig>,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Gain applied after averaging the tracks, in dB.
    #[serde(default = "default_makeup_gain_db")]
    pub makeup_gain_db: f64,

    /// Peak level for tracks without a `_v<n>dB` annotation.
    #[serde(default = "default_target_db")]
    pub default_target_db: f64,

    /// Padding after the longest track, in seconds.
    #[serde(default = "default_tail_seconds")]
    pub tail_seconds: f64,

    /// Fixed render length. Overrides the length derived from the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_seconds: Option<f64>,

    /// Directory for transient files. Defaults to the system temp dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,

    #[serde(default)]
    pub mixer: MixerKind,

    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    #[serde(default)]
    pub sample_format: WavSampleFormat,

    /// Keep the raw and normalized per-track WAV files.
    #[serde(default)]
    pub keep_renders: bool,
}

impl RenderConfig {
    /// A config with defaults for everything but the input and slots.
    pub fn new(midi_path: impl Into<PathBuf>, slots: Vec<SlotConfig>) -> Self {
        Self {
            midi_path: midi_path.into(),
            output_path: default_output_path(),
            slots,
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            makeup_gain_db: default_makeup_gain_db(),
            default_target_db: default_target_db(),
            tail_seconds: default_tail_seconds(),
            render_seconds: None,
            work_dir: None,
            mixer: MixerKind::default(),
            ffmpeg_path: default_ffmpeg_path(),
            sample_format: WavSampleFormat::default(),
            keep_renders: false,
        }
    }

    /// Parses a config from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the config as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Loads a config file. Relative paths resolve against its directory.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed, or fails validation.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let mut config = Self::from_json(&json)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Rebases every relative path onto `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        rebase(&mut self.midi_path);
        rebase(&mut self.output_path);
        for slot in &mut self.slots {
            rebase(&mut slot.plugin);
            rebase(&mut slot.preset);
        }
        if let Some(dir) = self.work_dir.as_mut() {
            rebase(dir);
        }
    }

    /// Checks values that would make a render meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(PipelineError::Config("sample_rate must be positive".into()));
        }
        if self.block_size == 0 {
            return Err(PipelineError::Config("block_size must be positive".into()));
        }
        if !self.tail_seconds.is_finite() || self.tail_seconds < 0.0 {
            return Err(PipelineError::Config(
                "tail_seconds must be a non-negative number".into(),
            ));
        }
        if let Some(seconds) = self.render_seconds {
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(PipelineError::Config(
                    "render_seconds must be a positive number".into(),
                ));
            }
        }
        for (name, value) in [
            ("makeup_gain_db", self.makeup_gain_db),
            ("default_target_db", self.default_target_db),
        ] {
            if !value.is_finite() {
                return Err(PipelineError::Config(format!("{} must be finite", name)));
            }
        }
        Ok(())
    }

    /// Directory that receives transient files.
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
