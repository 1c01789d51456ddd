//! Offline audio rendering, normalization, and mixing.
//!
//! This module provides:
//! - An offline render engine that plays one instrument slot at a time
//! - Instrument hosting (presets, SoundFont instruments via rustysynth)
//! - Peak normalization driven by track-name gain annotations
//! - WAV input/output and mixing of the per-track renders

pub mod engine;
pub mod export;
pub mod gain;
pub mod instrument;
pub mod mixer;

pub use engine::{configure_engine_tempo, RenderEngine, RenderResult};
pub use export::{read_wav, write_wav, WavSampleFormat};
pub use gain::{normalize, TargetGainDb};
pub use instrument::{create_slot, Instrument, PluginHost, Preset, SoundFontHost, SynthesizerSlot};
pub use mixer::{FfmpegMixer, InternalMixer, Mixer};
