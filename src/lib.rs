//! songmaker - Renders a multi-track MIDI file through one instrument per track.
//!
//! Each instrument track is rendered alone, peak-normalized to its own
//! target level, and the results are mixed into a single WAV file.

pub mod audio;
pub mod config;
pub mod error;
pub mod janitor;
pub mod midi;
pub mod pipeline;
pub mod router;

// Re-export commonly used types
pub use audio::{FfmpegMixer, InternalMixer, Mixer, PluginHost, SoundFontHost};
pub use config::{MixerKind, RenderConfig, SlotConfig};
pub use error::{PipelineError, Result};
pub use midi::MidiDocument;
pub use pipeline::{run, RunSummary};
