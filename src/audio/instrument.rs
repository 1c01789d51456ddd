//! Instrument hosting: presets, plugin hosts, and synthesizer slots.
//!
//! A [`PluginHost`] turns a plugin path plus a [`Preset`] into a callable
//! [`Instrument`]. The bundled [`SoundFontHost`] treats the plugin path as a
//! SoundFont and renders it with rustysynth.

use crate::error::{PipelineError, Result};
use crate::midi::MidiDocument;
use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Number of MIDI channels a preset is applied to.
const MIDI_CHANNELS: u8 = 16;

/// A sound-producing unit driven by channel messages.
pub trait Instrument {
    fn name(&self) -> &str;

    fn input_channels(&self) -> usize {
        0
    }

    fn output_channels(&self) -> usize {
        2
    }

    /// Returns the instrument to its freshly-loaded state, preset applied.
    fn reset(&mut self);

    fn process_midi_message(&mut self, channel: u8, command: u8, data1: u8, data2: u8);

    /// Renders `left.len()` frames. Both slices have the same length.
    fn render(&mut self, left: &mut [f32], right: &mut [f32]);
}

/// Creates instruments from plugin binaries and presets.
pub trait PluginHost {
    fn instantiate(
        &self,
        name: &str,
        plugin: &Path,
        preset: &Preset,
    ) -> Result<Box<dyn Instrument>>;
}

/// On-disk preset encodings, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetFormat {
    /// `.json`
    Json,
    /// `.bin` (bincode)
    Binary,
}

impl PresetFormat {
    /// Picks the format for `path`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedFormat` for any other extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "json" => Ok(PresetFormat::Json),
            "bin" => Ok(PresetFormat::Binary),
            _ => Err(PipelineError::UnsupportedFormat {
                kind: "preset",
                path: path.to_path_buf(),
                extension,
            }),
        }
    }
}

fn default_volume() -> u8 {
    100
}

fn default_pan() -> u8 {
    64
}

/// Instrument settings applied to every channel on load and reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    /// Bank number (0 = General MIDI melodic bank).
    #[serde(default)]
    pub bank: u8,

    /// Program number (0-127).
    #[serde(default)]
    pub program: u8,

    /// Channel volume, CC 7 (0-127).
    #[serde(default = "default_volume")]
    pub volume: u8,

    /// Pan position, CC 10 (0=left, 64=center, 127=right).
    #[serde(default = "default_pan")]
    pub pan: u8,
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            bank: 0,
            program: 0,
            volume: default_volume(),
            pan: default_pan(),
        }
    }
}

impl Preset {
    /// Loads a preset, picking the decoder from the extension.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedFormat` for unknown extensions, or a decode error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = PresetFormat::from_path(path)?;
        let data = fs::read(path)?;
        let preset: Preset = match format {
            PresetFormat::Json => serde_json::from_slice(&data)?,
            PresetFormat::Binary => bincode::deserialize(&data)?,
        };
        preset.validate(path)?;
        Ok(preset)
    }

    /// Saves the preset in the format its extension selects.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let data = match PresetFormat::from_path(path)? {
            PresetFormat::Json => serde_json::to_vec_pretty(self)?,
            PresetFormat::Binary => bincode::serialize(self)?,
        };
        fs::write(path, data)?;
        Ok(())
    }

    fn validate(&self, path: &Path) -> Result<()> {
        for (field, value) in [
            ("program", self.program),
            ("volume", self.volume),
            ("pan", self.pan),
        ] {
            if value > 127 {
                return Err(PipelineError::Preset {
                    path: path.to_path_buf(),
                    reason: format!("{} must be 0-127, got {}", field, value),
                });
            }
        }
        Ok(())
    }
}

/// A channel message placed on the beat grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledMessage {
    /// Position in engine beats from the start of the sequence.
    pub beat: f64,
    /// `(channel, command, data1, data2)`
    pub message: (u8, u8, u8, u8),
}

/// One instrument plus the performance it will play.
pub struct SynthesizerSlot {
    name: String,
    instrument: Box<dyn Instrument>,
    sequence: Vec<ScheduledMessage>,
}

impl SynthesizerSlot {
    pub fn new(name: impl Into<String>, instrument: Box<dyn Instrument>) -> Self {
        Self {
            name: name.into(),
            instrument,
            sequence: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instrument(&self) -> &dyn Instrument {
        self.instrument.as_ref()
    }

    pub fn instrument_mut(&mut self) -> &mut dyn Instrument {
        self.instrument.as_mut()
    }

    pub fn sequence(&self) -> &[ScheduledMessage] {
        &self.sequence
    }

    /// Replaces the loaded performance. Messages are kept in beat order.
    pub fn set_sequence(&mut self, mut sequence: Vec<ScheduledMessage>) {
        sequence.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        self.sequence = sequence;
    }

    pub(crate) fn sequence_and_instrument(&mut self) -> (&[ScheduledMessage], &mut dyn Instrument) {
        (&self.sequence, self.instrument.as_mut())
    }

    /// Loads a MIDI file as this slot's performance, with time in beats.
    ///
    /// Positions are stored as `ticks / ticks_per_beat`, so the engine tempo
    /// alone decides playback speed. Meta and system exclusive events are
    /// dropped.
    pub fn load_midi<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let document = MidiDocument::load(path)?;
        let tpb = document.ticks_per_beat.max(1) as f64;

        let mut sequence = Vec::new();
        for track in document.tracks() {
            let mut tick = 0u64;
            for event in track.events() {
                tick += event.delta as u64;
                if let Some(message) = event.kind.channel_message() {
                    sequence.push(ScheduledMessage {
                        beat: tick as f64 / tpb,
                        message,
                    });
                }
            }
        }

        tracing::debug!("{} loaded {} messages", self.name, sequence.len());
        self.set_sequence(sequence);
        Ok(())
    }
}

/// Builds a slot: picks the preset format, loads it, and instantiates the plugin.
///
/// # Errors
///
/// Returns `UnsupportedFormat` for unknown preset extensions before the
/// plugin is touched.
pub fn create_slot(
    host: &dyn PluginHost,
    name: &str,
    plugin: &Path,
    preset_path: &Path,
) -> Result<SynthesizerSlot> {
    let preset = Preset::load(preset_path)?;
    let instrument = host.instantiate(name, plugin, &preset)?;
    tracing::info!(
        "Loaded {} from {} with preset {}",
        name,
        plugin.display(),
        preset_path.display()
    );
    Ok(SynthesizerSlot::new(name, instrument))
}

/// Hosts SoundFont (.sf2) files as instruments.
///
/// Each distinct SoundFont is read once and shared between slots.
pub struct SoundFontHost {
    sample_rate: u32,
    loaded: RefCell<HashMap<PathBuf, Arc<SoundFont>>>,
}

impl SoundFontHost {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            loaded: RefCell::new(HashMap::new()),
        }
    }

    fn soundfont(&self, path: &Path) -> std::result::Result<Arc<SoundFont>, String> {
        if let Some(sf) = self.loaded.borrow().get(path) {
            return Ok(Arc::clone(sf));
        }

        let file = File::open(path).map_err(|e| e.to_string())?;
        let mut reader = BufReader::new(file);
        let soundfont =
            Arc::new(SoundFont::new(&mut reader).map_err(|e| format!("{:?}", e))?);
        self.loaded
            .borrow_mut()
            .insert(path.to_path_buf(), Arc::clone(&soundfont));
        Ok(soundfont)
    }
}

impl PluginHost for SoundFontHost {
    fn instantiate(
        &self,
        name: &str,
        plugin: &Path,
        preset: &Preset,
    ) -> Result<Box<dyn Instrument>> {
        let load_error = |reason: String| PipelineError::InstrumentLoad {
            name: name.to_string(),
            path: plugin.to_path_buf(),
            reason,
        };

        let soundfont = self.soundfont(plugin).map_err(load_error)?;

        let has_preset = soundfont.get_presets().iter().any(|p| {
            p.get_bank_number() == preset.bank as i32
                && p.get_patch_number() == preset.program as i32
        });
        if !has_preset {
            tracing::warn!(
                "{}: SoundFont has no preset at bank {} program {}, synthesizer will fall back",
                name,
                preset.bank,
                preset.program
            );
        }

        let settings = SynthesizerSettings::new(self.sample_rate as i32);
        let synth = Synthesizer::new(&soundfont, &settings)
            .map_err(|e| load_error(format!("Failed to create synthesizer: {:?}", e)))?;

        let mut instrument = SoundFontInstrument {
            name: name.to_string(),
            synth,
            preset: preset.clone(),
        };
        instrument.reset();
        Ok(Box::new(instrument))
    }
}

/// A rustysynth synthesizer with a preset applied to all channels.
pub struct SoundFontInstrument {
    name: String,
    synth: Synthesizer,
    preset: Preset,
}

impl SoundFontInstrument {
    fn apply_preset(&mut self) {
        for channel in 0..MIDI_CHANNELS as i32 {
            // Bank select (CC 0), then program change
            self.synth
                .process_midi_message(channel, 0xB0, 0, self.preset.bank as i32);
            self.synth
                .process_midi_message(channel, 0xC0, self.preset.program as i32, 0);
            // Volume (CC 7) and pan (CC 10)
            self.synth
                .process_midi_message(channel, 0xB0, 7, self.preset.volume as i32);
            self.synth
                .process_midi_message(channel, 0xB0, 10, self.preset.pan as i32);
        }
    }
}

impl Instrument for SoundFontInstrument {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset(&mut self) {
        self.synth.reset();
        self.apply_preset();
    }

    fn process_midi_message(&mut self, channel: u8, command: u8, data1: u8, data2: u8) {
        self.synth
            .process_midi_message(channel as i32, command as i32, data1 as i32, data2 as i32);
    }

    fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.synth.render(left, right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{write_single_track, EventKind, MidiEvent};

    struct Silent;

    impl Instrument for Silent {
        fn name(&self) -> &str {
            "silent"
        }
        fn reset(&mut self) {}
        fn process_midi_message(&mut self, _: u8, _: u8, _: u8, _: u8) {}
        fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
            left.fill(0.0);
            right.fill(0.0);
        }
    }

    struct SilentHost;

    impl PluginHost for SilentHost {
        fn instantiate(&self, _: &str, _: &Path, _: &Preset) -> Result<Box<dyn Instrument>> {
            Ok(Box::new(Silent))
        }
    }

    #[test]
    fn test_preset_format_from_extension() {
        assert_eq!(
            PresetFormat::from_path(Path::new("a/lead.json")).unwrap(),
            PresetFormat::Json
        );
        assert_eq!(
            PresetFormat::from_path(Path::new("bass.BIN")).unwrap(),
            PresetFormat::Binary
        );
        assert!(matches!(
            PresetFormat::from_path(Path::new("pad.vstpreset")),
            Err(PipelineError::UnsupportedFormat { kind: "preset", .. })
        ));
        assert!(PresetFormat::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn test_preset_save_and_load_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let preset = Preset {
            bank: 0,
            program: 33,
            volume: 90,
            pan: 40,
        };
        for file in ["bass.json", "bass.bin"] {
            let path = dir.path().join(file);
            preset.save(&path).unwrap();
            assert_eq!(Preset::load(&path).unwrap(), preset);
        }
    }

    #[test]
    fn test_json_preset_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lead.json");
        fs::write(&path, r#"{ "program": 81 }"#).unwrap();
        let preset = Preset::load(&path).unwrap();
        assert_eq!(preset.program, 81);
        assert_eq!(preset.volume, 100);
        assert_eq!(preset.pan, 64);
    }

    #[test]
    fn test_preset_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{ "program": 200 }"#).unwrap();
        assert!(matches!(
            Preset::load(&path),
            Err(PipelineError::Preset { .. })
        ));
    }

    #[test]
    fn test_create_slot_rejects_unknown_preset_before_loading() {
        let err = create_slot(
            &SilentHost,
            "my_synth_1",
            Path::new("missing.sf2"),
            Path::new("clappy.vstpreset"),
        )
        .err()
        .unwrap();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_soundfont_host_missing_file() {
        let host = SoundFontHost::new(44100);
        let err = host
            .instantiate("synth", Path::new("/nonexistent/font.sf2"), &Preset::default())
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::InstrumentLoad { .. }));
    }

    #[test]
    fn test_load_midi_in_beats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("part.mid");
        let events = vec![
            MidiEvent::new(
                0,
                EventKind::NoteOn {
                    channel: 0,
                    key: 60,
                    velocity: 100,
                },
            ),
            MidiEvent::new(
                240,
                EventKind::NoteOff {
                    channel: 0,
                    key: 60,
                    velocity: 0,
                },
            ),
        ];
        write_single_track(&events, 480, &path).unwrap();

        let mut slot = SynthesizerSlot::new("s", Box::new(Silent));
        slot.load_midi(&path).unwrap();
        let sequence = slot.sequence();
        assert_eq!(sequence.len(), 2);
        assert_eq!(sequence[0].beat, 0.0);
        assert_eq!(sequence[0].message, (0, 0x90, 60, 100));
        // An eighth note is one engine beat
        assert_eq!(sequence[1].beat, 1.0);
    }

    #[test]
    fn test_set_sequence_sorts_by_beat() {
        let mut slot = SynthesizerSlot::new("s", Box::new(Silent));
        slot.set_sequence(vec![
            ScheduledMessage {
                beat: 2.0,
                message: (0, 0x80, 60, 0),
            },
            ScheduledMessage {
                beat: 0.5,
                message: (0, 0x90, 60, 1),
            },
        ]);
        assert_eq!(slot.sequence()[0].beat, 0.5);
    }
}
