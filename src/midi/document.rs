//! Standard MIDI File (SMF) loading.
//!
//! Parses .mid files into an owned, read-only document. Supports SMF
//! Format 0 (single track) and Format 1 (multi-track) files with metrical
//! timing.
//!
//! # Limitations
//!
//! - Format 2 (sequential) files are rejected
//! - SMPTE timecode timing is rejected
//! - Meta events other than tempo, track name, and end-of-track are kept only
//!   as opaque `OtherMeta` markers

use crate::audio::gain::{extract_target_db, TargetGainDb};
use crate::error::{PipelineError, Result};
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::fs;
use std::path::Path;

/// The payload of a single MIDI event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    /// Raw 14-bit bend value, 8192 = centre.
    PitchBend { channel: u8, value: u16 },
    PolyAftertouch { channel: u8, key: u8, pressure: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// System exclusive payload, including the terminating 0xF7.
    SysEx(Vec<u8>),
    /// Set tempo, microseconds per quarter note.
    Tempo(u32),
    TrackName(String),
    EndOfTrack,
    OtherMeta,
}

impl EventKind {
    /// Returns true for meta events, which never reach an instrument.
    pub fn is_meta(&self) -> bool {
        matches!(
            self,
            EventKind::Tempo(_)
                | EventKind::TrackName(_)
                | EventKind::EndOfTrack
                | EventKind::OtherMeta
        )
    }

    /// Splits a channel event into `(channel, command, data1, data2)`.
    ///
    /// Returns None for meta and system exclusive events.
    pub fn channel_message(&self) -> Option<(u8, u8, u8, u8)> {
        match *self {
            EventKind::NoteOn {
                channel,
                key,
                velocity,
            } => Some((channel, 0x90, key, velocity)),
            EventKind::NoteOff {
                channel,
                key,
                velocity,
            } => Some((channel, 0x80, key, velocity)),
            EventKind::PolyAftertouch {
                channel,
                key,
                pressure,
            } => Some((channel, 0xA0, key, pressure)),
            EventKind::ControlChange {
                channel,
                controller,
                value,
            } => Some((channel, 0xB0, controller, value)),
            EventKind::ProgramChange { channel, program } => Some((channel, 0xC0, program, 0)),
            EventKind::ChannelPressure { channel, pressure } => {
                Some((channel, 0xD0, pressure, 0))
            }
            EventKind::PitchBend { channel, value } => Some((
                channel,
                0xE0,
                (value & 0x7F) as u8,
                ((value >> 7) & 0x7F) as u8,
            )),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::NoteOn {
                channel,
                key,
                velocity,
            } => write!(f, "note_on channel={} note={} velocity={}", channel, key, velocity),
            EventKind::NoteOff {
                channel,
                key,
                velocity,
            } => write!(f, "note_off channel={} note={} velocity={}", channel, key, velocity),
            EventKind::ControlChange {
                channel,
                controller,
                value,
            } => write!(
                f,
                "control_change channel={} control={} value={}",
                channel, controller, value
            ),
            EventKind::ProgramChange { channel, program } => {
                write!(f, "program_change channel={} program={}", channel, program)
            }
            EventKind::PitchBend { channel, value } => {
                write!(f, "pitchwheel channel={} pitch={}", channel, *value as i32 - 8192)
            }
            EventKind::PolyAftertouch {
                channel,
                key,
                pressure,
            } => write!(f, "polytouch channel={} note={} value={}", channel, key, pressure),
            EventKind::ChannelPressure { channel, pressure } => {
                write!(f, "aftertouch channel={} value={}", channel, pressure)
            }
            EventKind::SysEx(data) => write!(f, "sysex length={}", data.len()),
            EventKind::Tempo(us) => write!(f, "set_tempo tempo={}", us),
            EventKind::TrackName(name) => write!(f, "track_name name={:?}", name),
            EventKind::EndOfTrack => write!(f, "end_of_track"),
            EventKind::OtherMeta => write!(f, "meta"),
        }
    }
}

/// A MIDI event with its delta time (ticks since the previous event).
#[derive(Debug, Clone, PartialEq)]
pub struct MidiEvent {
    pub delta: u32,
    pub kind: EventKind,
}

impl MidiEvent {
    pub fn new(delta: u32, kind: EventKind) -> Self {
        Self { delta, kind }
    }

    pub fn is_meta(&self) -> bool {
        self.kind.is_meta()
    }
}

/// One track of a loaded document.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Position within the document. 0 is the tempo/meta track.
    pub index: usize,

    /// Name from the first track-name event, if any.
    pub name: Option<String>,

    /// Gain annotation parsed from the name (`..._v-6.5dB`).
    pub target_gain: Option<TargetGainDb>,

    events: Vec<MidiEvent>,
}

impl Track {
    /// Builds a track from its events, resolving the name and gain annotation.
    pub fn new(index: usize, events: Vec<MidiEvent>) -> Self {
        let name = events.iter().find_map(|e| match &e.kind {
            EventKind::TrackName(name) => Some(name.clone()),
            _ => None,
        });
        let target_gain = name.as_deref().and_then(extract_target_db);
        Self {
            index,
            name,
            target_gain,
            events,
        }
    }

    pub fn events(&self) -> &[MidiEvent] {
        &self.events
    }

    /// Display name used in diagnostics.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("track {} ({})", self.index, name),
            None => format!("track {}", self.index),
        }
    }
}

/// A parsed MIDI file. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiDocument {
    /// Pulses per quarter note.
    pub ticks_per_beat: u16,
    tracks: Vec<Track>,
}

impl MidiDocument {
    /// Builds a document from already-owned tracks.
    pub fn new(ticks_per_beat: u16, tracks: Vec<Track>) -> Self {
        Self {
            ticks_per_beat,
            tracks,
        }
    }

    /// Loads and parses a Standard MIDI File.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not valid SMF, is a
    /// Format 2 file, or uses timecode timing.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        Self::parse(&data).map_err(|e| match e {
            PipelineError::MidiParse { reason, .. } => PipelineError::MidiParse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parses SMF bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let smf = Smf::parse(data).map_err(|e| PipelineError::MidiParse {
            path: Default::default(),
            reason: e.to_string(),
        })?;

        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(tpb) => tpb.as_int(),
            Timing::Timecode(_, _) => {
                return Err(PipelineError::UnsupportedTiming(
                    "SMPTE timecode timing not supported".to_string(),
                ))
            }
        };

        if smf.header.format == Format::Sequential {
            return Err(PipelineError::MidiParse {
                path: Default::default(),
                reason: "Format 2 (sequential) MIDI files not supported".to_string(),
            });
        }

        let tracks = smf
            .tracks
            .iter()
            .enumerate()
            .map(|(index, events)| {
                let events = events
                    .iter()
                    .map(|e| MidiEvent::new(e.delta.as_int(), convert_kind(&e.kind)))
                    .collect();
                Track::new(index, events)
            })
            .collect();

        Ok(Self {
            ticks_per_beat,
            tracks,
        })
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// The tempo/meta track, if the document has any tracks.
    pub fn tempo_track(&self) -> Option<&Track> {
        self.tracks.first()
    }

    /// Tracks 1..N, in index order.
    pub fn instrument_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().skip(1)
    }
}

/// Converts a borrowed midly event into the owned representation.
fn convert_kind(kind: &TrackEventKind) -> EventKind {
    match *kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } => EventKind::NoteOn {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOff { key, vel } => EventKind::NoteOff {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::Aftertouch { key, vel } => EventKind::PolyAftertouch {
                    channel,
                    key: key.as_int(),
                    pressure: vel.as_int(),
                },
                MidiMessage::Controller { controller, value } => EventKind::ControlChange {
                    channel,
                    controller: controller.as_int(),
                    value: value.as_int(),
                },
                MidiMessage::ProgramChange { program } => EventKind::ProgramChange {
                    channel,
                    program: program.as_int(),
                },
                MidiMessage::ChannelAftertouch { vel } => EventKind::ChannelPressure {
                    channel,
                    pressure: vel.as_int(),
                },
                MidiMessage::PitchBend { bend } => EventKind::PitchBend {
                    channel,
                    value: bend.0.as_int(),
                },
            }
        }
        TrackEventKind::SysEx(data) => EventKind::SysEx(data.to_vec()),
        TrackEventKind::Escape(_) => EventKind::OtherMeta,
        TrackEventKind::Meta(meta) => match meta {
            MetaMessage::Tempo(tempo) => EventKind::Tempo(tempo.as_int()),
            MetaMessage::TrackName(bytes) => {
                EventKind::TrackName(String::from_utf8_lossy(bytes).into_owned())
            }
            MetaMessage::EndOfTrack => EventKind::EndOfTrack,
            _ => EventKind::OtherMeta,
        },
    }
}
