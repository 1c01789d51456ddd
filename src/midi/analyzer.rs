//! Tempo and duration analysis of a loaded document.

use super::{ticks_to_seconds, EventKind, MidiDocument, Track, DEFAULT_MICROS_PER_BEAT};

/// Seconds of padding added after the longest track for release tails.
pub const DEFAULT_TAIL_SECONDS: f64 = 2.0;

/// Returns the first tempo found in track 0, in microseconds per quarter note.
///
/// Other tracks are never consulted. A zero tempo counts as absent, the same
/// way the engine ignores it.
pub fn extract_tempo(document: &MidiDocument) -> Option<u32> {
    document
        .tempo_track()?
        .events()
        .iter()
        .find_map(|e| match e.kind {
            EventKind::Tempo(us) => Some(us),
            _ => None,
        })
        .filter(|us| *us > 0)
}

/// Length of a track in ticks.
///
/// Sums deltas up to and including the first end-of-track marker, or the
/// whole track when there is none.
pub fn track_duration_ticks(track: &Track) -> u64 {
    let mut total = 0u64;
    for event in track.events() {
        total += event.delta as u64;
        if event.kind == EventKind::EndOfTrack {
            break;
        }
    }
    total
}

/// Finds the longest track as `(index, ticks)`. The first index wins ties.
///
/// Returns None when no track has any length.
pub fn longest_track(document: &MidiDocument) -> Option<(usize, u64)> {
    let mut longest: Option<(usize, u64)> = None;
    for track in document.tracks() {
        let ticks = track_duration_ticks(track);
        let best = longest.map_or(0, |(_, t)| t);
        if ticks > best {
            longest = Some((track.index, ticks));
        }
    }
    longest
}

/// Duration of the longest track in seconds, at the tempo found in track 0.
pub fn longest_duration_seconds(document: &MidiDocument) -> f64 {
    let ticks = longest_track(document).map(|(_, t)| t).unwrap_or(0);
    let tempo = extract_tempo(document).unwrap_or(DEFAULT_MICROS_PER_BEAT);
    ticks_to_seconds(ticks, document.ticks_per_beat, tempo)
}

/// How long each track is rendered for: the longest track plus `tail_seconds`.
pub fn render_duration_with_tail(document: &MidiDocument, tail_seconds: f64) -> f64 {
    longest_duration_seconds(document) + tail_seconds
}

/// Render length with the standard two-second tail.
pub fn render_duration(document: &MidiDocument) -> f64 {
    render_duration_with_tail(document, DEFAULT_TAIL_SECONDS)
}

/// Per-track figures reported by [`summarize`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSummary {
    pub index: usize,
    pub name: Option<String>,
    pub ticks: u64,
    pub seconds: f64,
    pub target_db: Option<f64>,
}

/// Tempo and length figures for a whole document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSummary {
    pub ticks_per_beat: u16,
    /// Tempo from track 0, if present.
    pub tempo: Option<u32>,
    pub tracks: Vec<TrackSummary>,
    /// `(index, ticks)` of the longest track, if any track has a length.
    pub longest: Option<(usize, u64)>,
    pub longest_seconds: f64,
    pub render_seconds: f64,
}

/// Collects everything the analyzer knows about `document`.
pub fn summarize(document: &MidiDocument, tail_seconds: f64) -> DocumentSummary {
    let tempo = extract_tempo(document);
    let resolved = tempo.unwrap_or(DEFAULT_MICROS_PER_BEAT);
    let tracks = document
        .tracks()
        .iter()
        .map(|track| {
            let ticks = track_duration_ticks(track);
            TrackSummary {
                index: track.index,
                name: track.name.clone(),
                ticks,
                seconds: ticks_to_seconds(ticks, document.ticks_per_beat, resolved),
                target_db: track.target_gain.map(|g| g.db()),
            }
        })
        .collect();

    DocumentSummary {
        ticks_per_beat: document.ticks_per_beat,
        tempo,
        tracks,
        longest: longest_track(document),
        longest_seconds: longest_duration_seconds(document),
        render_seconds: render_duration_with_tail(document, tail_seconds),
    }
}

impl std::fmt::Display for DocumentSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.tempo {
            Some(us) => writeln!(
                f,
                "Tempo: {} us per beat ({:.2} BPM)",
                us,
                60_000_000.0 / us as f64
            )?,
            None => writeln!(f, "Tempo: none in track 0 (assuming 120 BPM)")?,
        }
        writeln!(f, "Resolution: {} ticks per beat", self.ticks_per_beat)?;
        for track in &self.tracks {
            write!(
                f,
                "Track {}: {} ticks, {:.2} s",
                track.index, track.ticks, track.seconds
            )?;
            if let Some(name) = &track.name {
                write!(f, " [{}]", name)?;
            }
            if let Some(db) = track.target_db {
                write!(f, " target {} dB", db)?;
            }
            writeln!(f)?;
        }
        match self.longest {
            Some((index, _)) => writeln!(
                f,
                "The longest track is Track {} with a length of {:.2} seconds.",
                index, self.longest_seconds
            )?,
            None => writeln!(f, "No track has any length.")?,
        }
        write!(f, "Render duration: {:.2} s", self.render_seconds)
    }
}

/// Lists every event of every track, one per line, with its delta time.
pub fn event_listing(document: &MidiDocument) -> String {
    let mut out = String::new();
    for track in document.tracks() {
        out.push_str(&format!(
            "Track {}: {}\n",
            track.index,
            track.name.as_deref().unwrap_or("(unnamed)")
        ));
        for event in track.events() {
            out.push_str(&format!("  {} time={}\n", event.kind, event.delta));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiEvent;

    fn note(delta: u32) -> MidiEvent {
        MidiEvent::new(
            delta,
            EventKind::NoteOn {
                channel: 0,
                key: 60,
                velocity: 90,
            },
        )
    }

    fn doc(tracks: Vec<Vec<MidiEvent>>) -> MidiDocument {
        let tracks = tracks
            .into_iter()
            .enumerate()
            .map(|(i, events)| Track::new(i, events))
            .collect();
        MidiDocument::new(480, tracks)
    }

    #[test]
    fn test_extract_tempo_first_event_of_track_zero() {
        let d = doc(vec![
            vec![
                MidiEvent::new(0, EventKind::TrackName("meta".into())),
                MidiEvent::new(0, EventKind::Tempo(400_000)),
                MidiEvent::new(960, EventKind::Tempo(600_000)),
            ],
            vec![MidiEvent::new(0, EventKind::Tempo(300_000))],
        ]);
        assert_eq!(extract_tempo(&d), Some(400_000));
    }

    #[test]
    fn test_extract_tempo_ignores_other_tracks() {
        let d = doc(vec![
            vec![MidiEvent::new(0, EventKind::EndOfTrack)],
            vec![MidiEvent::new(0, EventKind::Tempo(300_000))],
        ]);
        assert_eq!(extract_tempo(&d), None);
        assert_eq!(extract_tempo(&MidiDocument::new(480, Vec::new())), None);
    }

    #[test]
    fn test_track_duration_stops_at_end_of_track() {
        let track = Track::new(
            1,
            vec![
                note(100),
                note(200),
                MidiEvent::new(50, EventKind::EndOfTrack),
                note(1000),
            ],
        );
        assert_eq!(track_duration_ticks(&track), 350);
    }

    #[test]
    fn test_track_duration_without_marker() {
        let track = Track::new(1, vec![note(10), note(20), note(30)]);
        assert_eq!(track_duration_ticks(&track), 60);
        assert_eq!(track_duration_ticks(&Track::new(1, Vec::new())), 0);
    }

    #[test]
    fn test_longest_track_first_wins_ties() {
        let d = doc(vec![
            vec![MidiEvent::new(0, EventKind::Tempo(500_000))],
            vec![note(960)],
            vec![note(960)],
        ]);
        assert_eq!(longest_track(&d), Some((1, 960)));
    }

    #[test]
    fn test_longest_track_none_when_all_empty() {
        let d = doc(vec![
            vec![MidiEvent::new(0, EventKind::Tempo(500_000))],
            vec![MidiEvent::new(0, EventKind::EndOfTrack)],
        ]);
        assert_eq!(longest_track(&d), None);
        assert_eq!(longest_duration_seconds(&d), 0.0);
        assert_eq!(longest_track(&MidiDocument::new(480, Vec::new())), None);

        let text = summarize(&d, 2.0).to_string();
        assert!(!text.contains("The longest track is"));
        assert!(text.contains("No track has any length."));
    }

    #[test]
    fn test_zero_tempo_counts_as_absent() {
        let d = doc(vec![
            vec![
                MidiEvent::new(0, EventKind::Tempo(0)),
                MidiEvent::new(0, EventKind::Tempo(1_000_000)),
            ],
            vec![note(480 * 4)],
        ]);
        assert_eq!(extract_tempo(&d), None);
        // Falls back to 120 BPM instead of collapsing to zero seconds
        assert!((longest_duration_seconds(&d) - 2.0).abs() < 1e-9);
        assert!((render_duration(&d) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_longest_duration_uses_default_tempo() {
        let d = doc(vec![vec![], vec![note(480 * 4)]]);
        // 4 beats at 120 BPM
        assert!((longest_duration_seconds(&d) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_longest_duration_uses_track_zero_tempo() {
        let d = doc(vec![
            vec![MidiEvent::new(0, EventKind::Tempo(1_000_000))],
            vec![note(480 * 3)],
        ]);
        assert!((longest_duration_seconds(&d) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_summarize() {
        let d = MidiDocument::new(
            480,
            vec![
                Track::new(0, vec![MidiEvent::new(0, EventKind::Tempo(500_000))]),
                Track::new(
                    1,
                    vec![
                        MidiEvent::new(0, EventKind::TrackName("Snare_v-3dB".into())),
                        note(960),
                    ],
                ),
            ],
        );
        let summary = summarize(&d, 2.0);
        assert_eq!(summary.tempo, Some(500_000));
        assert_eq!(summary.longest, Some((1, 960)));
        assert_eq!(summary.tracks[1].target_db, Some(-3.0));
        assert!((summary.tracks[1].seconds - 1.0).abs() < 1e-9);
        assert!((summary.render_seconds - 3.0).abs() < 1e-9);

        let text = summary.to_string();
        assert!(text.contains("The longest track is Track 1"));
        assert!(text.contains("Snare_v-3dB"));
    }

    #[test]
    fn test_event_listing() {
        let d = doc(vec![
            vec![MidiEvent::new(0, EventKind::Tempo(500_000))],
            vec![
                MidiEvent::new(0, EventKind::TrackName("Kick".into())),
                note(96),
                MidiEvent::new(
                    0,
                    EventKind::PitchBend {
                        channel: 1,
                        value: 8192,
                    },
                ),
                MidiEvent::new(0, EventKind::EndOfTrack),
            ],
        ]);
        let listing = event_listing(&d);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Track 0: (unnamed)",
                "  set_tempo tempo=500000 time=0",
                "Track 1: Kick",
                "  track_name name=\"Kick\" time=0",
                "  note_on channel=0 note=60 velocity=90 time=96",
                "  pitchwheel channel=1 pitch=0 time=0",
                "  end_of_track time=0",
            ]
        );
    }

    #[test]
    fn test_render_duration_adds_tail() {
        let d = doc(vec![vec![], vec![note(480)], vec![note(480 * 8)]]);
        let longest = longest_duration_seconds(&d);
        assert!((render_duration(&d) - (longest + 2.0)).abs() < 1e-9);
        assert!(render_duration(&d) >= longest + 2.0);
        assert!((render_duration_with_tail(&d, 0.5) - (longest + 0.5)).abs() < 1e-9);
    }
}
