//! Routing of instrument tracks to synthesizer slots.

use crate::audio::SynthesizerSlot;
use crate::error::Result;
use crate::midi::{write_single_track, MidiEvent, Track};
use std::path::Path;

/// Slot for document track `track_index`, if any.
///
/// Track `i` maps to slot `i - 1` when `1 <= i <= slot_count`. Track 0 and
/// tracks beyond the configured slots are skipped.
pub fn slot_for_track(track_index: usize, slot_count: usize) -> Option<usize> {
    if track_index >= 1 && track_index <= slot_count {
        Some(track_index - 1)
    } else {
        None
    }
}

/// Copies the non-meta events of `track`, deltas untouched.
pub fn filter_performance_events(track: &Track) -> Vec<MidiEvent> {
    track
        .events()
        .iter()
        .filter(|e| !e.is_meta())
        .cloned()
        .collect()
}

/// Writes `events` to `artifact` and loads it into `slot` in beat units.
///
/// # Errors
///
/// Returns `UnsupportedFormat` when `artifact` is not a `.mid` path, or an
/// IO/parse error if the file cannot be written or read back.
pub fn route_track_to_slot(
    slot: &mut SynthesizerSlot,
    events: &[MidiEvent],
    source_ticks_per_beat: u16,
    artifact: &Path,
) -> Result<()> {
    write_single_track(events, source_ticks_per_beat, artifact)?;
    slot.load_midi(artifact)?;
    tracing::debug!(
        "Routed {} events to {} via {}",
        events.len(),
        slot.name(),
        artifact.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Instrument;
    use crate::error::PipelineError;
    use crate::midi::EventKind;

    struct Null;

    impl Instrument for Null {
        fn name(&self) -> &str {
            "null"
        }
        fn reset(&mut self) {}
        fn process_midi_message(&mut self, _: u8, _: u8, _: u8, _: u8) {}
        fn render(&mut self, _: &mut [f32], _: &mut [f32]) {}
    }

    fn performance() -> Track {
        Track::new(
            1,
            vec![
                MidiEvent::new(0, EventKind::TrackName("Bass_v-2dB".into())),
                MidiEvent::new(0, EventKind::ProgramChange { channel: 0, program: 33 }),
                MidiEvent::new(
                    10,
                    EventKind::NoteOn {
                        channel: 0,
                        key: 40,
                        velocity: 100,
                    },
                ),
                MidiEvent::new(5, EventKind::OtherMeta),
                MidiEvent::new(
                    470,
                    EventKind::NoteOff {
                        channel: 0,
                        key: 40,
                        velocity: 0,
                    },
                ),
                MidiEvent::new(0, EventKind::EndOfTrack),
            ],
        )
    }

    #[test]
    fn test_slot_mapping() {
        assert_eq!(slot_for_track(0, 3), None);
        assert_eq!(slot_for_track(1, 3), Some(0));
        assert_eq!(slot_for_track(3, 3), Some(2));
        assert_eq!(slot_for_track(4, 3), None);
        assert_eq!(slot_for_track(1, 0), None);
    }

    #[test]
    fn test_filter_keeps_order_and_deltas() {
        let filtered = filter_performance_events(&performance());
        assert_eq!(filtered.len(), 3);
        assert!(filtered.iter().all(|e| !e.is_meta()));
        let deltas: Vec<_> = filtered.iter().map(|e| e.delta).collect();
        assert_eq!(deltas, vec![0, 10, 470]);
    }

    #[test]
    fn test_route_loads_slot() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("temp_midi_1.mid");
        let mut slot = SynthesizerSlot::new("my_synth_1", Box::new(Null));
        let events = filter_performance_events(&performance());

        route_track_to_slot(&mut slot, &events, 480, &artifact).unwrap();
        assert!(artifact.exists());
        assert_eq!(slot.sequence().len(), 3);
        assert_eq!(slot.sequence()[0].message, (0, 0xC0, 33, 0));
    }

    #[test]
    fn test_route_rejects_bad_artifact_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut slot = SynthesizerSlot::new("my_synth_1", Box::new(Null));
        let err = route_track_to_slot(&mut slot, &[], 480, &dir.path().join("temp.txt"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
    }
}
