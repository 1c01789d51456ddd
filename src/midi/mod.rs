//! MIDI document model, analysis, and single-track artifact writing.
//!
//! A loaded [`MidiDocument`] is read-only for the whole run. Track 0 carries
//! tempo and other meta data; tracks 1..N carry the performances that get
//! routed to instruments.

pub mod analyzer;
mod document;
mod midi_export;

pub use document::{EventKind, MidiDocument, MidiEvent, Track};
pub use midi_export::write_single_track;

/// Tempo assumed when track 0 has no tempo event (120 BPM).
pub const DEFAULT_MICROS_PER_BEAT: u32 = 500_000;

/// Numerator of the engine tempo formula.
///
/// The render engine counts eighth-note pulses, so its tempo for a quarter
/// note of `us` microseconds is `120_000_000 / us`.
pub const ENGINE_TEMPO_NUMERATOR: f64 = 120_000_000.0;

/// Ticks per engine beat (eighth note) in written artifacts.
pub const ARTIFACT_TICKS_PER_BEAT: u16 = 480;

/// Artifact ticks per quarter note. Source deltas are rescaled to this.
pub const ARTIFACT_TICKS_PER_QUARTER: u32 = ARTIFACT_TICKS_PER_BEAT as u32 * 2;

/// Converts ticks to seconds at a fixed tempo.
///
/// # Arguments
///
/// * `ticks` - Number of ticks
/// * `ticks_per_beat` - Resolution of the file (pulses per quarter note)
/// * `micros_per_beat` - Tempo in microseconds per quarter note
///
/// # Returns
///
/// Duration in seconds
pub fn ticks_to_seconds(ticks: u64, ticks_per_beat: u16, micros_per_beat: u32) -> f64 {
    if ticks_per_beat == 0 {
        return 0.0;
    }
    let beats = ticks as f64 / ticks_per_beat as f64;
    beats * micros_per_beat as f64 / 1_000_000.0
}

/// Converts a tempo in microseconds per quarter note to engine beats per minute.
pub fn engine_bpm(micros_per_beat: u32) -> f64 {
    ENGINE_TEMPO_NUMERATOR / micros_per_beat as f64
}

/// Scales ticks from a source resolution to the artifact resolution.
pub(crate) fn scale_ticks(source_ticks: u32, source_tpb: u16) -> u32 {
    let source_tpb = source_tpb.max(1) as u64;
    if source_tpb == ARTIFACT_TICKS_PER_QUARTER as u64 {
        source_ticks
    } else {
        // u64 avoids overflow on long deltas
        ((source_ticks as u64 * ARTIFACT_TICKS_PER_QUARTER as u64) / source_tpb) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_to_seconds() {
        // At 500 000 us per beat, one beat = 0.5 seconds
        let seconds = ticks_to_seconds(480, 480, DEFAULT_MICROS_PER_BEAT);
        assert!((seconds - 0.5).abs() < 1e-9);

        let seconds = ticks_to_seconds(960 * 4, 960, 1_000_000);
        assert!((seconds - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_resolution_is_zero_seconds() {
        assert_eq!(ticks_to_seconds(1000, 0, DEFAULT_MICROS_PER_BEAT), 0.0);
    }

    #[test]
    fn test_engine_bpm() {
        assert!((engine_bpm(500_000) - 240.0).abs() < 1e-9);
        assert!((engine_bpm(1_000_000) - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_scale_ticks() {
        assert_eq!(scale_ticks(960, 960), 960);
        assert_eq!(scale_ticks(480, 480), 960);
        assert_eq!(scale_ticks(96, 96), 960);
        assert_eq!(scale_ticks(0, 480), 0);
    }
}
