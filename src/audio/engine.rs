//! Offline render engine.
//!
//! One engine renders one slot at a time: `render_slot` takes the engine by
//! exclusive reference, installs the slot as the only node of the graph, and
//! runs it for a fixed duration. The engine is deliberately not `Clone`.

use super::instrument::SynthesizerSlot;
use crate::midi::{engine_bpm, DEFAULT_MICROS_PER_BEAT};

/// Sample rate for audio synthesis (44.1 kHz standard).
pub const SAMPLE_RATE: u32 = 44100;

/// Frames rendered per block.
pub const BLOCK_SIZE: usize = 128;

/// A rendered audio buffer, channels x frames.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl RenderResult {
    /// A silent buffer of the given shape.
    pub fn silence(sample_rate: u32, channels: usize, frames: usize) -> Self {
        Self {
            sample_rate,
            channels: vec![vec![0.0; frames]; channels],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// The shared offline renderer.
#[derive(Debug)]
pub struct RenderEngine {
    sample_rate: u32,
    block_size: usize,
    /// Tempo in engine beats (eighth notes) per minute.
    bpm: f64,
    /// Name of the slot currently installed as the graph.
    active_graph: Option<String>,
}

impl RenderEngine {
    /// Creates an engine at its built-in default tempo.
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size: block_size.max(1),
            bpm: engine_bpm(DEFAULT_MICROS_PER_BEAT),
            active_graph: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Sets the global tempo, in engine beats per minute.
    pub fn set_bpm(&mut self, bpm: f64) {
        if bpm > 0.0 && bpm.is_finite() {
            self.bpm = bpm;
        } else {
            tracing::warn!("Ignoring invalid tempo {}", bpm);
        }
    }

    /// Name of the slot installed by the last render, if any.
    pub fn active_graph(&self) -> Option<&str> {
        self.active_graph.as_deref()
    }

    /// Renders `slot` alone for `duration_seconds`.
    ///
    /// The slot is reset, its loaded sequence is played from the start with
    /// beat positions converted at the engine tempo, and the instrument output
    /// is captured block by block. Blocks are split at event positions, so
    /// events land on their exact frame.
    pub fn render_slot(
        &mut self,
        slot: &mut SynthesizerSlot,
        duration_seconds: f64,
    ) -> RenderResult {
        self.active_graph = Some(slot.name().to_string());

        let total_frames = (duration_seconds.max(0.0) * self.sample_rate as f64) as usize;
        let frames_per_beat = self.sample_rate as f64 * 60.0 / self.bpm;
        let channel_count = slot.instrument().output_channels().max(1);

        tracing::debug!(
            "Rendering {} for {:.2}s ({} frames, {:.2} bpm)",
            slot.name(),
            duration_seconds,
            total_frames,
            self.bpm
        );

        slot.instrument_mut().reset();

        let mut left = vec![0.0f32; total_frames];
        let mut right = vec![0.0f32; total_frames];
        let mut current = 0usize;
        let mut event_idx = 0usize;

        while current < total_frames {
            // Dispatch every event due at or before the start of this block,
            // and cut the block short at the next pending event.
            let next_event_frame = {
                let (sequence, instrument) = slot.sequence_and_instrument();
                let mut next = None;
                while let Some(event) = sequence.get(event_idx) {
                    let frame = (event.beat * frames_per_beat) as usize;
                    if frame > current {
                        next = Some(frame);
                        break;
                    }
                    let (channel, command, data1, data2) = event.message;
                    instrument.process_midi_message(channel, command, data1, data2);
                    event_idx += 1;
                }
                next
            };

            let mut frames = (total_frames - current).min(self.block_size);
            if let Some(frame) = next_event_frame {
                frames = frames.min(frame - current);
            }
            slot.instrument_mut().render(
                &mut left[current..current + frames],
                &mut right[current..current + frames],
            );
            current += frames;
        }

        let channels = if channel_count == 1 {
            vec![left]
        } else {
            vec![left, right]
        };

        RenderResult {
            sample_rate: self.sample_rate,
            channels,
        }
    }
}

/// Sets the engine tempo from track 0's tempo, in microseconds per quarter note.
///
/// An absent tempo leaves the engine at its default.
pub fn configure_engine_tempo(engine: &mut RenderEngine, micros_per_beat: Option<u32>) {
    match micros_per_beat {
        Some(us) if us > 0 => {
            let bpm = engine_bpm(us);
            tracing::info!("Engine tempo set to {:.3} bpm ({} us per beat)", bpm, us);
            engine.set_bpm(bpm);
        }
        _ => tracing::info!("No tempo in track 0, engine stays at {:.3} bpm", engine.bpm()),
    }
}
