//! The track-to-render pipeline.
//!
//! One run goes through these stages, strictly in order:
//!
//! 1. Engine initialized, slots created (unknown preset formats abort here)
//! 2. Tempo from track 0 configured on the engine
//! 3. For each instrument track 1..N with a slot: route, render, normalize
//! 4. Mix the normalized renders
//! 5. Clean up every transient file
//!
//! Every transient path is registered with a [`Janitor`] before the file is
//! created, so step 5 also runs when any earlier step fails.

use crate::audio::gain::{normalize, peak, TargetGainDb};
use crate::audio::{
    configure_engine_tempo, create_slot, write_wav, FfmpegMixer, InternalMixer, Mixer,
    PluginHost, RenderEngine, SynthesizerSlot,
};
use crate::config::{MixerKind, RenderConfig};
use crate::error::{PipelineError, Result};
use crate::janitor::Janitor;
use crate::midi::analyzer::{extract_tempo, render_duration_with_tail};
use crate::midi::MidiDocument;
use crate::router::{filter_performance_events, route_track_to_slot, slot_for_track};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// What happened to one rendered track.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTrack {
    pub track_index: usize,
    pub track_name: Option<String>,
    pub slot_name: String,
    pub target_db: f64,
    /// Peak of the raw render.
    pub source_peak: f32,
    /// Peak after normalization.
    pub output_peak: f32,
}

impl RenderedTrack {
    /// True when the render was silent and passed through unscaled.
    pub fn was_silent(&self) -> bool {
        self.source_peak == 0.0
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub output_path: PathBuf,
    pub render_seconds: f64,
    pub tracks: Vec<RenderedTrack>,
    /// Instrument tracks without a slot.
    pub skipped_tracks: Vec<usize>,
    /// Per-track renders left on disk because `keep_renders` was set.
    pub kept_files: Vec<PathBuf>,
}

/// Builds the mixer the config asks for.
pub fn build_mixer(config: &RenderConfig) -> Box<dyn Mixer> {
    match config.mixer {
        MixerKind::Ffmpeg => Box::new(FfmpegMixer::new(
            config.ffmpeg_path.clone(),
            config.makeup_gain_db,
        )),
        MixerKind::Internal => Box::new(InternalMixer::new(
            config.makeup_gain_db,
            config.sample_format,
        )),
    }
}

/// Instantiates one slot per configured (plugin, preset) pair, in order.
pub fn build_slots(config: &RenderConfig, host: &dyn PluginHost) -> Result<Vec<SynthesizerSlot>> {
    config
        .slots
        .iter()
        .enumerate()
        .map(|(i, slot)| create_slot(host, &slot.display_name(i), &slot.plugin, &slot.preset))
        .collect()
}

/// Runs the whole pipeline for `config`.
///
/// # Errors
///
/// Any error aborts the run. Transient files created so far are still
/// removed.
pub fn run(config: &RenderConfig, host: &dyn PluginHost, mixer: &dyn Mixer) -> Result<RunSummary> {
    config.validate()?;
    mixer.preflight()?;

    let mut engine = RenderEngine::new(config.sample_rate, config.block_size);
    let mut slots = build_slots(config, host)?;
    tracing::info!("Engine initialized with {} slots", slots.len());

    let document = MidiDocument::load(&config.midi_path)?;
    configure_engine_tempo(&mut engine, extract_tempo(&document));

    let render_seconds = config
        .render_seconds
        .unwrap_or_else(|| render_duration_with_tail(&document, config.tail_seconds));
    tracing::info!(
        "Rendering {} instrument tracks for {:.2}s each",
        document.track_count().saturating_sub(1),
        render_seconds
    );

    let work_dir = config.work_dir();
    fs::create_dir_all(&work_dir)?;
    let run_id = Uuid::new_v4().simple().to_string();

    let mut janitor = Janitor::new();
    let mut normalized_files = Vec::new();
    let mut rendered = Vec::new();
    let mut skipped = Vec::new();

    for track in document.instrument_tracks() {
        let Some(slot_index) = slot_for_track(track.index, slots.len()) else {
            tracing::warn!("No slot for {}, skipping", track.label());
            skipped.push(track.index);
            continue;
        };
        let slot = &mut slots[slot_index];
        let _span = tracing::info_span!("track", index = track.index).entered();

        let events = filter_performance_events(track);
        let artifact =
            janitor.track(work_dir.join(format!("temp_midi_{}_{}.mid", run_id, track.index)));
        route_track_to_slot(slot, &events, document.ticks_per_beat, &artifact)?;

        let audio = engine.render_slot(slot, render_seconds);
        tracing::debug!(
            "{} num inputs: {}, num outputs: {}",
            slot.name(),
            slot.instrument().input_channels(),
            slot.instrument().output_channels()
        );
        let raw_path = janitor.track_unless(
            work_dir.join(format!("track_{}_{}.wav", track.index, run_id)),
            config.keep_renders,
        );
        write_wav(&audio, &raw_path, config.sample_format)?;

        let target = TargetGainDb::resolve(track.target_gain, config.default_target_db);
        let source_peak = peak(&audio);
        let normalized = normalize(audio, target);
        let output_peak = peak(&normalized);

        let normalized_path = janitor.track_unless(
            work_dir.join(format!("normalized_track_{}_{}.wav", track.index, run_id)),
            config.keep_renders,
        );
        write_wav(&normalized, &normalized_path, config.sample_format)?;
        normalized_files.push(normalized_path);

        tracing::info!(
            "Rendered {} with {} at {} dB",
            track.label(),
            slot.name(),
            target.db()
        );
        rendered.push(RenderedTrack {
            track_index: track.index,
            track_name: track.name.clone(),
            slot_name: slot.name().to_string(),
            target_db: target.db(),
            source_peak,
            output_peak,
        });
    }

    if normalized_files.is_empty() {
        return Err(PipelineError::NothingToMix);
    }

    mixer.mix(&normalized_files, &config.output_path)?;
    tracing::info!("Mixed audio saved to {}", config.output_path.display());

    let removed = janitor.cleanup();
    tracing::info!("Removed {} temporary files", removed);

    Ok(RunSummary {
        output_path: config.output_path.clone(),
        render_seconds,
        tracks: rendered,
        skipped_tracks: skipped,
        kept_files: janitor.kept().to_vec(),
    })
}
