//! songmaker - Renders a multi-track MIDI file into one mixed WAV.
//!
//! Track 0 of the input supplies the tempo. Every other track is played by
//! the synthesizer slot at the same position in the config, normalized to
//! its target peak, and mixed.
//!
//! # Usage
//!
//! ```bash
//! songmaker render.json                  # Render and mix with ffmpeg
//! songmaker render.json --mixer internal # Mix without ffmpeg
//! songmaker render.json --inspect        # Print tempo and track lengths
//! songmaker render.json --events         # Also list every event per track
//! ```
//!
//! Set `RUST_LOG=debug` for per-track details.

use songmaker::audio::SoundFontHost;
use songmaker::config::{MixerKind, RenderConfig};
use songmaker::midi::analyzer::{event_listing, summarize};
use songmaker::midi::MidiDocument;
use songmaker::pipeline::{build_mixer, run};

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Command-line options for the application.
struct CliOptions {
    /// Render config file (JSON).
    config: PathBuf,
    /// Overrides the config's input MIDI file.
    midi: Option<PathBuf>,
    /// Overrides the config's output path.
    output: Option<PathBuf>,
    /// Overrides the config's mixer.
    mixer: Option<MixerKind>,
    /// Overrides the config's makeup gain.
    makeup_gain_db: Option<f64>,
    /// Keep per-track renders.
    keep_renders: bool,
    /// Print the analysis and exit without rendering.
    inspect: bool,
    /// With `inspect`, also list every event.
    events: bool,
}

fn print_help(program: &str) {
    eprintln!("songmaker - Render a multi-track MIDI file through one instrument per track");
    eprintln!();
    eprintln!("Usage: {} <CONFIG> [OPTIONS]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --midi PATH             Input MIDI file (overrides config)");
    eprintln!("  -o, --output PATH       Mixed WAV file (overrides config)");
    eprintln!("  --mixer ffmpeg|internal Mixer to use (overrides config)");
    eprintln!("  --makeup-gain DB        Gain after mixing, in dB (overrides config)");
    eprintln!("  --keep-renders          Keep the per-track WAV files");
    eprintln!("  --inspect               Print tempo and track lengths, then exit");
    eprintln!("  --events                Like --inspect, and list every event per track");
    eprintln!("  -h, --help              Print this help message");
}

impl CliOptions {
    /// Parses command-line arguments.
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let program = args.first().map(String::as_str).unwrap_or("songmaker");
        let mut config = None;
        let mut midi = None;
        let mut output = None;
        let mut mixer = None;
        let mut makeup_gain_db = None;
        let mut keep_renders = false;
        let mut inspect = false;
        let mut events = false;
        let mut i = 1;

        let value = |i: usize, flag: &str| -> Result<&String> {
            args.get(i)
                .with_context(|| format!("{} requires an argument", flag))
        };

        while i < args.len() {
            match args[i].as_str() {
                "--midi" => {
                    i += 1;
                    midi = Some(PathBuf::from(value(i, "--midi")?));
                }
                "--output" | "-o" => {
                    i += 1;
                    output = Some(PathBuf::from(value(i, "--output")?));
                }
                "--mixer" => {
                    i += 1;
                    let kind = value(i, "--mixer")?
                        .parse::<MixerKind>()
                        .map_err(anyhow::Error::msg)?;
                    mixer = Some(kind);
                }
                "--makeup-gain" => {
                    i += 1;
                    let raw = value(i, "--makeup-gain")?;
                    let db = raw
                        .parse::<f64>()
                        .with_context(|| format!("invalid gain '{}'", raw))?;
                    makeup_gain_db = Some(db);
                }
                "--keep-renders" => keep_renders = true,
                "--inspect" => inspect = true,
                "--events" => {
                    inspect = true;
                    events = true;
                }
                "--help" | "-h" => {
                    print_help(program);
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    eprintln!("Unknown option: {}", other);
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
                other => {
                    if config.is_some() {
                        anyhow::bail!("unexpected argument '{}'", other);
                    }
                    config = Some(PathBuf::from(other));
                }
            }
            i += 1;
        }

        let Some(config) = config else {
            print_help(program);
            std::process::exit(1);
        };

        Ok(Self {
            config,
            midi,
            output,
            mixer,
            makeup_gain_db,
            keep_renders,
            inspect,
            events,
        })
    }

    /// Applies command-line overrides on top of the loaded config.
    fn apply(&self, config: &mut RenderConfig) {
        if let Some(midi) = &self.midi {
            config.midi_path = midi.clone();
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if let Some(mixer) = self.mixer {
            config.mixer = mixer;
        }
        if let Some(db) = self.makeup_gain_db {
            config.makeup_gain_db = db;
        }
        if self.keep_renders {
            config.keep_renders = true;
        }
    }
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = RenderConfig::load_from_file(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    cli.apply(&mut config);

    if cli.inspect {
        let document = MidiDocument::load(&config.midi_path)
            .with_context(|| format!("Failed to read {}", config.midi_path.display()))?;
        if cli.events {
            print!("{}", event_listing(&document));
        }
        println!("{}", summarize(&document, config.tail_seconds));
        return Ok(());
    }

    let host = SoundFontHost::new(config.sample_rate);
    let mixer = build_mixer(&config);
    let summary = run(&config, &host, mixer.as_ref()).context("Render failed")?;

    for track in &summary.tracks {
        println!(
            "Track {} -> {} (target {} dB{})",
            track.track_index,
            track.slot_name,
            track.target_db,
            if track.was_silent() { ", silent" } else { "" }
        );
    }
    for index in &summary.skipped_tracks {
        println!("Track {} skipped: no slot", index);
    }
    for path in &summary.kept_files {
        println!("Kept {}", path.display());
    }
    println!("Mixed audio saved to {}", summary.output_path.display());
    Ok(())
}
