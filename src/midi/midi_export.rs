//! Single-track Standard MIDI File writing.
//!
//! Writes the transient artifact an instrument slot loads its performance
//! from.
//!
//! # Format Details
//!
//! Exports as SMF Format 0 with:
//! - Division: `ARTIFACT_TICKS_PER_BEAT` ticks per engine beat (eighth note)
//! - Deltas rescaled from the source resolution, rounded on absolute time
//! - A trailing end-of-track event, appended when the input lacks one

use super::{scale_ticks, EventKind, MidiEvent, ARTIFACT_TICKS_PER_BEAT};
use crate::error::{PipelineError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes a variable-length quantity (VLQ) used for delta times in MIDI.
///
/// VLQ encodes values using 7 bits per byte, with the MSB indicating
/// whether more bytes follow (1 = more bytes, 0 = last byte).
fn write_vlq(value: u32, buffer: &mut Vec<u8>) {
    if value == 0 {
        buffer.push(0);
        return;
    }

    let mut temp = value;
    let mut bytes = Vec::with_capacity(4);

    while temp > 0 {
        bytes.push((temp & 0x7F) as u8);
        temp >>= 7;
    }

    for (i, &byte) in bytes.iter().rev().enumerate() {
        if i < bytes.len() - 1 {
            buffer.push(byte | 0x80);
        } else {
            buffer.push(byte);
        }
    }
}

/// Writes a single event to the buffer (without delta time).
///
/// Returns false for events that have no byte representation.
fn write_event(kind: &EventKind, buffer: &mut Vec<u8>) -> bool {
    if let Some((channel, command, data1, data2)) = kind.channel_message() {
        buffer.push(command | (channel & 0x0F));
        buffer.push(data1 & 0x7F);
        // Program change and channel pressure carry one data byte
        if command != 0xC0 && command != 0xD0 {
            buffer.push(data2 & 0x7F);
        }
        return true;
    }

    match kind {
        EventKind::SysEx(data) => {
            buffer.push(0xF0);
            write_vlq(data.len() as u32, buffer);
            buffer.extend_from_slice(data);
        }
        EventKind::Tempo(us) => {
            // Meta event: FF 51 03 tt tt tt
            buffer.extend_from_slice(&[0xFF, 0x51, 0x03]);
            buffer.push((us >> 16) as u8);
            buffer.push((us >> 8) as u8);
            buffer.push(*us as u8);
        }
        EventKind::TrackName(name) => {
            // Meta event: FF 03 len text
            buffer.extend_from_slice(&[0xFF, 0x03]);
            let name_bytes = name.as_bytes();
            write_vlq(name_bytes.len() as u32, buffer);
            buffer.extend_from_slice(name_bytes);
        }
        EventKind::EndOfTrack => {
            buffer.extend_from_slice(&[0xFF, 0x2F, 0x00]);
        }
        _ => return false,
    }
    true
}

/// Builds the track chunk body, rescaling deltas to the artifact resolution.
fn build_track_data(events: &[MidiEvent], source_ticks_per_beat: u16) -> Vec<u8> {
    let mut buffer = Vec::new();
    let mut source_tick = 0u32;
    let mut last_written = 0u32;
    let mut ended = false;

    for event in events {
        source_tick = source_tick.saturating_add(event.delta);
        if ended {
            break;
        }
        let tick = scale_ticks(source_tick, source_ticks_per_beat);
        let mut body = Vec::new();
        if !write_event(&event.kind, &mut body) {
            continue;
        }
        write_vlq(tick.saturating_sub(last_written), &mut buffer);
        buffer.extend_from_slice(&body);
        last_written = tick;
        ended = event.kind == EventKind::EndOfTrack;
    }

    if !ended {
        let tick = scale_ticks(source_tick, source_ticks_per_beat);
        write_vlq(tick.saturating_sub(last_written), &mut buffer);
        write_event(&EventKind::EndOfTrack, &mut buffer);
    }

    buffer
}

/// Writes a track chunk to the output.
fn write_track_chunk<W: Write>(writer: &mut W, track_data: &[u8]) -> std::io::Result<()> {
    writer.write_all(b"MTrk")?;
    writer.write_all(&(track_data.len() as u32).to_be_bytes())?;
    writer.write_all(track_data)?;
    Ok(())
}

/// Writes `events` as a Format 0 file with one track.
///
/// # Arguments
///
/// * `events` - Events in order, deltas at the source resolution
/// * `source_ticks_per_beat` - Resolution of the document the events came from
/// * `path` - Output path, must end in `.mid` or `.midi`
///
/// # Errors
///
/// Returns `UnsupportedFormat` for other extensions, or an IO error.
pub fn write_single_track<P: AsRef<Path>>(
    events: &[MidiEvent],
    source_ticks_per_beat: u16,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if extension != "mid" && extension != "midi" {
        return Err(PipelineError::UnsupportedFormat {
            kind: "MIDI artifact",
            path: path.to_path_buf(),
            extension,
        });
    }

    let mut writer = BufWriter::new(File::create(path)?);

    writer.write_all(b"MThd")?;
    writer.write_all(&6u32.to_be_bytes())?;
    writer.write_all(&0u16.to_be_bytes())?; // Format 0
    writer.write_all(&1u16.to_be_bytes())?;
    writer.write_all(&ARTIFACT_TICKS_PER_BEAT.to_be_bytes())?;

    let track_data = build_track_data(events, source_ticks_per_beat);
    write_track_chunk(&mut writer, &track_data)?;

    writer.flush()?;
    Ok(())
}
