//! WAV file reading and writing for rendered buffers.

use super::engine::RenderResult;
use crate::error::{PipelineError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Sample encoding for written WAV files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WavSampleFormat {
    /// 32-bit IEEE float. Keeps raw renders above full scale intact.
    #[default]
    Float32,
    /// 16-bit signed integer, clamped at full scale.
    Int16,
}

/// Writes `buffer` as an interleaved WAV file.
///
/// # Errors
///
/// Returns error if the file cannot be created or written.
pub fn write_wav<P: AsRef<Path>>(
    buffer: &RenderResult,
    path: P,
    format: WavSampleFormat,
) -> Result<()> {
    let path = path.as_ref();
    let channels = buffer.channel_count().max(1);
    let spec = match format {
        WavSampleFormat::Float32 => WavSpec {
            channels: channels as u16,
            sample_rate: buffer.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
        WavSampleFormat::Int16 => WavSpec {
            channels: channels as u16,
            sample_rate: buffer.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    };
    let mut writer = WavWriter::create(path, spec)?;

    for frame in 0..buffer.frames() {
        for channel in &buffer.channels {
            let sample = channel[frame];
            match format {
                WavSampleFormat::Float32 => writer.write_sample(sample)?,
                WavSampleFormat::Int16 => {
                    // Convert f32 (-1.0 to 1.0) to i16
                    let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                    writer.write_sample(value)?;
                }
            }
        }
    }

    writer.finalize()?;
    tracing::debug!("Wrote {} ({} frames)", path.display(), buffer.frames());
    Ok(())
}

/// Reads a WAV file into a de-interleaved buffer scaled to -1.0..1.0.
///
/// # Errors
///
/// Returns error if the file cannot be read or has an unsupported bit depth.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<RenderResult> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channel_count = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(PipelineError::Config(format!(
                    "{}: unsupported bit depth {}",
                    path.display(),
                    spec.bits_per_sample
                )));
            }
            let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let frames = interleaved.len() / channel_count;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for frame in interleaved.chunks_exact(channel_count) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }

    Ok(RenderResult {
        sample_rate: spec.sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo() -> RenderResult {
        RenderResult {
            sample_rate: 22050,
            channels: vec![vec![0.0, 0.5, -0.5, 1.5], vec![0.25, -0.25, 0.0, -1.5]],
        }
    }

    #[test]
    fn test_float_wav_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("render.wav");
        write_wav(&stereo(), &path, WavSampleFormat::Float32).unwrap();
        assert_eq!(read_wav(&path).unwrap(), stereo());
    }

    #[test]
    fn test_int16_wav_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("render16.wav");
        write_wav(&stereo(), &path, WavSampleFormat::Int16).unwrap();

        let read = read_wav(&path).unwrap();
        assert_eq!(read.sample_rate, 22050);
        assert_eq!(read.frames(), 4);
        assert!((read.channels[0][1] - 0.5).abs() < 1e-3);
        assert!(read.channels[0][3] <= 1.0);
        assert!(read.channels[1][3] >= -1.0);
    }

    #[test]
    fn test_missing_file() {
        assert!(read_wav("/nonexistent/render.wav").is_err());
    }
}
