//! Peak normalization driven by per-track gain annotations.
//!
//! A track named `Kick_v-6.5dB` is normalized so its peak sits at -6.5 dBFS.
//! Tracks without an annotation get the configured default level.

use super::engine::RenderResult;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Peak level used when a track carries no annotation.
pub const DEFAULT_TARGET_DB: f64 = -1.0;

/// Target peak level in dBFS.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct TargetGainDb(f64);

impl TargetGainDb {
    pub fn new(db: f64) -> Self {
        Self(db)
    }

    pub fn db(self) -> f64 {
        self.0
    }

    /// Linear amplitude of this level, `10^(db/20)`.
    pub fn linear(self) -> f64 {
        10f64.powf(self.0 / 20.0)
    }

    /// Resolves an optional annotation, falling back to `default_db`.
    pub fn resolve(annotation: Option<TargetGainDb>, default_db: f64) -> Self {
        match annotation {
            Some(gain) => gain,
            None => {
                tracing::debug!("No gain annotation, using default {} dB", default_db);
                Self(default_db)
            }
        }
    }
}

impl Default for TargetGainDb {
    fn default() -> Self {
        Self(DEFAULT_TARGET_DB)
    }
}

/// The rendered buffer has no signal to scale.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("buffer peak is zero, cannot normalize to {target_db} dB")]
pub struct SilentBuffer {
    pub target_db: f64,
}

/// Parses an embedded `_v<number>dB` annotation from a track name.
///
/// The number may carry a leading minus and a fractional part. A plus sign
/// is not part of the annotation. The first match wins.
///
/// # Examples
///
/// ```
/// use songmaker::audio::gain::extract_target_db;
///
/// assert_eq!(extract_target_db("Kick_v-6.5dB").map(|g| g.db()), Some(-6.5));
/// assert_eq!(extract_target_db("Kick"), None);
/// ```
pub fn extract_target_db(name: &str) -> Option<TargetGainDb> {
    name.match_indices("_v")
        .find_map(|(start, _)| parse_annotation(&name[start + 2..]))
        .map(TargetGainDb)
}

/// Parses `[-]digits[.digits]dB` at the start of `rest`.
fn parse_annotation(rest: &str) -> Option<f64> {
    let bytes = rest.as_bytes();
    let mut end = 0;
    if bytes.first() == Some(&b'-') {
        end += 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == int_start {
        return None;
    }

    // A dot only counts when digits follow it
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start {
            end = frac_end;
        }
    }

    if !rest[end..].starts_with("dB") {
        return None;
    }
    rest[..end].parse().ok()
}

/// Largest absolute sample across all channels.
pub fn peak(buffer: &RenderResult) -> f32 {
    buffer
        .channels
        .iter()
        .flat_map(|c| c.iter())
        .fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Rescales `buffer` so its peak equals `target.linear()`.
///
/// # Errors
///
/// Returns `SilentBuffer` when the peak is zero; the buffer is handed back
/// untouched in that case.
pub fn try_normalize(
    buffer: RenderResult,
    target: TargetGainDb,
) -> Result<RenderResult, (SilentBuffer, RenderResult)> {
    let peak = peak(&buffer);
    if peak == 0.0 {
        return Err((SilentBuffer { target_db: target.db() }, buffer));
    }

    let scale = (target.linear() / peak as f64) as f32;
    let channels = buffer
        .channels
        .into_iter()
        .map(|c| c.into_iter().map(|s| s * scale).collect())
        .collect();
    Ok(RenderResult {
        sample_rate: buffer.sample_rate,
        channels,
    })
}

/// Normalizes to `target`, passing silent buffers through unchanged.
pub fn normalize(buffer: RenderResult, target: TargetGainDb) -> RenderResult {
    match try_normalize(buffer, target) {
        Ok(normalized) => normalized,
        Err((err, untouched)) => {
            tracing::warn!("Skipping normalization: {}", err);
            untouched
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(left: Vec<f32>, right: Vec<f32>) -> RenderResult {
        RenderResult {
            sample_rate: 44100,
            channels: vec![left, right],
        }
    }

    #[test]
    fn test_extract_target_db() {
        assert_eq!(extract_target_db("Kick_v-6.5dB"), Some(TargetGainDb(-6.5)));
        assert_eq!(extract_target_db("Snare_v-3dB"), Some(TargetGainDb(-3.0)));
        assert_eq!(extract_target_db("Pad_v2dB"), Some(TargetGainDb(2.0)));
        assert_eq!(extract_target_db("Pad_v1.25dB"), Some(TargetGainDb(1.25)));
        assert_eq!(extract_target_db("Kick"), None);
        assert_eq!(extract_target_db(""), None);
    }

    #[test]
    fn test_extract_target_db_rejects_malformed() {
        assert_eq!(extract_target_db("Kick_v-dB"), None);
        assert_eq!(extract_target_db("Kick_v6.5"), None);
        assert_eq!(extract_target_db("Kick_v6.5db"), None);
        assert_eq!(extract_target_db("Kick_v.5dB"), None);
    }

    #[test]
    fn test_plus_sign_is_not_an_annotation() {
        assert_eq!(extract_target_db("Pad_v+1.25dB"), None);
        assert_eq!(
            TargetGainDb::resolve(extract_target_db("Pad_v+1.25dB"), DEFAULT_TARGET_DB).db(),
            -1.0
        );
        // A later well-formed annotation still counts
        assert_eq!(
            extract_target_db("Pad_v+2dB_v-2dB"),
            Some(TargetGainDb(-2.0))
        );
    }

    #[test]
    fn test_extract_target_db_first_valid_match() {
        assert_eq!(
            extract_target_db("Lead_vox_v-4dB_v-9dB"),
            Some(TargetGainDb(-4.0))
        );
    }

    #[test]
    fn test_resolve_default() {
        assert_eq!(TargetGainDb::resolve(None, DEFAULT_TARGET_DB).db(), -1.0);
        assert_eq!(
            TargetGainDb::resolve(Some(TargetGainDb(-3.0)), DEFAULT_TARGET_DB).db(),
            -3.0
        );
    }

    #[test]
    fn test_normalize_hits_target_peak() {
        for db in [-1.0, -3.0, -12.5, 0.0, 3.0] {
            let input = buffer(vec![0.1, -0.4, 0.2], vec![0.05, 0.3, -0.25]);
            let target = TargetGainDb::new(db);
            let out = normalize(input, target);
            let expected = 10f64.powf(db / 20.0) as f32;
            assert!((peak(&out) - expected).abs() < 1e-5, "db = {}", db);
        }
    }

    #[test]
    fn test_normalize_preserves_shape() {
        let out = normalize(buffer(vec![0.5, -0.25], vec![0.0, 0.125]), TargetGainDb(0.0));
        assert!((out.channels[0][0] - 1.0).abs() < 1e-6);
        assert!((out.channels[0][1] + 0.5).abs() < 1e-6);
        assert!((out.channels[1][1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_silent_buffer_is_identity() {
        let silent = buffer(vec![0.0; 16], vec![0.0; 16]);
        let out = normalize(silent.clone(), TargetGainDb(-1.0));
        assert_eq!(out, silent);

        let err = try_normalize(silent, TargetGainDb(-6.0)).unwrap_err();
        assert_eq!(err.0.target_db, -6.0);
    }
}
