use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use crate::error::{RenderError, Result};

const SAMPLE_RATE: u32 = 8_000;

/// Peak data for waveform display: (min, max) pairs per window of samples,
/// normalized to -1.0..=1.0.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WaveformData {
    pub peaks: Vec<(f32, f32)>,
    pub sample_rate: u32,
    pub samples_per_peak: u32,
}

impl WaveformData {
    /// Audio length covered by the peaks, in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        let samples = self.peaks.len() as i64 * self.samples_per_peak as i64;
        samples * 1_000 / self.sample_rate as i64
    }

    /// Peaks to draw across `width` pixels, one (min, max) per pixel.
    pub fn resample(&self, width: usize) -> Vec<(f32, f32)> {
        if width == 0 || self.peaks.is_empty() {
            return Vec::new();
        }
        (0..width)
            .map(|x| {
                let from = x * self.peaks.len() / width;
                let to = ((x + 1) * self.peaks.len() / width).max(from + 1);
                self.peaks[from..to.min(self.peaks.len())]
                    .iter()
                    .fold((0.0f32, 0.0f32), |(lo, hi), &(a, b)| (lo.min(a), hi.max(b)))
            })
            .collect()
    }
}

/// Extract audio peaks of an audio track with ffmpeg. Results are cached as
/// JSON under `cache_dir`, keyed by track id.
pub fn extract_waveform(
    source_path: &Path,
    cache_dir: &Path,
    track_id: &str,
    samples_per_peak: u32,
) -> Result<WaveformData> {
    if samples_per_peak == 0 {
        return Err(RenderError::InvalidRequest("samples_per_peak must be > 0".into()));
    }
    if !source_path.exists() {
        return Err(RenderError::FileNotFound(source_path.to_path_buf()));
    }

    let cache_path = cache_dir.join(format!("{track_id}.json"));
    if cache_path.exists() {
        let data = std::fs::read_to_string(&cache_path)?;
        match serde_json::from_str::<WaveformData>(&data) {
            Ok(cached) if cached.samples_per_peak == samples_per_peak => {
                debug!(track = track_id, "waveform cache hit");
                return Ok(cached);
            }
            Ok(_) => debug!(track = track_id, "cached waveform has other resolution"),
            Err(e) => warn!(track = track_id, error = %e, "discarding corrupt waveform cache"),
        }
    }

    std::fs::create_dir_all(cache_dir)?;

    // Raw PCM s16le mono.
    let output = Command::new("ffmpeg")
        .args([
            "-i",
            &source_path.to_string_lossy(),
            "-f",
            "s16le",
            "-ac",
            "1",
            "-ar",
            &SAMPLE_RATE.to_string(),
            "-acodec",
            "pcm_s16le",
            "-",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RenderError::FfmpegNotFound,
            _ => RenderError::Io(e),
        })?;

    if !output.status.success() {
        return Err(RenderError::FfmpegFailed(format!(
            "waveform extraction failed for {}",
            source_path.display()
        )));
    }

    let samples: Vec<i16> = output
        .stdout
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect();

    let data = WaveformData {
        peaks: compute_peaks(&samples, samples_per_peak),
        sample_rate: SAMPLE_RATE,
        samples_per_peak,
    };
    debug!(track = track_id, peaks = data.peaks.len(), "extracted waveform");

    let json = serde_json::to_string(&data)?;
    if let Err(e) = std::fs::write(&cache_path, json) {
        warn!(path = %cache_path.display(), error = %e, "failed to cache waveform");
    }

    Ok(data)
}

pub fn compute_peaks(samples: &[i16], samples_per_peak: u32) -> Vec<(f32, f32)> {
    samples
        .chunks(samples_per_peak.max(1) as usize)
        .map(|chunk| {
            let min = chunk.iter().copied().min().unwrap_or(0) as f32 / 32768.0;
            let max = chunk.iter().copied().max().unwrap_or(0) as f32 / 32768.0;
            (min, max)
        })
        .collect()
}
