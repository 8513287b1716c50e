// src/waveform/mod.rs
pub mod deck;
pub mod engine;
pub mod render;
pub mod terminal;

pub use deck::StemDeck;
pub use engine::WaveformEngine;
pub use render::{render_frame, Frame, Rect};

use anyhow::{anyhow, Result};
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

/// Bars per waveform unless configured otherwise.
pub const DEFAULT_PEAK_BUCKETS: usize = 200;

/// Snapshot of one rendered stem.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformState {
    pub peaks: Vec<f32>,
    pub duration: f64,
    pub current_time: f64,
    pub is_playing: bool,
}

/// First channel of a decoded resource.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

/// What the engine keeps from a decode: the peaks and how long the audio is.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakProfile {
    pub peaks: Vec<f32>,
    pub duration_secs: f64,
}

/// Format hint from a file or display name's extension.
pub(crate) fn hint_for(display_name: &str) -> Hint {
    let mut hint = Hint::new();
    if let Some(ext) = Path::new(display_name).extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    hint
}

/// Decode a whole in-memory file and keep channel 0 only.
/// The display name is used as a format hint (its extension) and for errors.
pub fn decode_first_channel<B>(bytes: B, display_name: &str) -> Result<DecodedAudio>
where
    B: AsRef<[u8]> + Send + Sync + 'static,
{
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let hint = hint_for(display_name);

    let probed = get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| anyhow!("{display_name}: unrecognized audio ({e})"))?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("{display_name}: no audio track"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44_100);
    let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut samples = Vec::<f32>::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(_) => break,
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        sample_rate = spec.rate;

        let needs_buffer = sample_buf
            .as_ref()
            .map_or(true, |b| b.capacity() < decoded.capacity());
        if needs_buffer {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend(buf.samples().iter().step_by(channels).copied());
        }
    }

    let duration_secs = if sample_rate > 0 {
        samples.len() as f64 / sample_rate as f64
    } else {
        0.0
    };
    log::debug!(
        "[Waveform] {display_name}: {} frames @ {sample_rate} Hz ({duration_secs:.2}s)",
        samples.len()
    );

    Ok(DecodedAudio { samples, sample_rate, duration_secs })
}

/// Mean absolute magnitude per bucket.
///
/// With `L` samples and `N` buckets the block size is `floor(L / N)` and the
/// trailing `L mod N` samples are ignored. When `L < N` the bucket count is
/// clamped to `L` (one sample per bucket); no samples means no peaks.
pub fn extract_peaks(samples: &[f32], buckets: usize) -> Vec<f32> {
    let buckets = buckets.min(samples.len());
    if buckets == 0 {
        return Vec::new();
    }
    let block = samples.len() / buckets;
    samples
        .chunks_exact(block)
        .take(buckets)
        .map(|chunk| chunk.iter().map(|s| s.abs()).sum::<f32>() / block as f32)
        .collect()
}

/// Decode + peaks in one go. Heavy; callers run it off the UI loop.
pub fn profile<B>(bytes: B, display_name: &str, buckets: usize) -> Result<PeakProfile>
where
    B: AsRef<[u8]> + Send + Sync + 'static,
{
    let audio = decode_first_channel(bytes, display_name)?;
    Ok(PeakProfile {
        peaks: extract_peaks(&audio.samples, buckets),
        duration_secs: audio.duration_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn buckets_average_absolute_values() {
        // 400 samples, 200 buckets -> block of 2
        let samples: Vec<f32> = (0..400).map(|i| if i % 2 == 0 { 0.5 } else { -0.25 }).collect();
        let peaks = extract_peaks(&samples, 200);
        assert_eq!(peaks.len(), 200);
        for p in peaks {
            assert_relative_eq!(p, 0.375);
        }
    }

    #[test]
    fn remainder_samples_are_ignored() {
        // 7 samples, 3 buckets -> block 2, last sample dropped
        let samples = [1.0, 1.0, -2.0, -2.0, 3.0, 3.0, 100.0];
        let peaks = extract_peaks(&samples, 3);
        assert_eq!(peaks, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn short_input_clamps_bucket_count() {
        let samples = [0.1, -0.2, 0.3];
        let peaks = extract_peaks(&samples, 200);
        assert_eq!(peaks.len(), 3);
        assert_relative_eq!(peaks[1], 0.2);
    }

    #[test]
    fn no_samples_no_peaks() {
        assert!(extract_peaks(&[], 200).is_empty());
        assert!(extract_peaks(&[0.5, 0.5], 0).is_empty());
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = decode_first_channel(b"definitely not audio".to_vec(), "vocals.mp3");
        assert!(err.is_err());
    }
}
