// src/waveform/engine.rs

use std::time::Duration;

use anyhow::Result;

use super::render::{render_frame, Frame};
use super::{profile, PeakProfile, WaveformState};
use crate::playback::PlaybackHandle;

/// One rendered stem: its peaks, its clock, and its registered transport.
pub struct WaveformEngine {
    name: String,
    buckets: usize,
    peaks: Vec<f32>,
    decoded_duration: f64,
    current_time: f64,
    playback: PlaybackHandle,
}

impl WaveformEngine {
    pub fn new(name: impl Into<String>, buckets: usize, playback: PlaybackHandle) -> Self {
        Self {
            name: name.into(),
            buckets: buckets.max(1),
            peaks: Vec::new(),
            decoded_duration: 0.0,
            current_time: 0.0,
            playback,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }

    /// Decode on the calling thread. Failure only empties the waveform.
    pub fn load(&mut self, bytes: Vec<u8>) {
        let result = profile(bytes, &self.name, self.buckets);
        self.apply_profile(result);
    }

    /// Attach a profile computed elsewhere (e.g. in `spawn_blocking`).
    pub fn apply_profile(&mut self, result: Result<PeakProfile>) {
        match result {
            Ok(PeakProfile { mut peaks, duration_secs }) => {
                peaks.truncate(self.buckets);
                self.peaks = peaks;
                self.decoded_duration = duration_secs;
            }
            Err(e) => {
                log::warn!("⚠️ [Waveform] {}: {e:#}; showing no waveform", self.name);
                self.peaks.clear();
            }
        }
    }

    /// Container duration when known, else what the decode measured.
    pub fn duration(&self) -> f64 {
        match self.playback.duration() {
            Some(d) if !d.is_zero() => d.as_secs_f64(),
            _ => self.decoded_duration,
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    pub fn state(&self) -> WaveformState {
        WaveformState {
            peaks: self.peaks.clone(),
            duration: self.duration(),
            current_time: self.current_time,
            is_playing: self.is_playing(),
        }
    }

    pub fn frame(&self, width: f32, height: f32) -> Frame {
        render_frame(&self.peaks, self.current_time, self.duration(), width, height)
    }

    /// Pull position from the transport; natural end of media pauses.
    pub fn sync(&mut self) {
        self.current_time = self.playback.position().as_secs_f64();
        if self.playback.is_playing() && self.playback.has_ended() {
            self.playback.pause();
        }
    }

    pub fn play(&mut self) {
        self.playback.play();
    }

    pub fn pause(&mut self) {
        self.playback.pause();
        self.sync();
    }

    pub fn toggle(&mut self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Click at `x` on a surface `surface_width` wide: jump there and play.
    /// Returns the new position in seconds.
    pub fn seek_click(&mut self, x: f32, surface_width: f32) -> Result<f64> {
        let fraction = if surface_width > 0.0 && x.is_finite() {
            (x / surface_width).clamp(0.0, 1.0) as f64
        } else {
            0.0
        };
        let target = fraction * self.duration();
        self.seek_to(target)?;
        self.play();
        Ok(self.current_time)
    }

    /// Move without changing play state.
    pub fn seek_to(&mut self, secs: f64) -> Result<()> {
        let duration = self.duration();
        let mut target = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
        if duration > 0.0 {
            target = target.min(duration);
        }
        self.playback.seek(Duration::from_secs_f64(target))?;
        self.current_time = target;
        Ok(())
    }

    pub fn seek_by(&mut self, delta_secs: f64) -> Result<()> {
        self.seek_to(self.current_time + delta_secs)
    }
}
