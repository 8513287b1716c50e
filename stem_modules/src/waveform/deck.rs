// src/waveform/deck.rs

//! A stack of stem waveforms sharing one playback registry, laid out for a
//! character grid: a caption line followed by the waveform rows, per stem.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use super::engine::WaveformEngine;
use super::terminal::{caption, render_engine};
use super::PeakProfile;
use crate::playback::{PlaybackRegistry, SilentTransport, Transport};
use crate::player::AudioPlayer;

/// Real output if a device is available, else a silent clock of the decoded length.
pub fn audible_or_silent(name: &str, bytes: Arc<[u8]>, decoded_secs: f64) -> Box<dyn Transport> {
    match AudioPlayer::from_bytes(name, bytes) {
        Ok(player) => Box::new(player),
        Err(e) => {
            log::warn!("⚠️ [Deck] {name}: no audio output ({e:#}), playing silently");
            let duration = (decoded_secs.is_finite() && decoded_secs > 0.0)
                .then(|| Duration::from_secs_f64(decoded_secs));
            Box::new(SilentTransport::new(duration))
        }
    }
}

pub struct StemDeck {
    registry: PlaybackRegistry,
    engines: Vec<WaveformEngine>,
    selected: usize,
    buckets: usize,
    rows_per_stem: usize,
}

impl StemDeck {
    pub fn new(buckets: usize, rows_per_stem: usize) -> Self {
        Self {
            registry: PlaybackRegistry::new(),
            engines: Vec::new(),
            selected: 0,
            buckets,
            rows_per_stem: rows_per_stem.max(1),
        }
    }

    pub fn registry(&self) -> &PlaybackRegistry {
        &self.registry
    }

    pub fn push(&mut self, name: &str, transport: Box<dyn Transport>, profile: Result<PeakProfile>) {
        let mut engine = WaveformEngine::new(name, self.buckets, self.registry.register(transport));
        engine.apply_profile(profile);
        self.engines.push(engine);
    }

    /// Drops every engine (and with it, every registered transport).
    pub fn clear(&mut self) {
        self.engines.clear();
        self.selected = 0;
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn engines(&self) -> &[WaveformEngine] {
        &self.engines
    }

    pub fn contains(&self, name: &str) -> bool {
        self.engines.iter().any(|e| e.name() == name)
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_mut(&mut self) -> Option<&mut WaveformEngine> {
        self.engines.get_mut(self.selected)
    }

    pub fn select_next(&mut self) {
        if !self.engines.is_empty() {
            self.selected = (self.selected + 1) % self.engines.len();
        }
    }

    pub fn select_prev(&mut self) {
        if !self.engines.is_empty() {
            self.selected = (self.selected + self.engines.len() - 1) % self.engines.len();
        }
    }

    pub fn sync(&mut self) {
        self.engines.iter_mut().for_each(WaveformEngine::sync);
    }

    pub fn toggle_selected(&mut self) {
        if let Some(engine) = self.selected_mut() {
            engine.toggle();
        }
    }

    pub fn seek_selected(&mut self, delta_secs: f64) {
        if let Some(engine) = self.selected_mut() {
            if let Err(e) = engine.seek_by(delta_secs) {
                log::warn!("Seek failed on {}: {e}", engine.name());
            }
        }
    }

    /// Lines per stem: caption plus waveform rows.
    pub fn block_height(&self) -> usize {
        self.rows_per_stem + 1
    }

    pub fn lines(&self, columns: usize) -> Vec<String> {
        let mut out = Vec::with_capacity(self.engines.len() * self.block_height());
        for (i, engine) in self.engines.iter().enumerate() {
            let marker = if i == self.selected { '>' } else { ' ' };
            out.push(format!("{marker} {}", caption(engine)));
            out.extend(render_engine(engine, columns, self.rows_per_stem));
        }
        out
    }

    /// Mouse press at (`column`, `row`), `row` counted from the deck's first
    /// line. A caption click selects; a waveform click seeks and plays.
    /// Returns the new position when a seek happened.
    pub fn click(&mut self, column: u16, row: u16, columns: usize) -> Option<f64> {
        let block = self.block_height();
        let index = row as usize / block;
        let within = row as usize % block;
        if index >= self.engines.len() {
            return None;
        }
        self.selected = index;
        if within == 0 {
            return None;
        }
        let engine = &mut self.engines[index];
        match engine.seek_click(column as f32 + 0.5, columns as f32) {
            Ok(pos) => Some(pos),
            Err(e) => {
                log::warn!("Seek failed on {}: {e}", engine.name());
                None
            }
        }
    }
}
