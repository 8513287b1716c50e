// src/waveform/terminal.rs

use super::engine::WaveformEngine;
use super::render::{render_frame, Frame};

const PLAYED_BAR: char = '█';
const BAR: char = '▒';
const PLAYED_GAP: char = '░';

/// Rasterize a frame into `rows` strings of `columns` cells.
/// A cell is filled when its center lies inside a bar.
pub fn render_rows(frame: &Frame, columns: usize, rows: usize) -> Vec<String> {
    let h = rows.max(1);
    if frame.is_empty() || columns == 0 || frame.width <= 0.0 || frame.height <= 0.0 {
        return vec![" ".repeat(columns); h];
    }

    let cell_w = frame.width / columns as f32;
    let cell_h = frame.height / h as f32;
    let bar_w = frame.bars[0].width.max(f32::EPSILON);

    (0..h)
        .map(|row| {
            let y = (row as f32 + 0.5) * cell_h;
            (0..columns)
                .map(|col| {
                    let x = (col as f32 + 0.5) * cell_w;
                    let idx = ((x / bar_w) as usize).min(frame.bars.len() - 1);
                    let filled = frame.bars[idx].contains(x, y);
                    let played = frame.progress.contains(x, y);
                    match (filled, played) {
                        (true, true) => PLAYED_BAR,
                        (true, false) => BAR,
                        (false, true) => PLAYED_GAP,
                        (false, false) => ' ',
                    }
                })
                .collect()
        })
        .collect()
}

/// Rows for an engine at terminal resolution.
pub fn render_engine(engine: &WaveformEngine, columns: usize, rows: usize) -> Vec<String> {
    let state = engine.state();
    let frame = render_frame(
        &state.peaks,
        state.current_time,
        state.duration,
        columns as f32,
        rows.max(1) as f32,
    );
    render_rows(&frame, columns, rows)
}

/// `▶ vocals.mp3  0:12 / 3:45`
pub fn caption(engine: &WaveformEngine) -> String {
    let state = engine.state();
    let icon = if state.is_playing { '▶' } else { '⏸' };
    format!(
        "{icon} {}  {} / {}",
        engine.name(),
        format_clock(state.current_time),
        format_clock(state.duration)
    )
}

pub fn format_clock(secs: f64) -> String {
    if !secs.is_finite() || secs <= 0.0 {
        return "0:00".to_string();
    }
    let total = secs.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
