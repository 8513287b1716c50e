// src/waveform/render.rs

/// Axis-aligned rectangle in surface units, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Everything needed to paint one waveform: bars plus the progress overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: f32,
    pub height: f32,
    pub bars: Vec<Rect>,
    pub progress: Rect,
}

impl Frame {
    /// No peaks (not decoded yet, or decode failed): presenters draw nothing.
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// Width of the played region. Zero when the duration is unknown.
pub fn progress_width(current_time: f64, duration: f64, surface_width: f32) -> f32 {
    if !duration.is_finite() || duration <= 0.0 || !current_time.is_finite() {
        return 0.0;
    }
    let width = (current_time / duration) as f32 * surface_width;
    width.clamp(0.0, surface_width.max(0.0))
}

/// Lay out bars normalized to the loudest peak, bottom-anchored, in equal
/// columns across `width`.
pub fn render_frame(peaks: &[f32], current_time: f64, duration: f64, width: f32, height: f32) -> Frame {
    let max_peak = peaks
        .iter()
        .copied()
        .filter(|p| p.is_finite())
        .fold(0.0f32, f32::max);
    let bar_width = if peaks.is_empty() { 0.0 } else { width / peaks.len() as f32 };

    let bars = peaks
        .iter()
        .enumerate()
        .map(|(i, &peak)| {
            let level = if max_peak > 0.0 && peak.is_finite() { peak / max_peak } else { 0.0 };
            let bar_height = level * height;
            Rect {
                x: i as f32 * bar_width,
                y: height - bar_height,
                width: bar_width,
                height: bar_height,
            }
        })
        .collect();

    Frame {
        width,
        height,
        bars,
        progress: Rect {
            x: 0.0,
            y: 0.0,
            width: progress_width(current_time, duration, width),
            height,
        },
    }
}
