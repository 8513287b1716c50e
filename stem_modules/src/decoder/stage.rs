// src/decoder/stage.rs

//! Planar staging between symphonia's interleaved output and rubato's
//! planar input, plus the channel remix that sits in front of it.

/// Per-channel sample queues, all fed the same number of frames.
#[derive(Debug, Clone)]
pub struct PlanarStage {
    channels: Vec<Vec<f32>>,
}

impl PlanarStage {
    pub fn new(channels: usize) -> Self {
        Self { channels: vec![Vec::with_capacity(4096); channels.max(1)] }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Frames available on every channel.
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn push_interleaved(&mut self, interleaved: &[f32]) {
        let n = self.channels.len();
        for frame in interleaved.chunks_exact(n) {
            for (ch, s) in self.channels.iter_mut().zip(frame) {
                ch.push(*s);
            }
        }
    }

    /// Remove up to `frames` from the front of every channel.
    pub fn take(&mut self, frames: usize) -> Vec<Vec<f32>> {
        self.channels
            .iter_mut()
            .map(|ch| {
                let n = frames.min(ch.len());
                ch.drain(..n).collect()
            })
            .collect()
    }

    /// Everything left, or `None` if empty.
    pub fn drain(&mut self) -> Option<Vec<Vec<f32>>> {
        match self.frames() {
            0 => None,
            n => Some(self.take(n)),
        }
    }

    pub fn clear(&mut self) {
        self.channels.iter_mut().for_each(Vec::clear);
    }
}

pub fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let channels = planar.len();
    let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(frames * channels);
    for f in 0..frames {
        out.extend(planar.iter().map(|ch| ch[f]));
    }
    out
}

/// Remix interleaved audio from `in_ch` to `out_ch` channels.
/// Mono fans out, stereo folds to mono by averaging; wider layouts average
/// neighbouring groups when narrowing and wrap when widening.
pub fn remix(input: &[f32], in_ch: usize, out_ch: usize) -> Vec<f32> {
    if in_ch == out_ch || in_ch == 0 || out_ch == 0 {
        return input.to_vec();
    }
    let frames = input.len() / in_ch;
    let mut out = Vec::with_capacity(frames * out_ch);

    for frame in input.chunks_exact(in_ch) {
        if out_ch < in_ch {
            let factor = in_ch as f32 / out_ch as f32;
            for oc in 0..out_ch {
                let start = (oc as f32 * factor).floor() as usize;
                let end = (((oc + 1) as f32 * factor).ceil() as usize).min(in_ch);
                let group = &frame[start..end];
                out.push(group.iter().sum::<f32>() / group.len().max(1) as f32);
            }
        } else {
            out.extend((0..out_ch).map(|oc| frame[oc % in_ch]));
        }
    }
    out
}

/// Samples (per channel) in `ms` milliseconds.
#[inline]
pub fn fade_len(sample_rate: u32, ms: u32) -> usize {
    ((sample_rate as u64 * ms as u64) / 1000) as usize
}
