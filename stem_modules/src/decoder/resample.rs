// src/decoder/resample.rs

use anyhow::Result;
use rubato::{
    calculate_cutoff, Resampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use super::stage::{interleave, PlanarStage};

const CHUNK_FRAMES: usize = 1024;

/// Sample-rate conversion from the stem's rate to the device's. A no-op
/// pass-through when the rates already match.
pub struct StageResampler {
    inner: Option<SincFixedIn<f32>>,
}

impl StageResampler {
    pub fn new(src_rate: u32, dst_rate: u32, channels: usize) -> Result<Self> {
        if src_rate == dst_rate || src_rate == 0 {
            return Ok(Self { inner: None });
        }
        let ratio = dst_rate as f64 / src_rate as f64;
        let sinc_len = 256usize;
        let window = WindowFunction::BlackmanHarris2;
        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff: calculate_cutoff(sinc_len, window),
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window,
        };
        let r = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK_FRAMES, channels)?;
        Ok(Self { inner: Some(r) })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    /// Convert every full chunk waiting in `stage`. Interleaved output.
    pub fn process_ready(&mut self, stage: &mut PlanarStage) -> Result<Vec<f32>> {
        let Some(r) = self.inner.as_mut() else {
            return Ok(stage.drain().map(|p| interleave(&p)).unwrap_or_default());
        };
        let mut out = Vec::new();
        while stage.frames() >= r.input_frames_next() {
            let block = stage.take(r.input_frames_next());
            out.extend(interleave(&r.process(&block, None)?));
        }
        Ok(out)
    }

    /// End of stream: convert the partial tail and flush the filter delay.
    pub fn finish(&mut self, stage: &mut PlanarStage) -> Result<Vec<f32>> {
        let Some(r) = self.inner.as_mut() else {
            return Ok(stage.drain().map(|p| interleave(&p)).unwrap_or_default());
        };
        let mut out = Vec::new();
        if let Some(tail) = stage.drain() {
            out.extend(interleave(&r.process_partial(Some(tail.as_slice()), None)?));
        }
        out.extend(interleave(&r.process_partial::<Vec<f32>>(None, None)?));
        Ok(out)
    }

    pub fn reset(&mut self) {
        if let Some(r) = self.inner.as_mut() {
            r.reset();
        }
    }
}
