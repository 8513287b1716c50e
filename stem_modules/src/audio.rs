// src/audio.rs

use anyhow::anyhow;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::traits::Consumer;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Helper struct to hold output device info
pub struct OutputConfig {
    pub device: Device,
    pub config: StreamConfig,
    pub sample_format: SampleFormat,
    pub output_channels: usize,
    pub output_sample_rate: u32,
}

/// Finds the default audio output device and its config.
pub fn setup_output_device() -> Result<OutputConfig, anyhow::Error> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("no output device available"))?;
    let supported_config = device.default_output_config()?;
    let sample_format = supported_config.sample_format();
    let config = supported_config.config();
    let output_channels = config.channels as usize;
    let output_sample_rate = config.sample_rate.0;

    log::debug!(
        "🔊 Output device: channels: {}, sample_rate: {:?}",
        output_channels,
        config.sample_rate
    );

    Ok(OutputConfig {
        device,
        config,
        sample_format,
        output_channels,
        output_sample_rate,
    })
}

/// Flags shared by the player, its decoder thread and the output callback.
#[derive(Debug, Default)]
pub struct SharedTransportState {
    pub is_playing: AtomicBool,
    /// Interleaved samples handed to the device since the last seek.
    pub played_samples: AtomicU64,
    /// Set by the decoder after a seek; the callback empties the ring and clears it.
    pub flush: AtomicBool,
    /// A seek was requested; the decoder drops whatever it is pushing.
    pub seek_pending: AtomicBool,
    /// Decoder reached end of stream and pushed everything it had.
    pub source_exhausted: AtomicBool,
    /// Source exhausted and the ring drained while playing.
    pub ended: AtomicBool,
    pub shutdown: AtomicBool,
}

impl SharedTransportState {
    /// Decoder should stop pushing the current block.
    pub fn interrupted(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed) || self.seek_pending.load(Ordering::Relaxed)
    }
}

/// Build CPAL output stream.
pub fn build_stream<T, C>(
    device: &Device,
    config: &StreamConfig,
    state: std::sync::Arc<SharedTransportState>,
    mut consumer: C,
    err_fn: fn(cpal::StreamError),
) -> Result<Stream, anyhow::Error>
where
    T: cpal::Sample + cpal::FromSample<f32> + SizedSample,
    C: Consumer<Item = f32> + Send + 'static,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if state.flush.load(Ordering::Acquire) {
                    consumer.clear();
                    state.flush.store(false, Ordering::Release);
                }

                let playing = state.is_playing.load(Ordering::Relaxed);
                let mut popped = 0u64;
                let mut starved = false;

                for out in data.iter_mut() {
                    let s = if playing {
                        match consumer.try_pop() {
                            Some(s) => {
                                popped += 1;
                                s
                            }
                            None => {
                                starved = true;
                                0.0
                            }
                        }
                    } else {
                        0.0
                    };
                    *out = T::from_sample(s);
                }

                if popped > 0 {
                    state.played_samples.fetch_add(popped, Ordering::Relaxed);
                }
                if starved && state.source_exhausted.load(Ordering::Acquire) {
                    state.ended.store(true, Ordering::Release);
                }
            },
            err_fn,
            None,
        )
        .map_err(Into::into)
}

/// Dispatch `build_stream` on the device's sample format.
pub fn build_stream_for<C>(
    output: &OutputConfig,
    state: std::sync::Arc<SharedTransportState>,
    consumer: C,
    err_fn: fn(cpal::StreamError),
) -> Result<Stream, anyhow::Error>
where
    C: Consumer<Item = f32> + Send + 'static,
{
    let OutputConfig { device, config, sample_format, .. } = output;
    match sample_format {
        SampleFormat::F32 => build_stream::<f32, _>(device, config, state, consumer, err_fn),
        SampleFormat::I16 => build_stream::<i16, _>(device, config, state, consumer, err_fn),
        SampleFormat::U16 => build_stream::<u16, _>(device, config, state, consumer, err_fn),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}
