// src/player.rs

use crate::audio::{build_stream_for, setup_output_device, SharedTransportState};
use crate::decoder::{spawn_decoder, DecoderCmd, EncodedSource};
use crate::playback::Transport;
use anyhow::Context;
use cpal::traits::StreamTrait;
use cpal::Stream;
use ringbuf::{traits::Split, HeapRb};
use std::path::Path;
use std::sync::{
    atomic::Ordering,
    mpsc::Sender,
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

/// One stem on the default output device.
pub struct AudioPlayer {
    _stream: Stream,
    _decoder_handle: JoinHandle<()>,
    state: Arc<SharedTransportState>,
    total_duration: Option<Duration>,
    /// Position the sample counter is relative to (the last seek target).
    base: Duration,
    output_sample_rate: u32,
    output_channels: u16,
    seek_tx: Sender<DecoderCmd>,
}

impl AudioPlayer {
    /// Opens an in-memory stem. Starts paused at 0.
    pub fn from_bytes(name: &str, bytes: Arc<[u8]>) -> Result<Self, anyhow::Error> {
        // --- 1. Probe ---
        let source = EncodedSource { name: name.to_string(), bytes };
        let format = source.open()?;
        let track = format
            .default_track()
            .context("no default audio track found")?;
        let total_duration = match (track.codec_params.n_frames, track.codec_params.sample_rate) {
            (Some(frames), Some(rate)) if rate > 0 => Some(Duration::from_secs_f64(frames as f64 / rate as f64)),
            _ => None,
        };
        drop(format);

        log::debug!("🎧 {name}: duration {total_duration:?}");

        // --- 2. Ring buffer + shared state ---
        let (producer, consumer) = HeapRb::<f32>::new(131_072).split();
        let state = Arc::new(SharedTransportState::default());

        // --- 3. Output device ---
        let output = setup_output_device()?;

        // --- 4. Decoder thread ---
        let (decoder_handle, seek_tx) = spawn_decoder(
            source,
            producer,
            Arc::clone(&state),
            output.output_channels,
            output.output_sample_rate,
        );

        // --- 5. Stream (always running; silence while paused) ---
        let err_fn = |err: cpal::StreamError| log::error!("An error occurred on the output audio stream: {err}");
        let stream = build_stream_for(&output, Arc::clone(&state), consumer, err_fn)?;
        stream.play()?;

        Ok(Self {
            _stream: stream,
            _decoder_handle: decoder_handle,
            state,
            total_duration,
            base: Duration::ZERO,
            output_sample_rate: output.output_sample_rate,
            output_channels: output.output_channels as u16,
            seek_tx,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).with_context(|| format!("opening {}", path.display()))?;
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        Self::from_bytes(name, Arc::from(bytes))
    }

    pub fn get_current_time(&self) -> Duration {
        let samples = self.state.played_samples.load(Ordering::Relaxed) as f64;
        let frames = samples / self.output_channels.max(1) as f64;
        let played = Duration::from_secs_f64(frames / self.output_sample_rate.max(1) as f64);
        let pos = self.base + played;
        match self.total_duration {
            Some(total) => pos.min(total),
            None => pos,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing.load(Ordering::Relaxed)
    }
}

impl Transport for AudioPlayer {
    fn play(&mut self) {
        if self.has_ended() {
            if let Err(e) = self.seek(Duration::ZERO) {
                log::warn!("Could not rewind before replay: {e}");
            }
        }
        self.state.is_playing.store(true, Ordering::Relaxed);
    }

    fn pause(&mut self) {
        self.state.is_playing.store(false, Ordering::Relaxed);
    }

    fn seek(&mut self, pos: Duration) -> anyhow::Result<()> {
        let pos = match self.total_duration {
            Some(total) => pos.min(total),
            None => pos,
        };
        self.state.seek_pending.store(true, Ordering::Release);
        self.seek_tx.send(DecoderCmd::Seek(pos)).context("decoder thread is gone")?;
        // Reposition the clock now so the UI doesn't wait for the decoder.
        self.base = pos;
        self.state.played_samples.store(0, Ordering::Relaxed);
        self.state.ended.store(false, Ordering::Release);
        Ok(())
    }

    fn position(&self) -> Duration {
        self.get_current_time()
    }

    fn duration(&self) -> Option<Duration> {
        self.total_duration
    }

    fn has_ended(&self) -> bool {
        self.state.ended.load(Ordering::Acquire)
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        self.state.is_playing.store(false, Ordering::Relaxed);
        self.state.shutdown.store(true, Ordering::Release);
    }
}
