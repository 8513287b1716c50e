// src/decoder/mod.rs

pub mod control;
pub mod output;
pub mod resample;
pub mod stage;

use anyhow::anyhow;
use ringbuf::traits::Producer as RbProducer;
use std::io::Cursor;
use std::sync::{
    atomic::Ordering,
    mpsc::{channel, Receiver, RecvTimeoutError, Sender},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::units::Time;
use symphonia::default::{get_codecs, get_probe};

use crate::audio::SharedTransportState;
use crate::waveform::hint_for;
use output::{push_with_fade, FadeIn};
use resample::StageResampler;
use stage::{remix, PlanarStage};

pub use control::DecoderCmd;

const POST_SEEK_FADE_MS: u32 = 10;

/// Source of one stem: the encoded bytes plus a name for the format hint.
#[derive(Clone)]
pub struct EncodedSource {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl EncodedSource {
    pub fn open(&self) -> Result<Box<dyn FormatReader>, anyhow::Error> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(Arc::clone(&self.bytes))), Default::default());
        let probed = get_probe()
            .format(
                &hint_for(&self.name),
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| anyhow!("{}: unrecognized audio ({e})", self.name))?;
        Ok(probed.format)
    }
}

/// Decodes an in-memory stem into the output ring on its own thread.
pub struct StreamDecoder<P>
where
    P: RbProducer<Item = f32> + Send + 'static,
{
    source: EncodedSource,
    producer: P,
    state: Arc<SharedTransportState>,
    output_channels: usize,
    output_sample_rate: u32,
    cmd_rx: Receiver<DecoderCmd>,
    fade: FadeIn,
}

enum Flow {
    Continue,
    Stop,
}

impl<P> StreamDecoder<P>
where
    P: RbProducer<Item = f32> + Send + 'static,
{
    pub fn spawn(self) -> JoinHandle<()> {
        thread::spawn(move || {
            let name = self.source.name.clone();
            if let Err(e) = self.run() {
                log::error!("Decoder thread error ({name}): {e}");
            }
        })
    }

    fn run(mut self) -> Result<(), anyhow::Error> {
        let mut format = self.source.open()?;
        let track = format
            .default_track()
            .ok_or_else(|| anyhow!("no default audio track"))?;
        let track_id = track.id;
        let source_rate = track.codec_params.sample_rate.unwrap_or(self.output_sample_rate);

        let mut decoder = get_codecs().make(&track.codec_params, &DecoderOptions::default())?;
        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut resampler = StageResampler::new(source_rate, self.output_sample_rate, self.output_channels)?;
        let mut stage = PlanarStage::new(self.output_channels);

        loop {
            // --- 1. Commands ---
            while let Ok(cmd) = self.cmd_rx.try_recv() {
                self.apply(cmd, format.as_mut(), track_id, &mut stage, &mut resampler)?;
                decoder.reset();
                sample_buf = None;
            }
            if self.state.shutdown.load(Ordering::Relaxed) {
                return Ok(());
            }

            // --- 2. Next packet ---
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(_) => {
                    // End of stream: flush, then idle until a seek or shutdown.
                    let tail = resampler.finish(&mut stage)?;
                    self.push(&tail);
                    self.state.source_exhausted.store(true, Ordering::Release);
                    match self.wait_for_command() {
                        Some(cmd) => {
                            self.apply(cmd, format.as_mut(), track_id, &mut stage, &mut resampler)?;
                            decoder.reset();
                            sample_buf = None;
                            continue;
                        }
                        None => return Ok(()),
                    }
                }
            };
            if packet.track_id() != track_id {
                continue;
            }

            // --- 3. Decode, remix, resample, push ---
            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            let spec = *decoded.spec();
            let decoded_ch = spec.channels.count().max(1);
            let needs_buffer = sample_buf
                .as_ref()
                .map_or(true, |b| b.capacity() < decoded.capacity());
            if needs_buffer {
                sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            }
            let Some(buf) = sample_buf.as_mut() else { continue };
            buf.copy_interleaved_ref(decoded);

            let mixed = remix(buf.samples(), decoded_ch, self.output_channels);
            stage.push_interleaved(&mixed);
            let ready = resampler.process_ready(&mut stage)?;
            if let Flow::Stop = self.push(&ready) {
                // Interrupted by a seek or shutdown; the command loop takes over.
                continue;
            }

            if !self.state.is_playing.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(10));
            }
        }
    }

    fn push(&mut self, samples: &[f32]) -> Flow {
        let state = Arc::clone(&self.state);
        if push_with_fade(&mut self.producer, samples, &mut self.fade, || state.interrupted()) {
            Flow::Continue
        } else {
            Flow::Stop
        }
    }

    /// Block until a command arrives. `None` on shutdown or a dropped player.
    fn wait_for_command(&self) -> Option<DecoderCmd> {
        loop {
            if self.state.shutdown.load(Ordering::Relaxed) {
                return None;
            }
            match self.cmd_rx.recv_timeout(Duration::from_millis(50)) {
                Ok(cmd) => return Some(cmd),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn apply(
        &mut self,
        cmd: DecoderCmd,
        format: &mut dyn FormatReader,
        track_id: u32,
        stage: &mut PlanarStage,
        resampler: &mut StageResampler,
    ) -> Result<(), anyhow::Error> {
        match cmd {
            DecoderCmd::Seek(target) => {
                let time = Time::new(target.as_secs(), target.subsec_nanos() as f64 / 1_000_000_000f64);
                if let Err(e) = format.seek(SeekMode::Accurate, SeekTo::Time { time, track_id: Some(track_id) }) {
                    log::warn!("Seek to {target:?} failed ({e}), rewinding");
                    format.seek(
                        SeekMode::Accurate,
                        SeekTo::Time { time: Time::new(0, 0.0), track_id: Some(track_id) },
                    )?;
                }
                stage.clear();
                resampler.reset();
                self.flush_output();
                self.fade = FadeIn::start(stage::fade_len(self.output_sample_rate, POST_SEEK_FADE_MS) * self.output_channels);
                self.state.source_exhausted.store(false, Ordering::Release);
                self.state.ended.store(false, Ordering::Release);
                self.state.seek_pending.store(false, Ordering::Release);
            }
        }
        Ok(())
    }

    /// Ask the output callback to empty the ring and wait briefly for it.
    fn flush_output(&self) {
        self.state.flush.store(true, Ordering::Release);
        let deadline = Instant::now() + Duration::from_millis(50);
        while self.state.flush.load(Ordering::Acquire) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

pub fn spawn_decoder<P>(
    source: EncodedSource,
    producer: P,
    state: Arc<SharedTransportState>,
    output_channels: usize,
    output_sample_rate: u32,
) -> (JoinHandle<()>, Sender<DecoderCmd>)
where
    P: RbProducer<Item = f32> + Send + 'static,
{
    let (tx, rx) = channel();
    let handle = StreamDecoder {
        source,
        producer,
        state,
        output_channels: output_channels.max(1),
        output_sample_rate,
        cmd_rx: rx,
        fade: FadeIn::default(),
    }
    .spawn();
    (handle, tx)
}
