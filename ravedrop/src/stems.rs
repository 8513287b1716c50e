// src/stems.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context};
use stem_modules::job::{sort_stems, JobId, StemFile};
use stem_modules::service::StemService;
use stem_modules::waveform::{deck::audible_or_silent, profile, PeakProfile, StemDeck};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// A fetched and analysed stem, ready for the deck.
pub struct LoadedStem {
    generation: u64,
    name: String,
    bytes: Arc<[u8]>,
    profile: anyhow::Result<PeakProfile>,
}

/// Fetches revealed stems in the background and hands them to the deck on
/// the UI loop (audio output handles are not `Send`).
pub struct StemLoader<S: StemService> {
    service: Arc<S>,
    buckets: usize,
    tx: UnboundedSender<LoadedStem>,
    rx: UnboundedReceiver<LoadedStem>,
    generation: u64,
    requested: Option<JobId>,
    bytes: HashMap<String, Arc<[u8]>>,
}

impl<S: StemService> StemLoader<S> {
    pub fn new(service: Arc<S>, buckets: usize) -> Self {
        let (tx, rx) = unbounded_channel();
        Self { service, buckets, tx, rx, generation: 0, requested: None, bytes: HashMap::new() }
    }

    /// Start loading a job's stems, once per job.
    pub fn request(&mut self, job_id: &JobId, files: &[StemFile]) {
        if self.requested.as_ref() == Some(job_id) {
            return;
        }
        self.requested = Some(job_id.clone());

        let mut files = files.to_vec();
        sort_stems(&mut files);
        log::info!("🎛️ Loading {} stem(s) for {job_id}", files.len());

        for file in files {
            let service = Arc::clone(&self.service);
            let tx = self.tx.clone();
            let generation = self.generation;
            let buckets = self.buckets;
            tokio::spawn(async move {
                match load(service.as_ref(), &file, buckets).await {
                    Ok((bytes, profile)) => {
                        let _ = tx.send(LoadedStem { generation, name: file.display_name, bytes, profile });
                    }
                    Err(e) => log::warn!("⚠️ Could not fetch {}: {e:#}", file.display_name),
                }
            });
        }
    }

    /// Move finished loads into the deck. Loads from before the last reset are dropped.
    pub fn drain_into(&mut self, deck: &mut StemDeck) -> usize {
        let mut added = 0;
        while let Ok(stem) = self.rx.try_recv() {
            if stem.generation != self.generation || deck.contains(&stem.name) {
                continue;
            }
            let decoded_secs = stem.profile.as_ref().map(|p| p.duration_secs).unwrap_or(0.0);
            let transport = audible_or_silent(&stem.name, Arc::clone(&stem.bytes), decoded_secs);
            deck.push(&stem.name, transport, stem.profile);
            self.bytes.insert(stem.name, stem.bytes);
            added += 1;
        }
        added
    }

    /// The job whose stems were last requested.
    pub fn current(&self) -> Option<&JobId> {
        self.requested.as_ref()
    }

    pub fn reset(&mut self) {
        self.generation += 1;
        self.requested = None;
        self.bytes.clear();
    }

    pub fn bytes_for(&self, name: &str) -> Option<Arc<[u8]>> {
        self.bytes.get(name).cloned()
    }
}

async fn load<S: StemService>(
    service: &S,
    file: &StemFile,
    buckets: usize,
) -> anyhow::Result<(Arc<[u8]>, anyhow::Result<PeakProfile>)> {
    let started = Instant::now();
    let bytes: Arc<[u8]> = Arc::from(service.fetch_audio(&file.url).await?);
    log::debug!("Fetched {} ({} bytes) in {:.2?}", file.display_name, bytes.len(), started.elapsed());

    // Decode is CPU-heavy; keep it off the UI loop.
    let decode_bytes = Arc::clone(&bytes);
    let name = file.display_name.clone();
    let peaks = tokio::task::spawn_blocking(move || profile(decode_bytes, &name, buckets))
        .await
        .map_err(|e| anyhow!("decode task failed: {e}"))?;
    log::debug!("⏱️ {} ready in {:.2?}", file.display_name, started.elapsed());
    Ok((bytes, peaks))
}

/// Write a stem next to the others in `dir`. Returns the written path.
pub async fn save_stem(dir: &Path, name: &str, bytes: Arc<[u8]>) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;
    let file_name = Path::new(name)
        .file_name()
        .ok_or_else(|| anyhow!("bad stem name '{name}'"))?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, &bytes[..])
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
