// src/playback.rs

//! Single-playback discipline across any number of stems.
//!
//! Every waveform registers its transport here and gets a [`PlaybackHandle`].
//! `handle.play()` claims the registry: all other playing transports are
//! paused and rewound before this one starts, inside one registry borrow.
//! The registry lives on the UI loop, so it is `Rc`-based and not `Send`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

/// The audio side of one stem.
pub trait Transport {
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: Duration) -> anyhow::Result<()>;
    fn position(&self) -> Duration;
    /// `None` when the container doesn't say.
    fn duration(&self) -> Option<Duration>;
    /// Natural end of media reached while playing.
    fn has_ended(&self) -> bool;
}

struct Slot {
    id: u64,
    transport: Box<dyn Transport>,
    playing: bool,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    slots: Vec<Slot>,
}

impl Registry {
    fn slot_mut(&mut self, id: u64) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    fn claim(&mut self, id: u64) {
        for other in self.slots.iter_mut().filter(|s| s.id != id && s.playing) {
            other.transport.pause();
            if let Err(e) = other.transport.seek(Duration::ZERO) {
                log::warn!("Could not rewind stopped stem: {e}");
            }
            other.playing = false;
        }
        if let Some(slot) = self.slot_mut(id) {
            slot.transport.play();
            slot.playing = true;
        }
    }
}

#[derive(Clone, Default)]
pub struct PlaybackRegistry {
    inner: Rc<RefCell<Registry>>,
}

impl PlaybackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, transport: Box<dyn Transport>) -> PlaybackHandle {
        let mut reg = self.inner.borrow_mut();
        let id = reg.next_id;
        reg.next_id += 1;
        reg.slots.push(Slot { id, transport, playing: false });
        PlaybackHandle { id, registry: Rc::downgrade(&self.inner) }
    }

    pub fn playing_count(&self) -> usize {
        self.inner.borrow().slots.iter().filter(|s| s.playing).count()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pause_all(&self) {
        for slot in self.inner.borrow_mut().slots.iter_mut().filter(|s| s.playing) {
            slot.transport.pause();
            slot.playing = false;
        }
    }
}

/// A registered transport. Dropping it deregisters.
pub struct PlaybackHandle {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl PlaybackHandle {
    fn with_slot<R>(&self, f: impl FnOnce(&mut Slot) -> R) -> Option<R> {
        let registry = self.registry.upgrade()?;
        let mut reg = registry.borrow_mut();
        reg.slot_mut(self.id).map(f)
    }

    pub fn play(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().claim(self.id);
        }
    }

    pub fn pause(&self) {
        self.with_slot(|slot| {
            slot.transport.pause();
            slot.playing = false;
        });
    }

    pub fn is_playing(&self) -> bool {
        self.with_slot(|slot| slot.playing).unwrap_or(false)
    }

    pub fn seek(&self, position: Duration) -> anyhow::Result<()> {
        self.with_slot(|slot| slot.transport.seek(position))
            .unwrap_or_else(|| Err(anyhow::anyhow!("playback handle is no longer registered")))
    }

    pub fn position(&self) -> Duration {
        self.with_slot(|slot| slot.transport.position()).unwrap_or_default()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.with_slot(|slot| slot.transport.duration()).flatten()
    }

    pub fn has_ended(&self) -> bool {
        self.with_slot(|slot| slot.transport.has_ended()).unwrap_or(false)
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            // Take the slot out first so the transport drops after the borrow ends.
            let removed = {
                let mut reg = registry.borrow_mut();
                let pos = reg.slots.iter().position(|s| s.id == self.id);
                pos.map(|i| reg.slots.remove(i))
            };
            drop(removed);
        }
    }
}

/// Clock-only transport for when there is no output device. Position moves
/// with wall time while "playing".
#[derive(Debug, Default)]
pub struct SilentTransport {
    duration: Option<Duration>,
    offset: Duration,
    started: Option<Instant>,
}

impl SilentTransport {
    pub fn new(duration: Option<Duration>) -> Self {
        Self { duration, offset: Duration::ZERO, started: None }
    }

    fn clamp(&self, pos: Duration) -> Duration {
        match self.duration {
            Some(d) if !d.is_zero() => pos.min(d),
            _ => pos,
        }
    }
}

impl Transport for SilentTransport {
    fn play(&mut self) {
        if self.has_ended() {
            self.offset = Duration::ZERO;
        }
        self.started.get_or_insert_with(Instant::now);
    }

    fn pause(&mut self) {
        self.offset = self.position();
        self.started = None;
    }

    fn seek(&mut self, position: Duration) -> anyhow::Result<()> {
        self.offset = self.clamp(position);
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
        Ok(())
    }

    fn position(&self) -> Duration {
        let running = self.started.map(|t| t.elapsed()).unwrap_or_default();
        self.clamp(self.offset + running)
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn has_ended(&self) -> bool {
        matches!(self.duration, Some(d) if !d.is_zero() && self.position() >= d)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;

    /// Transport whose state tests can inspect after handing it to the registry.
    #[derive(Clone, Default)]
    pub(crate) struct Probe {
        pub playing: Rc<Cell<bool>>,
        pub position: Rc<Cell<Duration>>,
        pub ended: Rc<Cell<bool>>,
        pub duration: Option<Duration>,
    }

    impl Transport for Probe {
        fn play(&mut self) {
            self.playing.set(true);
        }
        fn pause(&mut self) {
            self.playing.set(false);
        }
        fn seek(&mut self, position: Duration) -> anyhow::Result<()> {
            self.position.set(position);
            self.ended.set(false);
            Ok(())
        }
        fn position(&self) -> Duration {
            self.position.get()
        }
        fn duration(&self) -> Option<Duration> {
            self.duration
        }
        fn has_ended(&self) -> bool {
            self.ended.get()
        }
    }

    #[test]
    fn playing_b_stops_and_rewinds_a() {
        let registry = PlaybackRegistry::new();
        let a = Probe::default();
        let b = Probe::default();
        let ha = registry.register(Box::new(a.clone()));
        let hb = registry.register(Box::new(b.clone()));

        ha.play();
        a.position.set(Duration::from_secs(42));
        assert!(ha.is_playing());

        hb.play();
        assert!(!ha.is_playing());
        assert!(!a.playing.get());
        assert_eq!(a.position.get(), Duration::ZERO);
        assert!(hb.is_playing());
        assert!(b.playing.get());
        assert_eq!(registry.playing_count(), 1);
    }

    #[test]
    fn paused_instances_keep_their_position() {
        let registry = PlaybackRegistry::new();
        let a = Probe::default();
        let ha = registry.register(Box::new(a.clone()));
        let hb = registry.register(Box::new(Probe::default()));

        ha.play();
        a.position.set(Duration::from_secs(3));
        ha.pause();
        hb.play();
        assert_eq!(a.position.get(), Duration::from_secs(3));
    }

    #[test]
    fn at_most_one_plays_across_many() {
        let registry = PlaybackRegistry::new();
        let handles: Vec<_> = (0..6).map(|_| registry.register(Box::new(Probe::default()))).collect();
        for h in handles.iter().chain(handles.iter().rev()) {
            h.play();
            assert_eq!(registry.playing_count(), 1);
            assert!(h.is_playing());
        }
    }

    #[test]
    fn dropping_a_handle_deregisters() {
        let registry = PlaybackRegistry::new();
        let ha = registry.register(Box::new(Probe::default()));
        let hb = registry.register(Box::new(Probe::default()));
        assert_eq!(registry.len(), 2);
        drop(ha);
        assert_eq!(registry.len(), 1);
        hb.play();
        assert_eq!(registry.playing_count(), 1);
    }

    #[test]
    fn silent_transport_clamps_seek() {
        let mut t = SilentTransport::new(Some(Duration::from_secs(10)));
        t.seek(Duration::from_secs(30)).unwrap();
        assert_eq!(t.position(), Duration::from_secs(10));
        assert!(t.has_ended());
        t.play();
        assert!(t.position() < Duration::from_secs(1));
    }
}
