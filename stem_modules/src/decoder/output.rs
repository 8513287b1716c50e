// src/decoder/output.rs

use ringbuf::traits::Producer as RbProducer;
use std::time::Duration;

/// Linear fade-in applied to the first samples after a seek.
#[derive(Debug, Default, Clone, Copy)]
pub struct FadeIn {
    total: usize,
    remaining: usize,
}

impl FadeIn {
    pub fn start(samples: usize) -> Self {
        Self { total: samples, remaining: samples }
    }

    fn gain(&mut self) -> f32 {
        if self.remaining == 0 {
            return 1.0;
        }
        let g = (self.total - self.remaining) as f32 / self.total as f32;
        self.remaining -= 1;
        g
    }
}

/// Push `data` into the ring, parking while it is full. Gives up as soon as
/// `interrupted()` turns true and returns false.
pub fn push_with_fade<P, F>(producer: &mut P, data: &[f32], fade: &mut FadeIn, interrupted: F) -> bool
where
    P: RbProducer<Item = f32>,
    F: Fn() -> bool,
{
    for &s in data {
        let s = s * fade.gain();
        loop {
            match producer.try_push(s) {
                Ok(()) => break,
                Err(_) => {
                    if interrupted() {
                        return false;
                    }
                    std::thread::park_timeout(Duration::from_micros(200));
                }
            }
        }
    }
    true
}
