//! Live tuning state shared with in-flight generators.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crate::color::Rgb;

/// Tuning values a running generator re-reads every tick.
///
/// Everything is atomic so the hot path never takes a lock. `generation`
/// bumps on every mutation; effects with phase (breathing) watch it to
/// detect changes.
pub struct SharedParams {
    color: AtomicU32,
    delay_micros: AtomicU64,
    sample_fps: AtomicU32,
    generation: AtomicU64,
}

impl SharedParams {
    pub fn new(color: Rgb, delay: Duration, sample_fps: u32) -> Self {
        Self {
            color: AtomicU32::new(color.packed()),
            delay_micros: AtomicU64::new(delay.as_micros() as u64),
            sample_fps: AtomicU32::new(sample_fps),
            generation: AtomicU64::new(0),
        }
    }

    pub fn color(&self) -> Rgb {
        Rgb::from_packed(self.color.load(Ordering::Relaxed))
    }

    pub fn set_color(&self, color: Rgb) {
        self.color.store(color.packed(), Ordering::Relaxed);
        self.bump();
    }

    /// Per-tick delay of the active generator
    pub fn delay(&self) -> Duration {
        Duration::from_micros(self.delay_micros.load(Ordering::Relaxed))
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_micros
            .store(delay.as_micros() as u64, Ordering::Relaxed);
        self.bump();
    }

    /// Ambilight screen captures per second
    pub fn sample_fps(&self) -> u32 {
        self.sample_fps.load(Ordering::Relaxed)
    }

    pub fn set_sample_fps(&self, fps: u32) {
        self.sample_fps.store(fps.max(1), Ordering::Relaxed);
        self.bump();
    }

    /// Monotonic change counter
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::Relaxed);
    }

    /// Apply a partial update; in-flight generators pick the new values
    /// up on their next tick.
    pub fn apply(&self, delta: ParamsDelta) {
        if let Some(color) = delta.color {
            self.set_color(color);
        }
        if let Some(delay) = delta.delay {
            self.set_delay(delay);
        }
        if let Some(fps) = delta.sample_fps {
            self.set_sample_fps(fps);
        }
    }
}

/// A partial update applied through `Engine::update_params`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParamsDelta {
    pub color: Option<Rgb>,
    pub delay: Option<Duration>,
    pub sample_fps: Option<u32>,
}
