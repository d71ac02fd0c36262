//! Effect generators.
//!
//! Each generator is a loop keyed by the engine's running flag, checked
//! at the top of every inner step so a stop request is honored within
//! one step's delay. All sleeps go through
//! [`EffectContext::sleep_while_running`], which sleeps in bounded
//! slices — even Static's idle wakes at least every [`SLEEP_SLICE`] to
//! re-check the flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::warn;

use clevo_backlight::BacklightWriter;

use crate::color::{HueWheel, Rgb};
use crate::config::RestartPolicy;
use crate::engine::{EngineEvents, LastColor};
use crate::params::SharedParams;

/// Upper bound on one cancellation-check interval.
pub const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Breathing envelope increment per tick.
const BREATHING_STEP: i32 = 5;

/// Peak and trough hold, in units of the per-tick delay.
const BREATHING_HOLD_TICKS: u32 = 50;

/// Effect mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EffectMode {
    Off = 0,
    FluidCycle = 1,
    Static = 2,
    Breathing = 3,
    RainbowWave = 4,
    RandomFlash = 5,
    Ambilight = 6,
}

impl EffectMode {
    /// Get mode from numeric value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Off),
            1 => Some(Self::FluidCycle),
            2 => Some(Self::Static),
            3 => Some(Self::Breathing),
            4 => Some(Self::RainbowWave),
            5 => Some(Self::RandomFlash),
            6 => Some(Self::Ambilight),
            _ => None,
        }
    }

    /// Parse a mode from a name or number
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(n) = s.parse::<u8>() {
            return Self::from_u8(n);
        }
        match s.to_ascii_lowercase().as_str() {
            "off" => Some(Self::Off),
            "fluid-cycle" | "fluid" | "cycle" => Some(Self::FluidCycle),
            "static" | "constant" => Some(Self::Static),
            "breathing" | "breathe" => Some(Self::Breathing),
            "rainbow-wave" | "rainbow" | "wave" => Some(Self::RainbowWave),
            "random-flash" | "random" | "flash" => Some(Self::RandomFlash),
            "ambilight" | "screen" => Some(Self::Ambilight),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::FluidCycle => "fluid-cycle",
            Self::Static => "static",
            Self::Breathing => "breathing",
            Self::RainbowWave => "rainbow-wave",
            Self::RandomFlash => "random-flash",
            Self::Ambilight => "ambilight",
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// List all modes with their numeric ids
    pub fn list_all() -> Vec<(u8, &'static str)> {
        [
            Self::Off,
            Self::FluidCycle,
            Self::Static,
            Self::Breathing,
            Self::RainbowWave,
            Self::RandomFlash,
            Self::Ambilight,
        ]
        .iter()
        .map(|m| (m.as_u8(), m.name()))
        .collect()
    }

    /// Map the 1-100 speed knob onto the mode's per-tick delay range.
    ///
    /// Ranges match the control panel's sliders: the fluid cycle runs
    /// down to tens of microseconds per step, breathing and the slow
    /// modes stay in the tens of milliseconds.
    pub fn delay_for_speed(&self, speed: u8) -> Duration {
        let norm = (speed.clamp(1, 100) as f64 - 1.0) / 99.0;
        let (max_us, min_us) = match self {
            Self::FluidCycle => (5_000.0, 10.0),
            Self::Breathing => (80_000.0, 5_000.0),
            Self::RainbowWave | Self::RandomFlash => (200_000.0, 10_000.0),
            Self::Static | Self::Ambilight | Self::Off => return self.default_delay(),
        };
        Duration::from_micros((max_us - norm * (max_us - min_us)) as u64)
    }

    /// Per-tick delay at the middle of the speed range.
    pub fn default_delay(&self) -> Duration {
        match self {
            Self::FluidCycle | Self::Breathing | Self::RainbowWave | Self::RandomFlash => {
                self.delay_for_speed(50)
            }
            // Static is paced by the parameter poll, ambilight by its
            // configured rates.
            Self::Static | Self::Ambilight | Self::Off => SLEEP_SLICE,
        }
    }
}

/// Everything a generator thread needs, cloned out of the engine.
pub struct EffectContext {
    pub writer: Arc<Mutex<BacklightWriter>>,
    pub params: Arc<SharedParams>,
    pub running: Arc<AtomicBool>,
    pub events: Arc<dyn EngineEvents>,
    pub last_color: Arc<LastColor>,
    pub restart_policy: RestartPolicy,
    /// Set while writes are failing, so `on_error` fires once per burst.
    write_failing: AtomicBool,
}

impl EffectContext {
    pub fn new(
        writer: Arc<Mutex<BacklightWriter>>,
        params: Arc<SharedParams>,
        running: Arc<AtomicBool>,
        events: Arc<dyn EngineEvents>,
        last_color: Arc<LastColor>,
        restart_policy: RestartPolicy,
    ) -> Self {
        Self {
            writer,
            params,
            running,
            events,
            last_color,
            restart_policy,
            write_failing: AtomicBool::new(false),
        }
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Push one color to the device.
    ///
    /// A write failure degrades to a skipped frame: the writer counts
    /// it, the first failure of a burst reaches `on_error`, and the loop
    /// carries on. The writer lock is held only for the write itself.
    pub fn emit(&self, color: Rgb) {
        let written = {
            let mut writer = self.writer.lock().unwrap();
            match writer.write_color(color.channels()) {
                Ok(written) => written,
                Err(e) => {
                    warn!("backlight write failed, skipping frame: {e}");
                    if !self.write_failing.swap(true, Ordering::Relaxed) {
                        self.events.on_error(&e.to_string());
                    }
                    return;
                }
            }
        };
        self.write_failing.store(false, Ordering::Relaxed);
        if written {
            self.last_color.store(color);
            self.events.on_color_updated(color);
        }
    }

    /// Sleep up to `total`, waking early when the running flag clears.
    ///
    /// Sleeps in slices of at most [`SLEEP_SLICE`] so stop latency is
    /// bounded regardless of how long the requested idle is.
    pub fn sleep_while_running(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.running() {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Fluid hue cycle: walk the precomputed hue wheel one entry per tick.
pub fn run_fluid_cycle(ctx: &EffectContext) {
    let wheel = HueWheel::default();
    let mut step = 0usize;
    while ctx.running() {
        ctx.emit(wheel.color_at(step));
        step = step.wrapping_add(1);
        ctx.sleep_while_running(ctx.params.delay());
    }
}

/// Static color: emit the configured color, then idle.
///
/// The idle re-emits every slice; redundant-write suppression makes
/// unchanged re-emits free, and a color change through `update_params`
/// reaches the device within one slice.
pub fn run_static(ctx: &EffectContext) {
    while ctx.running() {
        ctx.emit(ctx.params.color());
        ctx.sleep_while_running(SLEEP_SLICE);
    }
}

enum ParamsCheck {
    Unchanged,
    Restart,
}

/// Track live parameter changes inside the breathing envelope.
fn check_breathing_params(ctx: &EffectContext, gen: &mut u64, base: &mut Rgb) -> ParamsCheck {
    let now = ctx.params.generation();
    if now == *gen {
        return ParamsCheck::Unchanged;
    }
    *gen = now;
    match ctx.restart_policy {
        RestartPolicy::Resync => ParamsCheck::Restart,
        RestartPolicy::Continuous => {
            *base = ctx.params.color();
            ParamsCheck::Unchanged
        }
    }
}

/// Breathing: triangular envelope 0→255→0 scaling the base color.
///
/// Holds the peak and, distinctly, an explicit `(0,0,0)` trough. Under
/// the `resync` policy a parameter change restarts the envelope phase.
pub fn run_breathing(ctx: &EffectContext) {
    'cycle: while ctx.running() {
        let mut gen = ctx.params.generation();
        let mut base = ctx.params.color();

        // ascending edge
        let mut factor = 0i32;
        while factor <= 255 {
            if !ctx.running() {
                return;
            }
            if let ParamsCheck::Restart = check_breathing_params(ctx, &mut gen, &mut base) {
                continue 'cycle;
            }
            ctx.emit(base.scale_u8(factor as u8));
            ctx.sleep_while_running(ctx.params.delay());
            factor += BREATHING_STEP;
        }
        if ctx.running() {
            ctx.emit(base);
            ctx.sleep_while_running(ctx.params.delay() * BREATHING_HOLD_TICKS);
        }

        // descending edge
        let mut factor = 255i32;
        while factor >= 0 {
            if !ctx.running() {
                return;
            }
            if let ParamsCheck::Restart = check_breathing_params(ctx, &mut gen, &mut base) {
                continue 'cycle;
            }
            ctx.emit(base.scale_u8(factor as u8));
            ctx.sleep_while_running(ctx.params.delay());
            factor -= BREATHING_STEP;
        }
        if ctx.running() {
            // Explicit trough so the bottom is visually distinct.
            ctx.emit(Rgb::BLACK);
            ctx.sleep_while_running(ctx.params.delay() * BREATHING_HOLD_TICKS);
        }
    }
}

/// Rainbow wave: step through the seven-color spectrum palette.
pub fn run_rainbow_wave(ctx: &EffectContext) {
    let mut idx = 0usize;
    while ctx.running() {
        ctx.emit(Rgb::SPECTRUM[idx]);
        idx = (idx + 1) % Rgb::SPECTRUM.len();
        ctx.sleep_while_running(ctx.params.delay());
    }
}

/// Random flash: a uniformly random triple per tick.
pub fn run_random_flash(ctx: &EffectContext) {
    while ctx.running() {
        ctx.emit(Rgb::new(fastrand::u8(..), fastrand::u8(..), fastrand::u8(..)));
        ctx.sleep_while_running(ctx.params.delay());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names_and_numbers() {
        assert_eq!(EffectMode::parse("breathing"), Some(EffectMode::Breathing));
        assert_eq!(EffectMode::parse("BREATHE"), Some(EffectMode::Breathing));
        assert_eq!(EffectMode::parse("6"), Some(EffectMode::Ambilight));
        assert_eq!(EffectMode::parse("cycle"), Some(EffectMode::FluidCycle));
        assert_eq!(EffectMode::parse("nope"), None);
        assert_eq!(EffectMode::parse("99"), None);
    }

    #[test]
    fn test_list_all_covers_every_mode() {
        let all = EffectMode::list_all();
        assert_eq!(all.len(), 7);
        for (id, name) in all {
            assert_eq!(EffectMode::from_u8(id).unwrap().name(), name);
        }
    }

    #[test]
    fn test_delay_for_speed_range() {
        let fast = EffectMode::FluidCycle.delay_for_speed(100);
        let slow = EffectMode::FluidCycle.delay_for_speed(1);
        assert_eq!(fast, Duration::from_micros(10));
        assert_eq!(slow, Duration::from_micros(5_000));
        assert!(EffectMode::FluidCycle.delay_for_speed(50) < slow);
        assert!(EffectMode::FluidCycle.delay_for_speed(50) > fast);
        // Out-of-range speeds clamp instead of inverting.
        assert_eq!(EffectMode::FluidCycle.delay_for_speed(0), slow);
    }

    #[test]
    fn test_breathing_envelope_is_symmetric() {
        let base = Rgb::new(180, 90, 45);
        let ascending: Vec<Rgb> = (0..=255)
            .step_by(BREATHING_STEP as usize)
            .map(|f| base.scale_u8(f as u8))
            .collect();
        let descending: Vec<Rgb> = (0..=255)
            .rev()
            .step_by(BREATHING_STEP as usize)
            .map(|f| base.scale_u8(f as u8))
            .collect();
        let mut reversed = descending.clone();
        reversed.reverse();
        assert_eq!(ascending, reversed);
        assert_eq!(ascending.first(), Some(&Rgb::BLACK));
        assert_eq!(ascending.last(), Some(&base));
    }

    #[test]
    fn test_spectrum_palette_entries_are_distinct() {
        // Redundant-write suppression relies on consecutive palette
        // steps producing different payloads.
        for pair in Rgb::SPECTRUM.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert_ne!(Rgb::SPECTRUM[6], Rgb::SPECTRUM[0]);
        assert_eq!(Rgb::SPECTRUM.len(), 7);
    }
}
