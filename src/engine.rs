//! Engine controller: owns effect-mode state and the generator threads.
//!
//! At most one effect is active at a time; starting a second one fails
//! with [`EngineError::AlreadyRunning`] and has no side effect. Stop
//! latency is bounded by construction: every generator observes the
//! running flag at the top of each step and sleeps in bounded slices
//! (see [`crate::effect::SLEEP_SLICE`]), so `stop()` returns within one
//! slice plus one tick delay of the active mode.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, info};

use clevo_backlight::{BacklightError, BacklightWriter};

use crate::color::Rgb;
use crate::config::DriverConfig;
use crate::effect::{self, EffectContext, EffectMode};
use crate::params::{ParamsDelta, SharedParams};
use crate::screen_capture::{self, CaptureTool, ScreenSampler, SharedFrame};

/// Errors from the engine control surface
#[derive(Error, Debug)]
pub enum EngineError {
    /// An effect is already active; the caller must stop it first
    #[error("an effect is already running (stop it first)")]
    AlreadyRunning,

    /// No effect is active
    #[error("no effect is running")]
    NotRunning,

    /// Ambilight requested but no capture utility is installed
    #[error("no screen capture tool found (install gnome-screenshot, grim or scrot)")]
    NoCaptureTool,

    /// Device-layer failure
    #[error(transparent)]
    Backlight(#[from] BacklightError),
}

/// Callbacks a UI collaborator implements to mirror engine output.
///
/// All methods default to no-ops; the engine never depends on a
/// concrete UI type.
pub trait EngineEvents: Send + Sync {
    fn on_color_updated(&self, _color: Rgb) {}
    fn on_error(&self, _message: &str) {}
}

/// Event sink that ignores everything.
pub struct NullEvents;

impl EngineEvents for NullEvents {}

const LAST_COLOR_NONE: u64 = u64::MAX;

/// Lock-free latest-color slot for UI mirroring.
///
/// Single-slot latest-value hand-off: writers overwrite, readers get
/// the latest or none. Neither side can block the other.
pub struct LastColor(AtomicU64);

impl LastColor {
    pub fn new() -> Self {
        Self(AtomicU64::new(LAST_COLOR_NONE))
    }

    pub fn store(&self, color: Rgb) {
        self.0.store(color.packed() as u64, Ordering::Relaxed);
    }

    pub fn load(&self) -> Option<Rgb> {
        match self.0.load(Ordering::Relaxed) {
            LAST_COLOR_NONE => None,
            packed => Some(Rgb::from_packed(packed as u32)),
        }
    }
}

impl Default for LastColor {
    fn default() -> Self {
        Self::new()
    }
}

/// The lighting engine.
///
/// Owns the hardware writer, the live tuning parameters and the
/// generator threads. Construct it with an already-initialized writer:
/// the permission probe and the one-time device setup happen before any
/// thread is spawned, so a fatal `PermissionDenied` is reported from
/// the main thread, once.
pub struct Engine {
    writer: Arc<Mutex<BacklightWriter>>,
    params: Arc<SharedParams>,
    running: Arc<AtomicBool>,
    last_color: Arc<LastColor>,
    events: Arc<dyn EngineEvents>,
    config: DriverConfig,
    mode: EffectMode,
    threads: Vec<JoinHandle<()>>,
}

impl Engine {
    pub fn new(
        writer: BacklightWriter,
        config: DriverConfig,
        events: Arc<dyn EngineEvents>,
    ) -> Self {
        let params = SharedParams::new(
            Rgb::RED,
            EffectMode::FluidCycle.default_delay(),
            config.ambilight.sample_fps,
        );
        Self {
            writer: Arc::new(Mutex::new(writer)),
            params: Arc::new(params),
            running: Arc::new(AtomicBool::new(false)),
            last_color: Arc::new(LastColor::new()),
            events,
            config,
            mode: EffectMode::Off,
            threads: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> EffectMode {
        self.mode
    }

    /// Start an effect.
    ///
    /// Fails with [`EngineError::AlreadyRunning`] (no side effect) when
    /// a mode is active. The running flag is set before the first tick.
    /// `Off` is not a generator: it performs a one-shot blackout write
    /// and leaves the engine idle.
    pub fn start(&mut self, mode: EffectMode) -> Result<(), EngineError> {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }

        if mode == EffectMode::Off {
            let mut writer = self.writer.lock().unwrap();
            writer.write_color(Rgb::BLACK.channels())?;
            drop(writer);
            self.last_color.store(Rgb::BLACK);
            self.mode = EffectMode::Off;
            return Ok(());
        }

        // Anything that can fail is resolved before the flag flips, so a
        // failed start leaves no running state behind.
        let capture_tool = if mode == EffectMode::Ambilight {
            Some(CaptureTool::detect().ok_or(EngineError::NoCaptureTool)?)
        } else {
            None
        };

        self.running.store(true, Ordering::SeqCst);
        self.mode = mode;

        match mode {
            EffectMode::FluidCycle => self.spawn(effect::run_fluid_cycle),
            EffectMode::Static => self.spawn(effect::run_static),
            EffectMode::Breathing => self.spawn(effect::run_breathing),
            EffectMode::RainbowWave => self.spawn(effect::run_rainbow_wave),
            EffectMode::RandomFlash => self.spawn(effect::run_random_flash),
            // The tool was resolved above, before the running flag
            // flipped. The frame cell lives exactly as long as the two
            // loops that share it.
            EffectMode::Ambilight => {
                if let Some(tool) = capture_tool {
                    let frame = Arc::new(SharedFrame::default());
                    let sampler = ScreenSampler::new(tool, &self.config.ambilight);
                    let render_config = self.config.ambilight.clone();

                    let sampler_ctx = self.context();
                    let sampler_frame = Arc::clone(&frame);
                    self.threads.push(thread::spawn(move || {
                        screen_capture::run_sampler_loop(&sampler_ctx, &sampler, &sampler_frame);
                    }));

                    let render_ctx = self.context();
                    self.threads.push(thread::spawn(move || {
                        screen_capture::run_render_loop(&render_ctx, &frame, &render_config);
                    }));
                }
            }
            EffectMode::Off => {}
        }

        info!(mode = mode.name(), "effect started");
        Ok(())
    }

    /// Stop the active effect and join its threads.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if !self.is_running() {
            return Err(EngineError::NotRunning);
        }
        self.running.store(false, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        info!(mode = self.mode.name(), "effect stopped");
        self.mode = EffectMode::Off;
        Ok(())
    }

    /// Apply a live parameter update.
    ///
    /// In-flight generators pick the new values up on their next tick;
    /// no restart is required (Breathing under the `resync` policy
    /// restarts its envelope phase by design).
    pub fn update_params(&self, delta: ParamsDelta) {
        debug!(?delta, "params updated");
        self.params.apply(delta);
    }

    /// Snapshot of the last color written to the device.
    ///
    /// Lock-free; safe to poll from a UI thread without ever blocking a
    /// generator.
    pub fn last_color(&self) -> Option<Rgb> {
        self.last_color.load()
    }

    /// Transient write failures seen so far, for diagnosis.
    pub fn transient_errors(&self) -> u64 {
        self.writer.lock().unwrap().transient_errors()
    }

    fn context(&self) -> EffectContext {
        EffectContext::new(
            Arc::clone(&self.writer),
            Arc::clone(&self.params),
            Arc::clone(&self.running),
            Arc::clone(&self.events),
            Arc::clone(&self.last_color),
            self.config.breathing.restart_policy,
        )
    }

    fn spawn(&mut self, f: fn(&EffectContext)) {
        let ctx = self.context();
        self.threads.push(thread::spawn(move || f(&ctx)));
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
