//! Command handlers for the CLI application.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use clevo_backlight::{probe_access, BacklightDevice, BacklightWriter};
use clevo_driver::{DriverConfig, EffectMode, Engine, EngineEvents, ParamsDelta, Rgb};

/// Result type for command handlers
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Poll interval of the foreground last-color mirror loop. Low rate on
/// purpose: mirroring must never sit on the write path.
const MIRROR_INTERVAL: Duration = Duration::from_millis(500);

/// Set up a Ctrl-C handler that clears the given flag when triggered.
fn setup_interrupt_handler() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    ctrlc::set_handler(move || {
        running_clone.store(false, Ordering::SeqCst);
    })
    .ok();

    running
}

/// Resolve the device directory: CLI flag > config > default path.
fn resolve_device(
    config: &DriverConfig,
    cli_device: Option<PathBuf>,
) -> Result<BacklightDevice, Box<dyn std::error::Error>> {
    let device = match cli_device.or_else(|| config.device_path.clone()) {
        Some(path) => BacklightDevice::at(path)?,
        None => BacklightDevice::discover()?,
    };
    Ok(device)
}

/// Probe + one-time setup; fatal permission problems surface here,
/// before any thread exists.
fn open_writer(device: BacklightDevice) -> Result<BacklightWriter, Box<dyn std::error::Error>> {
    let mode = probe_access(&device)?;
    let mut writer = BacklightWriter::open(device, mode)?;
    writer.initialize()?;
    Ok(writer)
}

/// Show device path and negotiated write access.
pub fn probe(config: &DriverConfig, cli_device: Option<PathBuf>) -> CommandResult {
    let device = resolve_device(config, cli_device)?;
    println!("Device:  {}", device.path().display());
    let mode = probe_access(&device)?;
    println!("Access:  {}", mode.name());
    Ok(())
}

/// List all effect modes.
pub fn modes() -> CommandResult {
    println!("Available effect modes:");
    for (id, name) in EffectMode::list_all() {
        println!("  {id} - {name}");
    }
    Ok(())
}

/// Event sink that mirrors engine output to the log.
struct LogEvents;

impl EngineEvents for LogEvents {
    fn on_error(&self, message: &str) {
        eprintln!("backlight error: {message}");
    }
}

/// Run an effect in the foreground until Ctrl+C.
pub fn run(
    config: DriverConfig,
    cli_device: Option<PathBuf>,
    mode_str: &str,
    color_str: &str,
    speed: Option<u8>,
    fps: Option<u32>,
) -> CommandResult {
    let mode =
        EffectMode::parse(mode_str).ok_or_else(|| format!("unknown mode: {mode_str}"))?;
    let color = Rgb::parse(color_str).ok_or_else(|| format!("invalid color: {color_str}"))?;

    let device = resolve_device(&config, cli_device)?;
    let writer = open_writer(device)?;
    let mut engine = Engine::new(writer, config, Arc::new(LogEvents));

    let delay = speed
        .map(|s| mode.delay_for_speed(s))
        .unwrap_or_else(|| mode.default_delay());
    engine.update_params(ParamsDelta {
        color: Some(color),
        delay: Some(delay),
        sample_fps: fps,
    });

    engine.start(mode)?;
    if mode == EffectMode::Off {
        println!("Backlight off.");
        return Ok(());
    }
    println!("Running '{}' (Ctrl+C to stop)...", mode.name());

    // Low-rate UI mirror: poll the engine's last color off the hot path.
    let running = setup_interrupt_handler();
    while running.load(Ordering::SeqCst) {
        if let Some(c) = engine.last_color() {
            debug!(r = c.r, g = c.g, b = c.b, "mirrored color");
        }
        std::thread::sleep(MIRROR_INTERVAL);
    }

    engine.stop()?;
    println!("Stopped.");
    Ok(())
}

/// One-shot static color write.
pub fn set(config: &DriverConfig, cli_device: Option<PathBuf>, color_str: &str) -> CommandResult {
    let color = Rgb::parse(color_str).ok_or_else(|| format!("invalid color: {color_str}"))?;
    let device = resolve_device(config, cli_device)?;
    let mut writer = open_writer(device)?;
    writer.write_color(color.channels())?;
    println!("Backlight set to {} {} {}", color.r, color.g, color.b);
    Ok(())
}

/// One-shot blackout.
pub fn off(config: &DriverConfig, cli_device: Option<PathBuf>) -> CommandResult {
    let device = resolve_device(config, cli_device)?;
    let mut writer = open_writer(device)?;
    writer.write_color(Rgb::BLACK.channels())?;
    println!("Backlight off.");
    Ok(())
}
