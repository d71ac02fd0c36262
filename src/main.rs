//! Clevo RGB Keyboard Backlight Driver CLI
//!
//! A command-line interface for driving Clevo/Tongfang addressable RGB
//! keyboard backlights through the kernel LED class.

use clap::Parser;
use tracing_subscriber::EnvFilter;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers (split from main.rs)
mod commands;

use clevo_driver::DriverConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = DriverConfig::load_default().unwrap_or_else(|e| {
        tracing::warn!("config load failed ({e}), using defaults");
        DriverConfig::default()
    });

    match cli.command {
        None => {
            // Default: show device and access information
            commands::probe(&config, cli.device)
        }
        Some(Commands::Probe) => commands::probe(&config, cli.device),
        Some(Commands::Modes) => commands::modes(),
        Some(Commands::Run {
            mode,
            color,
            speed,
            fps,
        }) => commands::run(config, cli.device, &mode, &color, speed, fps),
        Some(Commands::Set { color }) => commands::set(&config, cli.device, &color),
        Some(Commands::Off) => commands::off(&config, cli.device),
    }
}
