// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "clevo_driver")]
#[command(author, version, about = "Clevo/Tongfang RGB Keyboard Backlight Driver")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Override the sysfs device directory
    #[arg(long, global = true, value_name = "DIR")]
    pub device: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show device path and negotiated write access
    #[command(visible_alias = "p")]
    Probe,

    /// List effect modes
    #[command(visible_aliases = ["m", "list"])]
    Modes,

    /// Run an effect until Ctrl+C
    #[command(visible_alias = "r")]
    Run {
        /// Effect mode (number or name like 'breathing', 'ambilight')
        mode: String,

        /// Base color for static/breathing ('red', '#00FF80', ...)
        #[arg(short, long, default_value = "red")]
        color: String,

        /// Speed (1-100, mode-specific delay mapping)
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
        speed: Option<u8>,

        /// Screen samples per second (ambilight)
        #[arg(long)]
        fps: Option<u32>,
    },

    /// Write a single static color and exit
    #[command(visible_alias = "s")]
    Set {
        /// Color ('red', '#00FF80', ...)
        color: String,
    },

    /// Turn the backlight off
    Off,
}
