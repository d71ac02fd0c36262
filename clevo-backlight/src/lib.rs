//! Sysfs access layer for Clevo/Tongfang RGB keyboard backlights
//!
//! The kernel exposes the keyboard as a multicolor LED class device with
//! three attribute files under `/sys/class/leds/rgb:kbd_backlight`:
//! `brightness`, `multi_index` and `multi_intensity`. This crate handles
//! locating the device, negotiating write access (direct or via a cached
//! sudo session) and pushing intensity triples at high tick rates.

pub mod access;
pub mod error;
pub mod writer;

pub use access::{probe_access, AccessMode, ElevatedSession};
pub use error::BacklightError;
pub use writer::BacklightWriter;

use std::path::{Path, PathBuf};

/// Default LED class directory for the keyboard backlight
pub const DEFAULT_DEVICE_PATH: &str = "/sys/class/leds/rgb:kbd_backlight";

/// Brightness value written during initialization (device maximum)
pub const BRIGHTNESS_MAX: u8 = 255;

const BRIGHTNESS_FILE: &str = "brightness";
const MULTI_INDEX_FILE: &str = "multi_index";
const MULTI_INTENSITY_FILE: &str = "multi_intensity";

/// A located backlight device: the sysfs directory plus its three
/// attribute files, all verified to exist.
#[derive(Debug, Clone)]
pub struct BacklightDevice {
    base: PathBuf,
}

impl BacklightDevice {
    /// Locate the backlight at the default sysfs path.
    pub fn discover() -> Result<Self, BacklightError> {
        Self::at(DEFAULT_DEVICE_PATH)
    }

    /// Locate the backlight at a specific directory.
    ///
    /// All three attribute files must exist; a missing file means the
    /// keyboard is unsupported or the kernel driver is not loaded.
    pub fn at(base: impl Into<PathBuf>) -> Result<Self, BacklightError> {
        let base = base.into();
        let device = Self { base };
        for path in [
            device.brightness_path(),
            device.multi_index_path(),
            device.intensity_path(),
        ] {
            if !path.exists() {
                return Err(BacklightError::NotFound(device.base.clone()));
            }
        }
        tracing::debug!(path = %device.base.display(), "backlight device found");
        Ok(device)
    }

    /// Sysfs directory of the device
    pub fn path(&self) -> &Path {
        &self.base
    }

    /// Path to the `multi_intensity` file (the "R G B" triple)
    pub fn intensity_path(&self) -> PathBuf {
        self.base.join(MULTI_INTENSITY_FILE)
    }

    /// Path to the `brightness` file
    pub fn brightness_path(&self) -> PathBuf {
        self.base.join(BRIGHTNESS_FILE)
    }

    /// Path to the `multi_index` file (LED addressing submode)
    pub fn multi_index_path(&self) -> PathBuf {
        self.base.join(MULTI_INDEX_FILE)
    }
}
