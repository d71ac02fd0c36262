//! Hardware writer: intensity triples and one-time device setup

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, trace, warn};

use crate::access::{AccessMode, ElevatedSession};
use crate::error::BacklightError;
use crate::{BacklightDevice, BRIGHTNESS_MAX};

enum WriteChannel {
    /// Pre-opened descriptor to `multi_intensity`, rewound before each
    /// write. Sysfs attributes treat every write as a full store, and
    /// keeping the descriptor open avoids an open/close pair per tick.
    Direct { intensity: File },
    /// Writes routed through the cached sudo session
    Elevated { session: ElevatedSession },
}

/// Writer for the backlight device files.
///
/// Serializes intensity triples to the textual protocol the kernel
/// expects (`"R G B"`, decimal, space-separated) and suppresses writes
/// whose payload matches the last successful one, which is what sustains
/// sub-millisecond tick rates over a slow sysfs path.
pub struct BacklightWriter {
    device: BacklightDevice,
    channel: WriteChannel,
    last_payload: Option<String>,
    initialized: bool,
    transient_errors: u64,
}

impl BacklightWriter {
    /// Open a writer for the negotiated access mode.
    ///
    /// `Elevated` establishes the sudo session here (one interactive
    /// authorization at most); `Direct` pre-opens the intensity file for
    /// the process lifetime.
    pub fn open(device: BacklightDevice, mode: AccessMode) -> Result<Self, BacklightError> {
        let channel = match mode {
            AccessMode::Direct => {
                let intensity = OpenOptions::new()
                    .write(true)
                    .open(device.intensity_path())?;
                WriteChannel::Direct { intensity }
            }
            AccessMode::Elevated => WriteChannel::Elevated {
                session: ElevatedSession::establish()?,
            },
        };
        Ok(Self {
            device,
            channel,
            last_payload: None,
            initialized: false,
            transient_errors: 0,
        })
    }

    pub fn access_mode(&self) -> AccessMode {
        match self.channel {
            WriteChannel::Direct { .. } => AccessMode::Direct,
            WriteChannel::Elevated { .. } => AccessMode::Elevated,
        }
    }

    pub fn device(&self) -> &BacklightDevice {
        &self.device
    }

    /// One-time session setup: full brightness, fixed-color addressing.
    ///
    /// Must run before the first [`write_color`](Self::write_color).
    /// Idempotent within a session. In elevated mode both writes ride the
    /// single cached authorization.
    pub fn initialize(&mut self) -> Result<(), BacklightError> {
        if self.initialized {
            return Ok(());
        }
        let brightness = self.device.brightness_path();
        let multi_index = self.device.multi_index_path();
        self.write_raw(&brightness, &BRIGHTNESS_MAX.to_string())?;
        self.write_raw(&multi_index, "0")?;
        self.initialized = true;
        debug!(brightness = BRIGHTNESS_MAX, "backlight initialized");
        Ok(())
    }

    /// Write an intensity triple.
    ///
    /// Returns `Ok(true)` if a device write happened, `Ok(false)` if the
    /// payload matched the last successful write and was suppressed. A
    /// failed write does not update the suppression state, so the next
    /// tick retries the same payload.
    pub fn write_color(&mut self, (r, g, b): (u8, u8, u8)) -> Result<bool, BacklightError> {
        if !self.initialized {
            return Err(BacklightError::NotInitialized);
        }
        let payload = format!("{r} {g} {b}");
        if self.last_payload.as_deref() == Some(payload.as_str()) {
            trace!(%payload, "write suppressed (unchanged)");
            return Ok(false);
        }
        let intensity = self.device.intensity_path();
        match self.write_raw(&intensity, &payload) {
            Ok(()) => {
                self.last_payload = Some(payload);
                Ok(true)
            }
            Err(e) => {
                if e.is_transient() {
                    self.transient_errors += 1;
                    warn!(
                        total = self.transient_errors,
                        "transient backlight write failure: {e}"
                    );
                }
                Err(e)
            }
        }
    }

    /// Transient write failures seen so far, for diagnosis.
    pub fn transient_errors(&self) -> u64 {
        self.transient_errors
    }

    fn write_raw(&mut self, path: &Path, value: &str) -> Result<(), BacklightError> {
        match &mut self.channel {
            WriteChannel::Direct { intensity } => {
                if path == self.device.intensity_path() {
                    // Hot path: reuse the pre-opened descriptor.
                    intensity.set_len(0)?;
                    intensity.seek(SeekFrom::Start(0))?;
                    intensity.write_all(value.as_bytes())?;
                } else {
                    std::fs::write(path, value)?;
                }
                Ok(())
            }
            WriteChannel::Elevated { session } => session.write(path, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in ["brightness", "multi_index", "multi_intensity"] {
            std::fs::write(dir.path().join(name), "0").unwrap();
        }
        dir
    }

    fn open_writer(dir: &tempfile::TempDir) -> BacklightWriter {
        let device = BacklightDevice::at(dir.path()).unwrap();
        BacklightWriter::open(device, AccessMode::Direct).unwrap()
    }

    #[test]
    fn test_write_before_initialize_is_an_error() {
        let dir = fake_sysfs();
        let mut writer = open_writer(&dir);
        assert!(matches!(
            writer.write_color((1, 2, 3)),
            Err(BacklightError::NotInitialized)
        ));
    }

    #[test]
    fn test_initialize_writes_brightness_and_index() {
        let dir = fake_sysfs();
        let mut writer = open_writer(&dir);
        writer.initialize().unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("brightness")).unwrap(),
            "255"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("multi_index")).unwrap(),
            "0"
        );
    }

    #[test]
    fn test_payload_is_space_separated_decimal() {
        let dir = fake_sysfs();
        let mut writer = open_writer(&dir);
        writer.initialize().unwrap();
        writer.write_color((10, 20, 30)).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("multi_intensity")).unwrap(),
            "10 20 30"
        );
    }

    #[test]
    fn test_redundant_write_is_suppressed() {
        let dir = fake_sysfs();
        let mut writer = open_writer(&dir);
        writer.initialize().unwrap();
        assert!(writer.write_color((10, 20, 30)).unwrap());
        assert!(!writer.write_color((10, 20, 30)).unwrap());
        // A changed channel writes again.
        assert!(writer.write_color((11, 20, 30)).unwrap());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("multi_intensity")).unwrap(),
            "11 20 30"
        );
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let dir = fake_sysfs();
        let mut writer = open_writer(&dir);
        writer.initialize().unwrap();
        std::fs::write(dir.path().join("brightness"), "7").unwrap();
        writer.initialize().unwrap();
        // Second call is a no-op, the file keeps the external value.
        assert_eq!(
            std::fs::read_to_string(dir.path().join("brightness")).unwrap(),
            "7"
        );
    }
}
