//! Backlight interface error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors from backlight operations
#[derive(Error, Debug)]
pub enum BacklightError {
    /// Sysfs control files missing (unsupported keyboard or driver not loaded)
    #[error("Backlight device not found: {0} (is the clevo/tuxedo keyboard driver loaded?)")]
    NotFound(PathBuf),

    /// Write refused even through the elevated channel
    #[error("Permission denied writing {0} (elevation unavailable)")]
    PermissionDenied(PathBuf),

    /// Interactive sudo authorization was refused or timed out
    #[error("Sudo authorization failed: {0}")]
    AuthFailed(String),

    /// Privileged helper exceeded its time bound
    #[error("Elevated write timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Color write attempted before `initialize()`
    #[error("Writer not initialized (call initialize() first)")]
    NotInitialized,

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BacklightError {
    /// Whether the error is transient: the caller may skip this tick and
    /// retry on the next one.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Io(_))
    }
}
