//! Write-access negotiation for the sysfs backlight files
//!
//! The LED class files are root-owned on most installs. We probe once at
//! startup: if the intensity file is directly writable we stay in
//! [`AccessMode::Direct`] for the process lifetime; otherwise every write
//! routes through a cached sudo session established with a single
//! interactive authorization. There is no silent fallback between modes.

use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::BacklightError;
use crate::BacklightDevice;

/// How writes reach the device files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// The process can write the sysfs files itself
    Direct,
    /// Writes go through a cached sudo session
    Elevated,
}

impl AccessMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Elevated => "elevated",
        }
    }
}

/// Bound on the non-interactive cached-credential check
const CACHED_CHECK_TIMEOUT: Duration = Duration::from_secs(1);

/// Bound on the single interactive authorization
const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on one privileged write
const WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Probe whether the current process can write the device directly.
///
/// Opening the intensity file for writing exercises the same kernel
/// permission check as a write without emitting a payload, so the probe
/// has no visible effect on the LEDs.
pub fn probe_access(device: &BacklightDevice) -> Result<AccessMode, BacklightError> {
    match std::fs::OpenOptions::new()
        .write(true)
        .open(device.intensity_path())
    {
        Ok(_) => {
            info!("direct sysfs write access available");
            Ok(AccessMode::Direct)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            info!("no direct write access, sudo session required");
            Ok(AccessMode::Elevated)
        }
        Err(e) => Err(e.into()),
    }
}

/// A process-lifetime sudo session.
///
/// Established with at most one interactive prompt; afterwards every write
/// rides the cached credential non-interactively (`sudo -n`), so the hot
/// path can never block on user input. Dropping the session revokes the
/// cached credential.
pub struct ElevatedSession {
    _private: (),
}

impl ElevatedSession {
    /// Validate or interactively establish the cached credential.
    pub fn establish() -> Result<Self, BacklightError> {
        // Fast path: a credential is already cached from an earlier sudo.
        let cached = Command::new("sudo")
            .args(["-n", "true"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BacklightError::AuthFailed(format!("cannot invoke sudo: {e}")))
            .and_then(|mut child| wait_bounded(&mut child, CACHED_CHECK_TIMEOUT));

        if matches!(cached, Ok(status) if status.success()) {
            debug!("sudo credential already cached");
            return Ok(Self { _private: () });
        }

        // One interactive authorization, bounded. Stdio is inherited so
        // the password prompt reaches the terminal.
        info!("sudo authorization required for backlight writes");
        let mut child = Command::new("sudo")
            .arg("-v")
            .spawn()
            .map_err(|e| BacklightError::AuthFailed(format!("cannot invoke sudo: {e}")))?;
        let status = wait_bounded(&mut child, AUTH_TIMEOUT)?;
        if status.success() {
            info!("sudo session established");
            Ok(Self { _private: () })
        } else {
            Err(BacklightError::AuthFailed(
                "authorization was refused".into(),
            ))
        }
    }

    /// Write `value` to `path` through the cached credential.
    ///
    /// Fixed-argument invocation of `tee`; the payload travels on stdin,
    /// never through a shell, so no quoting or interpolation is involved.
    pub fn write(&self, path: &Path, value: &str) -> Result<(), BacklightError> {
        let mut child = Command::new("sudo")
            .args(["-n", "tee", "--"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        if let Err(e) = feed_stdin(&mut child, value) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e.into());
        }

        let status = wait_bounded(&mut child, WRITE_TIMEOUT)?;
        if status.success() {
            Ok(())
        } else {
            Err(BacklightError::PermissionDenied(path.to_path_buf()))
        }
    }
}

impl Drop for ElevatedSession {
    fn drop(&mut self) {
        // Revoke the cached credential; best effort.
        let result = Command::new("sudo")
            .arg("-k")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = result {
            warn!("failed to revoke sudo credential: {e}");
        }
    }
}

fn feed_stdin(child: &mut Child, value: &str) -> std::io::Result<()> {
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| std::io::Error::other("child stdin unavailable"))?;
    stdin.write_all(value.as_bytes())
    // stdin drops here, closing the pipe so tee can finish
}

/// Wait for a child process with a deadline, killing it on expiry.
fn wait_bounded(child: &mut Child, timeout: Duration) -> Result<ExitStatus, BacklightError> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BacklightError::Timeout(timeout));
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}
