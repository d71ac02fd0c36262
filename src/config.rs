//! Driver configuration.
//!
//! Loaded from `config.toml` under the XDG config directory; the default
//! file is materialized on first run so users have something to edit.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Which part of the screen feeds the ambilight average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureRegion {
    /// The whole frame
    Full,
    /// A band of `band_height` pixels at the bottom of the frame
    BottomBand,
}

/// Whether a base-color change restarts the breathing envelope phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Restart the envelope from the trough on every change, so the new
    /// color always fades in from dark. Intentional resynchronization.
    Resync,
    /// Pick the new color up mid-envelope without a phase reset.
    Continuous,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbilightConfig {
    /// Screen captures per second
    pub sample_fps: u32,
    /// Hardware writes per second for the smoothing loop
    pub render_fps: u32,
    /// Exponential smoothing factor, 0 < alpha <= 1
    pub alpha: f32,
    /// Capture region
    pub region: CaptureRegion,
    /// Height in pixels of the bottom band
    pub band_height: u32,
}

impl Default for AmbilightConfig {
    fn default() -> Self {
        Self {
            sample_fps: 30,
            render_fps: 60,
            alpha: 0.2,
            region: CaptureRegion::BottomBand,
            band_height: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreathingConfig {
    pub restart_policy: RestartPolicy,
}

impl Default for BreathingConfig {
    fn default() -> Self {
        Self {
            restart_policy: RestartPolicy::Resync,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Override the sysfs device directory (mainly for testing)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_path: Option<PathBuf>,
    pub ambilight: AmbilightConfig,
    pub breathing: BreathingConfig,
}

impl DriverConfig {
    /// Parse from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("parse TOML: {e}"))
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("read {}: {e}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Load the config from the config directory, creating the default
    /// file if it doesn't exist.
    pub fn load_default() -> Result<Self, String> {
        let path = default_config_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| format!("create config dir: {e}"))?;
            }
            std::fs::write(&path, DEFAULT_CONFIG_TOML)
                .map_err(|e| format!("write default config: {e}"))?;
            tracing::info!("created default config: {}", path.display());
        }
        Self::load(&path)
    }
}

/// Path to the config TOML file.
pub fn default_config_path() -> PathBuf {
    dirs_path().join("config.toml")
}

fn dirs_path() -> PathBuf {
    if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(config).join("clevo-driver")
    } else if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".config/clevo-driver")
    } else {
        PathBuf::from("/tmp/clevo-driver")
    }
}

pub const DEFAULT_CONFIG_TOML: &str = r#"# Clevo RGB driver configuration

# Uncomment to point at a non-standard LED class directory.
# device_path = "/sys/class/leds/rgb:kbd_backlight"

[ambilight]
# Screen captures per second.
sample_fps = 30
# Hardware writes per second for the smoothing loop.
render_fps = 60
# Exponential smoothing factor (0 < alpha <= 1). Lower is smoother.
alpha = 0.2
# "bottom-band" averages only the lowest band_height pixels of the
# screen; "full" averages the whole frame.
region = "bottom-band"
band_height = 200

[breathing]
# "resync" restarts the envelope when the base color changes;
# "continuous" picks the new color up mid-envelope.
restart_policy = "resync"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_toml_parses() {
        let config = DriverConfig::from_toml(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(config.ambilight.sample_fps, 30);
        assert_eq!(config.ambilight.region, CaptureRegion::BottomBand);
        assert_eq!(config.ambilight.band_height, 200);
        assert_eq!(config.breathing.restart_policy, RestartPolicy::Resync);
        assert!(config.device_path.is_none());
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = DriverConfig::from_toml("").unwrap();
        assert_eq!(config.ambilight.render_fps, 60);
        assert!((config.ambilight.alpha - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_partial_override() {
        let config = DriverConfig::from_toml(
            "[ambilight]\nregion = \"full\"\nalpha = 0.5\n\n[breathing]\nrestart_policy = \"continuous\"\n",
        )
        .unwrap();
        assert_eq!(config.ambilight.region, CaptureRegion::Full);
        assert!((config.ambilight.alpha - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.breathing.restart_policy, RestartPolicy::Continuous);
        // Untouched fields keep their defaults.
        assert_eq!(config.ambilight.sample_fps, 30);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, DEFAULT_CONFIG_TOML).unwrap();
        let config = DriverConfig::load(&path).unwrap();
        assert_eq!(config.ambilight.band_height, 200);

        let missing = DriverConfig::load(&dir.path().join("nope.toml"));
        assert!(missing.is_err());
    }

    #[test]
    fn test_round_trip() {
        let config = DriverConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed = DriverConfig::from_toml(&serialized).unwrap();
        assert_eq!(parsed.ambilight.band_height, config.ambilight.band_height);
        assert_eq!(parsed.breathing.restart_policy, config.breathing.restart_policy);
    }
}
