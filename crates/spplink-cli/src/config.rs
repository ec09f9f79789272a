//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Device name used when nothing else selects one.
pub const DEFAULT_DEVICE_NAME: &str = "RobotSpider";

/// Discovery timeout in seconds when neither flag nor config sets one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Upper bound on any timeout given in seconds (one hour).
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Seconds to keep a successful connection open.
pub const DEFAULT_HOLD_SECS: u64 = 5;

/// Keys accepted by `config set`.
pub const KEYS: &[&str] = &["device", "timeout", "hold", "no_color"];

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Default device name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Discovery timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Seconds to hold the connection open after connecting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold: Option<u64>,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("spplink")
            .join("config.toml")
    }

    /// Load config from the default location, or return default if not found
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`.
    ///
    /// A missing file yields the defaults. An unreadable or malformed file
    /// prints a warning and also yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    /// Save config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Set `key` from its string form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "device" => {
                if value.trim().is_empty() {
                    bail!("device name cannot be empty");
                }
                self.device = Some(value.to_string());
            }
            "timeout" => self.timeout = Some(parse_seconds(key, value)?),
            "hold" => {
                self.hold = Some(
                    value
                        .parse()
                        .with_context(|| format!("Invalid value for hold: {value}"))?,
                );
            }
            "no_color" => {
                self.no_color = value
                    .parse()
                    .with_context(|| format!("Invalid value for no_color: {value} (use true/false)"))?;
            }
            other => bail!("Unknown config key '{}'. Valid keys: {}", other, KEYS.join(", ")),
        }
        Ok(())
    }

    /// Current value of `key`, or `None` if unset or unknown.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "device" => self.device.clone(),
            "timeout" => self.timeout.map(|t| t.to_string()),
            "hold" => self.hold.map(|h| h.to_string()),
            "no_color" => Some(self.no_color.to_string()),
            _ => None,
        }
    }

    /// Reset `key` to its default.
    pub fn unset(&mut self, key: &str) -> Result<()> {
        match key {
            "device" => self.device = None,
            "timeout" => self.timeout = None,
            "hold" => self.hold = None,
            "no_color" => self.no_color = false,
            other => bail!("Unknown config key '{}'. Valid keys: {}", other, KEYS.join(", ")),
        }
        Ok(())
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<u64> {
    let secs: u64 = value
        .parse()
        .with_context(|| format!("Invalid value for {key}: {value}"))?;
    if !(1..=MAX_TIMEOUT_SECS).contains(&secs) {
        bail!("{key} must be between 1 and {MAX_TIMEOUT_SECS} seconds");
    }
    Ok(secs)
}

/// Where the target device name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSource {
    /// `--name` or `SPPLINK_DEVICE`
    Argument,
    /// `device` in the config file
    Config,
    /// Built-in default
    Default,
}

/// Resolve the target device name from arg (or env var), config, or the
/// built-in default.
pub fn resolve_device(name: Option<String>, config: &Config) -> (String, DeviceSource) {
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        (name, DeviceSource::Argument)
    } else if let Some(name) = &config.device {
        (name.clone(), DeviceSource::Config)
    } else {
        (DEFAULT_DEVICE_NAME.to_string(), DeviceSource::Default)
    }
}

/// Print device source feedback unless quiet.
pub fn print_device_source_feedback(name: &str, source: DeviceSource, quiet: bool) {
    if quiet {
        return;
    }
    match source {
        DeviceSource::Config => eprintln!("Using configured device: {}", name),
        DeviceSource::Default => eprintln!("Using default device name: {}", name),
        DeviceSource::Argument => {}
    }
}

/// Resolve a duration in seconds: explicit value, then config, then default.
pub fn resolve_secs(explicit: Option<u64>, configured: Option<u64>, default: u64) -> u64 {
    explicit.or(configured).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_device_prefers_arg() {
        let config = Config {
            device: Some("config-device".to_string()),
            ..Default::default()
        };
        let (name, source) = resolve_device(Some("arg-device".to_string()), &config);
        assert_eq!(name, "arg-device");
        assert_eq!(source, DeviceSource::Argument);
    }

    #[test]
    fn test_resolve_device_falls_back_to_config() {
        let config = Config {
            device: Some("config-device".to_string()),
            ..Default::default()
        };
        let (name, source) = resolve_device(None, &config);
        assert_eq!(name, "config-device");
        assert_eq!(source, DeviceSource::Config);
    }

    #[test]
    fn test_resolve_device_defaults_to_robot_spider() {
        let (name, source) = resolve_device(Some(String::new()), &Config::default());
        assert_eq!(name, DEFAULT_DEVICE_NAME);
        assert_eq!(source, DeviceSource::Default);
    }

    #[test]
    fn test_resolve_secs_order() {
        assert_eq!(resolve_secs(Some(3), Some(60), 10), 3);
        assert_eq!(resolve_secs(None, Some(60), 10), 60);
        assert_eq!(resolve_secs(None, None, 10), 10);
    }

    #[test]
    fn test_set_known_keys() {
        let mut config = Config::default();
        config.set("device", "Rover").unwrap();
        config.set("timeout", "20").unwrap();
        config.set("hold", "0").unwrap();
        config.set("no_color", "true").unwrap();
        assert_eq!(config.device.as_deref(), Some("Rover"));
        assert_eq!(config.timeout, Some(20));
        assert_eq!(config.hold, Some(0));
        assert!(config.no_color);
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut config = Config::default();
        assert!(config.set("timeout", "0").is_err());
        assert!(config.set("timeout", "soon").is_err());
        assert!(config.set("timeout", "18446744073709551615").is_err());
        assert!(config.set("timeout", "3601").is_err());
        assert!(config.set("timeout", "3600").is_ok());
        assert!(config.set("no_color", "maybe").is_err());
        let err = config.set("colour", "red").unwrap_err();
        assert!(err.to_string().contains("device, timeout, hold, no_color"));
    }

    #[test]
    fn test_get_and_unset() {
        let mut config = Config::default();
        config.set("timeout", "25").unwrap();
        assert_eq!(config.get("timeout").as_deref(), Some("25"));
        config.unset("timeout").unwrap();
        assert_eq!(config.get("timeout"), None);
        assert_eq!(config.get("no_color").as_deref(), Some("false"));
        assert!(config.unset("bogus").is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            device: Some("RobotSpider".to_string()),
            timeout: Some(30),
            hold: None,
            no_color: true,
        };
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path), config);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            Config::load_from(&dir.path().join("absent.toml")),
            Config::default()
        );
    }

    #[test]
    fn test_malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "timeout = \"ten\"\n").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_path_ends_with_app_dir() {
        let path = Config::path();
        assert!(path.ends_with("spplink/config.toml"));
    }
}
