use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::utils::error::GpsError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Receiver and sampling settings
    pub gps: GpsConfig,

    // Terminal display settings
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    pub serial_port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
    pub provider: String,               // Provider name stamped on every sample
    pub sample_interval_ms: u64,        // Minimum spacing between recorded samples
    pub reconnect_delay_secs: u64,      // Pause before reopening a failed receiver
    pub configure_quectel: bool,        // Run the AT setup sequence on open
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub format: String,
    pub log_level: String,
}

impl Default for GpsConfig {
    fn default() -> Self {
        let serial_port = if cfg!(target_os = "windows") {
            "COM3"
        } else if cfg!(target_os = "macos") {
            "/dev/tty.usbserial-0001"
        } else {
            "/dev/ttyUSB0"
        };

        Self {
            serial_port: serial_port.to_string(),
            baud_rate: 9600,
            timeout_ms: 100,
            provider: "gps".to_string(),
            sample_interval_ms: 1000,
            reconnect_delay_secs: 5,
            configure_quectel: false,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            format: "console".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gps: GpsConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

/// Command line values that take precedence over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub serial_port: Option<String>,
    pub baud_rate: Option<u32>,
    pub format: Option<String>,
    pub log_level: Option<String>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, GpsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GpsError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("📄 Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, GpsError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise falls back to the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self, GpsError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                debug!("No configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), GpsError> {
        // Create directory if it doesn't exist
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, GpsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<(), GpsError> {
        if let Some(port) = &overrides.serial_port {
            self.gps.serial_port = port.clone();
        }
        if let Some(baud) = overrides.baud_rate {
            self.gps.baud_rate = baud;
        }
        if let Some(format) = &overrides.format {
            self.display.format = format.clone();
        }
        if let Some(level) = &overrides.log_level {
            self.display.log_level = level.clone();
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), GpsError> {
        if self.gps.serial_port.trim().is_empty() {
            return Err(GpsError::ConfigError("gps.serial_port must not be empty".to_string()));
        }
        if self.gps.baud_rate == 0 {
            return Err(GpsError::ConfigError("gps.baud_rate must be positive".to_string()));
        }
        if self.gps.sample_interval_ms == 0 {
            return Err(GpsError::ConfigError(
                "gps.sample_interval_ms must be positive".to_string(),
            ));
        }
        match self.display.format.as_str() {
            "console" | "json" | "csv" => {}
            other => {
                return Err(GpsError::ConfigError(format!(
                    "display.format must be console, json or csv (got {})",
                    other
                )))
            }
        }
        if self.display.log_level.parse::<log::LevelFilter>().is_err() {
            return Err(GpsError::ConfigError(format!(
                "display.log_level is not a log level: {}",
                self.display.log_level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gps.sample_interval_ms, 1000);
        assert_eq!(config.gps.provider, "gps");
    }

    #[test]
    fn test_toml_round_trip_keeps_values() {
        let mut config = Config::default();
        config.gps.serial_port = "/dev/ttyACM0".to_string();
        config.gps.configure_quectel = true;

        let text = config.to_toml_string().unwrap();
        let parsed = Config::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed = Config::from_toml_str("[gps]\nbaud_rate = 115200\n").unwrap();
        assert_eq!(parsed.gps.baud_rate, 115200);
        assert_eq!(parsed.gps.provider, "gps");
        assert_eq!(parsed.display.format, "console");
    }

    #[test]
    fn test_invalid_format_rejected() {
        let result = Config::from_toml_str("[display]\nformat = \"xml\"\n");
        assert!(matches!(result, Err(GpsError::ConfigError(_))));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = Config::default();
        let overrides = ConfigOverrides {
            serial_port: Some("COM7".to_string()),
            baud_rate: Some(4800),
            format: Some("csv".to_string()),
            log_level: None,
        };
        config.apply_overrides(&overrides).unwrap();
        assert_eq!(config.gps.serial_port, "COM7");
        assert_eq!(config.gps.baud_rate, 4800);
        assert_eq!(config.display.format, "csv");
        assert_eq!(config.display.log_level, "info");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = Config::default();
        config.gps.sample_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
