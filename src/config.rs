// src/config.rs
//! Configuration loading: JSON file, then environment, then command line

use crate::error::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub gps_device: String,
    pub gps_baud_rate: u32,
    pub read_timeout_secs: u64,
    /// USB vendor id of the receiver; when set, the first matching port wins
    pub gps_vendor_id: Option<u16>,
    pub database_path: PathBuf,
    pub geofence_file: Option<PathBuf>,
    pub notification_url: Option<String>,
    pub log_level: String,
    pub cell_device: String,
    pub cell_poll_interval_secs: u64,
    pub max_consecutive_read_errors: u32,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            gps_device: "/dev/ttyUSB0".to_string(),
            gps_baud_rate: 4800,
            read_timeout_secs: 10,
            gps_vendor_id: None,
            database_path: PathBuf::from("gps_data.db"),
            geofence_file: None,
            notification_url: None,
            log_level: "info".to_string(),
            cell_device: "/dev/cdc-wdm0".to_string(),
            cell_poll_interval_secs: 5,
            max_consecutive_read_errors: 100,
        }
    }
}

impl LoggerConfig {
    /// Load configuration from `path`, or from the per-user file when no path
    /// is given, then apply environment overrides.
    ///
    /// An explicit path must exist; a missing per-user file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::get_config_path() {
                Ok(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load from a JSON config file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TelemetryError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let mut config: Self = serde_json::from_str(&contents).map_err(|e| {
            TelemetryError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;
        config.log_level = config.log_level.trim().to_lowercase();
        Ok(config)
    }

    /// Get config file path for Unix systems
    pub fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| TelemetryError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("gps-telemetry")
            .join("config.json"))
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value lookup; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(device) = get("GPS_DEVICE") {
            self.gps_device = device;
        }
        if let Some(baud) = get("GPS_BAUD_RATE") {
            self.gps_baud_rate = parse_number("GPS_BAUD_RATE", &baud)?;
        }
        if let Some(timeout) = get("GPS_TIMEOUT") {
            self.read_timeout_secs = parse_number("GPS_TIMEOUT", &timeout)?;
        }
        if let Some(vendor) = get("GPS_VENDOR_ID") {
            self.gps_vendor_id = Some(parse_vendor_id(&vendor)?);
        }
        if let Some(path) = get("DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(path) = get("GEOFENCE_FILE") {
            self.geofence_file = Some(PathBuf::from(path));
        }
        if let Some(url) = get("NOTIFICATION_URL") {
            self.notification_url = Some(url);
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = level.trim().to_lowercase();
        }
        if let Some(device) = get("CELL_DEVICE") {
            self.cell_device = device;
        }
        if let Some(interval) = get("CELL_POLL_INTERVAL") {
            self.cell_poll_interval_secs = parse_number("CELL_POLL_INTERVAL", &interval)?;
        }

        Ok(())
    }

    /// Update serial port settings
    pub fn update_serial(&mut self, port: Option<String>, baudrate: Option<u32>) {
        if let Some(port) = port {
            self.gps_device = port;
        }
        if let Some(baudrate) = baudrate {
            self.gps_baud_rate = baudrate;
        }
    }

    pub fn update_database(&mut self, path: Option<PathBuf>) {
        if let Some(path) = path {
            self.database_path = path;
        }
    }

    /// Reject settings the loggers cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.gps_device.trim().is_empty() {
            return Err(TelemetryError::Config("GPS device must not be empty".to_string()));
        }
        if self.gps_baud_rate == 0 {
            return Err(TelemetryError::Config("GPS baud rate must be positive".to_string()));
        }
        if self.read_timeout_secs == 0 {
            return Err(TelemetryError::Config("GPS read timeout must be positive".to_string()));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(TelemetryError::Config("Database path must not be empty".to_string()));
        }
        if self.cell_poll_interval_secs == 0 {
            return Err(TelemetryError::Config("Cellular poll interval must be positive".to_string()));
        }
        if self.max_consecutive_read_errors == 0 {
            return Err(TelemetryError::Config(
                "Maximum consecutive read errors must be positive".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(TelemetryError::Config(format!(
                "Unknown log level '{}', expected one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn cell_poll_interval(&self) -> Duration {
        Duration::from_secs(self.cell_poll_interval_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TelemetryError::Config(format!("{} must be a number, got '{}'", key, value)))
}

/// Vendor ids are conventionally written in hex, with or without `0x`
fn parse_vendor_id(value: &str) -> Result<u16> {
    let digits = value.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);

    u16::from_str_radix(digits, 16).map_err(|_| {
        TelemetryError::Config(format!("GPS_VENDOR_ID must be a hex USB vendor id, got '{}'", value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = LoggerConfig::default();

        assert_eq!(config.gps_device, "/dev/ttyUSB0");
        assert_eq!(config.gps_baud_rate, 4800);
        assert_eq!(config.read_timeout(), Duration::from_secs(10));
        assert_eq!(config.database_path, PathBuf::from("gps_data.db"));
        assert!(config.geofence_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = LoggerConfig::default();
        config
            .apply_overrides(lookup(&[
                ("GPS_DEVICE", "/dev/ttyACM0"),
                ("GPS_BAUD_RATE", "9600"),
                ("GPS_VENDOR_ID", "0x1546"),
                ("GEOFENCE_FILE", "/etc/fences.geojson"),
                ("LOG_LEVEL", "DEBUG"),
                ("NOTIFICATION_URL", ""),
            ]))
            .unwrap();

        assert_eq!(config.gps_device, "/dev/ttyACM0");
        assert_eq!(config.gps_baud_rate, 9600);
        assert_eq!(config.gps_vendor_id, Some(0x1546));
        assert_eq!(config.geofence_file, Some(PathBuf::from("/etc/fences.geojson")));
        assert_eq!(config.log_level, "debug");
        assert!(config.notification_url.is_none());
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let mut config = LoggerConfig::default();
        let err = config
            .apply_overrides(lookup(&[("GPS_BAUD_RATE", "fast")]))
            .unwrap_err();
        assert!(err.to_string().contains("GPS_BAUD_RATE"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"gps_device": "/dev/ttyS1", "cell_poll_interval_secs": 30}}"#).unwrap();

        let config = LoggerConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.gps_device, "/dev/ttyS1");
        assert_eq!(config.cell_poll_interval(), Duration::from_secs(30));
        assert_eq!(config.gps_baud_rate, 4800);
    }

    #[test]
    fn test_file_log_level_is_case_insensitive() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"log_level": "INFO"}}"#).unwrap();

        let config = LoggerConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(LoggerConfig::load(Some(Path::new("/nonexistent/config.json"))).is_err());
    }

    #[test]
    fn test_cli_updates() {
        let mut config = LoggerConfig::default();
        config.update_serial(None, Some(115200));
        config.update_database(Some(PathBuf::from("/var/lib/gps/track.db")));

        assert_eq!(config.gps_device, "/dev/ttyUSB0");
        assert_eq!(config.gps_baud_rate, 115200);
        assert_eq!(config.database_path, PathBuf::from("/var/lib/gps/track.db"));
    }

    #[test]
    fn test_validation() {
        let mut config = LoggerConfig::default();
        config.gps_baud_rate = 0;
        assert!(config.validate().is_err());

        let mut config = LoggerConfig::default();
        config.log_level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = LoggerConfig::default();
        config.max_consecutive_read_errors = 0;
        assert!(config.validate().is_err());
    }
}
