// src/config.rs
//! Configuration management

use crate::{
    error::{Result, TrackerError},
    location::WatchOptions,
    monitor::RideSource,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings for the remote advice service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceConfig {
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub endpoint: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for AdviceConfig {
    fn default() -> Self {
        Self {
            api_key_env: "GEMINI_API_KEY".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub source_type: String, // "gpsd", "serial"
    pub serial_port: Option<String>,
    pub serial_baudrate: Option<u32>,
    pub gpsd_host: Option<String>,
    pub gpsd_port: Option<u16>,
    pub permission_poll_secs: Option<u64>,
    #[serde(default)]
    pub watch: WatchOptions,
    #[serde(default)]
    pub advice: AdviceConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl TrackerConfig {
    /// Get platform-specific default configuration
    pub fn platform_default() -> Self {
        #[cfg(windows)]
        let (source_type, serial_port) = ("serial", Some("COM3".to_string()));

        #[cfg(not(windows))]
        let (source_type, serial_port) = ("gpsd", None);

        Self {
            source_type: source_type.to_string(),
            serial_port,
            serial_baudrate: Some(9600),
            gpsd_host: Some("localhost".to_string()),
            gpsd_port: Some(2947),
            permission_poll_secs: Some(5),
            watch: WatchOptions::default(),
            advice: AdviceConfig::default(),
        }
    }

    /// Load configuration from the config file, or defaults if there is none
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::platform_default());
        }

        let contents = std::fs::read_to_string(&config_path)
            .map_err(|e| TrackerError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| TrackerError::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to the config file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        // Create config directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TrackerError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| TrackerError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&config_path, contents)
            .map_err(|e| TrackerError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Directory holding the config file and the dashboard log
    pub fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| TrackerError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home).join(".config").join("ride-tracker"))
    }

    /// Get config file path
    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// The live location source described by this configuration
    pub fn live_source(&self) -> Result<RideSource> {
        match self.source_type.as_str() {
            "gpsd" => Ok(RideSource::Gpsd {
                host: self.gpsd_host.clone().unwrap_or_else(|| "localhost".to_string()),
                port: self.gpsd_port.unwrap_or(2947),
            }),
            "serial" => {
                let port = self.serial_port.clone().ok_or_else(|| {
                    TrackerError::Config("serial source selected but no serial_port set".to_string())
                })?;
                Ok(RideSource::Serial {
                    port,
                    baudrate: self.serial_baudrate.unwrap_or(9600),
                })
            }
            other => Err(TrackerError::Config(format!("Unknown source type: {}", other))),
        }
    }

    /// Update configuration with new source settings
    pub fn update_source(&mut self, source_type: &str) {
        self.source_type = source_type.to_string();
    }

    /// Update serial port settings
    pub fn update_serial(&mut self, port: String, baudrate: u32) {
        self.source_type = "serial".to_string();
        self.serial_port = Some(port);
        self.serial_baudrate = Some(baudrate);
    }

    /// Update gpsd settings
    pub fn update_gpsd(&mut self, host: String, port: u16) {
        self.source_type = "gpsd".to_string();
        self.gpsd_host = Some(host);
        self.gpsd_port = Some(port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();

        #[cfg(windows)]
        assert_eq!(config.source_type, "serial");

        #[cfg(not(windows))]
        assert_eq!(config.source_type, "gpsd");

        assert_eq!(config.watch, WatchOptions::default());
        assert_eq!(config.watch.timeout_ms, 10_000);
        assert_eq!(config.watch.max_fix_age_ms, 0);
        assert!(config.watch.high_accuracy);
    }

    #[test]
    fn test_update_source() {
        let mut config = TrackerConfig::default();
        config.update_source("serial");
        assert_eq!(config.source_type, "serial");
    }

    #[test]
    fn test_update_serial() {
        let mut config = TrackerConfig::default();
        config.update_serial("/dev/ttyUSB0".to_string(), 115200);
        assert_eq!(config.source_type, "serial");
        assert_eq!(config.serial_port, Some("/dev/ttyUSB0".to_string()));
        assert_eq!(config.serial_baudrate, Some(115200));

        match config.live_source().unwrap() {
            RideSource::Serial { port, baudrate } => {
                assert_eq!(port, "/dev/ttyUSB0");
                assert_eq!(baudrate, 115200);
            }
            other => panic!("unexpected source {:?}", other),
        }
    }

    #[test]
    fn test_serial_without_port_is_error() {
        let mut config = TrackerConfig::default();
        config.serial_port = None;
        config.update_source("serial");
        assert!(matches!(config.live_source(), Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_unknown_source() {
        let mut config = TrackerConfig::default();
        config.update_source("carrier-pigeon");
        assert!(config.live_source().is_err());
    }

    #[test]
    fn test_old_file_without_sections() {
        let json = r#"{"source_type":"gpsd","serial_port":null,"serial_baudrate":9600,"gpsd_host":"10.0.0.2","gpsd_port":2947,"permission_poll_secs":null}"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.watch, WatchOptions::default());
        assert_eq!(config.advice.api_key_env, "GEMINI_API_KEY");
        assert!(matches!(
            config.live_source().unwrap(),
            RideSource::Gpsd { ref host, port: 2947 } if host == "10.0.0.2"
        ));
    }
}
