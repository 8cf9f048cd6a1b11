//! Device configuration, loadable from JSON.
//!
//! Every field has a default, so `{}` is a valid configuration:
//!
//! ```json
//! {
//!   "address": 77,
//!   "uart": { "timeout_ms": 100, "settle_ms": 20 },
//!   "sensor": { "initial_mode": "Ping", "announce_initial_mode": true },
//!   "simulator_rx_level": { "Fixed": 100 }
//! }
//! ```

use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use ranger_core::registers::DEFAULT_ADDRESS;
use ranger_core::{RxLevelReport, SensorConfig, UartConfig};

use crate::Result;

/// Everything needed to build a `Device`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// 7-bit I2C address of the bridge chip
    pub address: u8,
    /// Transport timing
    pub uart: UartConfig,
    /// Protocol start-up and polling
    pub sensor: SensorConfig,
    /// RXLVL behaviour of the simulated backend
    pub simulator_rx_level: RxLevelReport,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            uart: UartConfig::default(),
            sensor: SensorConfig::default(),
            simulator_rx_level: RxLevelReport::default(),
        }
    }
}

impl DeviceConfig {
    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("loading device configuration from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialise to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceError;
    use ranger_core::Mode;

    #[test]
    fn test_empty_document_is_default() {
        let config = DeviceConfig::from_json_str("{}").unwrap();
        assert_eq!(config, DeviceConfig::default());
        assert_eq!(config.address, 0x4D);
        assert_eq!(config.simulator_rx_level, RxLevelReport::Staged);
    }

    #[test]
    fn test_partial_document() {
        let json = r#"{
            "address": 72,
            "sensor": { "initial_mode": "Ping", "poll_attempts": 5 },
            "simulator_rx_level": { "Fixed": 100 }
        }"#;
        let config = DeviceConfig::from_json_str(json).unwrap();

        assert_eq!(config.address, 0x48);
        assert_eq!(config.sensor.initial_mode, Mode::Ping);
        assert_eq!(config.sensor.poll_attempts, 5);
        assert_eq!(config.sensor.poll_backoff_ms, 2);
        assert_eq!(config.uart, UartConfig::default());
        assert_eq!(config.simulator_rx_level, RxLevelReport::Fixed(100));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = DeviceConfig::default();
        config.uart.settle_ms = 5;
        config.sensor.announce_initial_mode = true;

        let json = config.to_json().unwrap();
        assert_eq!(DeviceConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_mode_is_rejected() {
        let result = DeviceConfig::from_json_str(r#"{ "sensor": { "initial_mode": "Sleep" } }"#);
        assert!(matches!(result, Err(DeviceError::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("ranger-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "uart": { "timeout_ms": 10 } }"#).unwrap();

        let config = DeviceConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.uart.timeout_ms, 10);
        assert_eq!(config.uart.settle_ms, 20);
    }

    #[test]
    fn test_missing_file() {
        let result = DeviceConfig::from_file("/nonexistent/ranger.json");
        assert!(matches!(result, Err(DeviceError::Io(_))));
    }
}
