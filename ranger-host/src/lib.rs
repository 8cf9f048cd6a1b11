//! # Ranger Host Library
//!
//! std facade over `ranger-core` for programs running on the robot
//! controller. It handles:
//!
//! - Backend selection: the SC16IS750 over I2C, or the in-memory simulator
//! - Owned `Vec` results for distance requests
//! - JSON configuration
//! - Serialised access to one physical device from several threads
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Demo / control program                 │
//! └──────────────────────────────────────────────────────────┘
//!            │                                │
//!            ▼                                ▼
//!  ┌───────────────────┐   Arc<Mutex<_>>  ┌───────────────┐
//!  │   SharedDevice    │─────────────────►│    Device     │
//!  └───────────────────┘                  └───────────────┘
//!                                                 │
//!                                                 ▼
//!                     RangeSensor<Box<dyn RegisterBus + Send>, StdDelay>
//!                                                 │
//!                              ┌──────────────────┴─────────────┐
//!                              ▼                                ▼
//!                       I2cRegisterBus                      Simulator
//! ```
//!
//! No logger is installed here; the program picks its own `log` backend.

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use thiserror::Error;

use ranger_core::{SensorError, UartError};

pub mod config;
pub mod device;
pub mod shared;

pub use config::DeviceConfig;
pub use device::{new_device, Device};
pub use shared::SharedDevice;

// Re-export the types callers need to drive a device
pub use ranger_core::{Mode, RxLevelReport, SensorConfig, UartConfig, MAX_DISTANCES, NO_OBJECT};

/// Errors returned by the host API
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),
    #[error("transport error: {0}")]
    Uart(#[from] UartError),
    #[error("device busy: another request is in flight")]
    Busy,
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("unable to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for host operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// `DelayNs` backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_std_delay_sleeps() {
        let start = Instant::now();
        StdDelay.delay_ms(5);
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_error_display() {
        let err = DeviceError::from(SensorError::UnexpectedMode(9));
        assert_eq!(err.to_string(), "sensor error: device reported unknown mode 9");
        assert_eq!(
            DeviceError::Busy.to_string(),
            "device busy: another request is in flight"
        );
    }
}
