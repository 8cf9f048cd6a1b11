//! # Ranger Core Library
//!
//! Drives a ranging sensor that sits behind an SC16IS750 I2C-to-UART bridge:
//!
//! - **Register Bus**: one trait in front of the real chip and the simulator
//! - **Bridge UART**: FIFO-paced byte transport with bounded waits
//! - **Sensor Protocol**: single-byte command frames, a mode state machine
//!   and little-endian distance replies
//! - **Simulator**: a software model of the sensor for running without
//!   hardware
//!
//! ## Architecture
//!
//! ```text
//! RangeSensor ──► BridgeUart ──► RegisterBus ──┬──► I2cRegisterBus ──► SC16IS750 ──► sensor
//!   (frames,        (TXLVL/RXLVL                │
//!    mode)           pacing)                    └──► Simulator
//! ```
//!
//! ## Example
//!
//! ```
//! use embedded_hal_mock::eh1::delay::NoopDelay;
//! use ranger_core::{BridgeUart, Mode, RangeSensor, SensorConfig, Simulator};
//!
//! let uart = BridgeUart::new(Simulator::new(), NoopDelay::new());
//! let mut sensor = RangeSensor::new(uart, SensorConfig::default());
//!
//! sensor.set_mode(Mode::Ping).unwrap();
//! let mut distances = [0i16; 3];
//! sensor.get_distances(&mut distances, 3).unwrap();
//! assert_eq!(distances, [500, 501, 502]);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub mod hardware;
pub mod protocol;
pub mod registers;
pub mod sensor;
pub mod simulator;
pub mod traits;
pub mod uart;

// Re-export main types for convenience
pub use hardware::I2cRegisterBus;
pub use protocol::{Frame, FrameError, Mode, MAX_DISTANCES, NO_OBJECT};
pub use sensor::{RangeSensor, SensorConfig, SensorError, SizeError};
pub use simulator::{RxLevelReport, Simulator};
pub use traits::{BusError, BusResult, RegisterBus};
pub use uart::{BridgeUart, UartConfig, UartError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
