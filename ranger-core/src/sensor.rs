//! # Range Sensor Protocol
//!
//! Turns sensor operations into command frames, keeps track of the mode the
//! device is believed to be in and decodes distance replies.
//!
//! ## Mode State Machine
//!
//! ```text
//!            off()                 ping()
//!   ┌──────► Off ◄────┐     ┌─────► Ping ◄────┐
//!   │                 │     │                 │
//!   │     reset() ────┴─────┴───► Continuous ◄┘ continuous()
//!   │                               │
//!   └───────────────────────────────┘
//! ```
//!
//! The believed mode changes only when the transport accepted the frame.
//! The device is never asked to confirm; `query_mode` reads the device's own
//! view without touching the believed one.

use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;
use heapless::String;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::protocol::{decode_distance, synthetic_position, Frame, Mode, MAX_DISTANCES, NO_OBJECT};
use crate::traits::RegisterBus;
use crate::uart::{BridgeUart, UartError, ERROR_MESSAGE_CAPACITY};

/// Capacity of the combined error trace
pub const ERROR_TRACE_CAPACITY: usize = 2 * ERROR_MESSAGE_CAPACITY + 8;

/// Start-up and polling behaviour of the protocol layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct SensorConfig {
    /// Mode believed at construction
    pub initial_mode: Mode,
    /// Send `SetMode(initial_mode)` to the device at construction
    pub announce_initial_mode: bool,
    /// RXLVL checks made while waiting for a distance reply
    pub poll_attempts: u32,
    /// Wait between two RXLVL checks, in milliseconds
    pub poll_backoff_ms: u32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            initial_mode: Mode::Continuous,
            announce_initial_mode: false,
            poll_attempts: 50,
            poll_backoff_ms: 2,
        }
    }
}

/// Why a distance request was refused before anything was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SizeError {
    /// Fewer than one reading requested
    TooSmall {
        /// Count asked for
        requested: usize,
    },
    /// More readings than the distance table holds
    TooLarge {
        /// Count asked for
        requested: usize,
        /// `MAX_DISTANCES`
        max: usize,
    },
    /// The distance slice is shorter than the count
    DestinationTooSmall {
        /// Count asked for
        requested: usize,
        /// Length of the distance slice
        capacity: usize,
    },
    /// The position slice is shorter than the count
    PositionsTooSmall {
        /// Count asked for
        requested: usize,
        /// Length of the position slice
        capacity: usize,
    },
}

impl core::fmt::Display for SizeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            SizeError::TooSmall { requested } => {
                write!(f, "invalid number of distances requested ({})", requested)
            }
            SizeError::TooLarge { requested, max } => write!(
                f,
                "invalid number of distances requested ({}), max is {}",
                requested, max
            ),
            SizeError::DestinationTooSmall { requested, capacity } => write!(
                f,
                "distance array (length {}) cannot hold {} distances",
                capacity, requested
            ),
            SizeError::PositionsTooSmall { requested, capacity } => write!(
                f,
                "position array (length {}) cannot hold {} positions",
                capacity, requested
            ),
        }
    }
}

/// Errors raised by the protocol layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// The request was refused before touching the transport
    InvalidRequestSize(SizeError),
    /// The command byte could not be written
    CommandSendFailed {
        /// Frame that was being sent
        frame: Frame,
        /// Transport failure
        cause: UartError,
    },
    /// Reading the reply failed
    Transport(UartError),
    /// The reply did not arrive within the poll budget
    Timeout {
        /// Reply bytes waited for
        expected: usize,
        /// Bytes RXLVL reported on the last check
        available: usize,
    },
    /// A GetMode reply held no valid mode code
    UnexpectedMode(u8),
}

impl core::fmt::Display for SensorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SensorError::InvalidRequestSize(e) => write!(f, "{}", e),
            SensorError::CommandSendFailed { frame, .. } => {
                write!(f, "unable to send command {:?}", frame)
            }
            SensorError::Transport(e) => write!(f, "transport failure: {}", e),
            SensorError::Timeout { expected, available } => write!(
                f,
                "timed out waiting for {} reply bytes, {} available",
                expected, available
            ),
            SensorError::UnexpectedMode(code) => write!(f, "device reported unknown mode {}", code),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SizeError {}

#[cfg(feature = "std")]
impl std::error::Error for SensorError {}

impl From<SizeError> for SensorError {
    fn from(e: SizeError) -> Self {
        SensorError::InvalidRequestSize(e)
    }
}

/// Ranging sensor reached through the bridge UART
pub struct RangeSensor<B, D> {
    uart: BridgeUart<B, D>,
    current_mode: Mode,
    config: SensorConfig,
    error_message: String<ERROR_MESSAGE_CAPACITY>,
}

impl<B: RegisterBus, D: DelayNs> RangeSensor<B, D> {
    /// Wrap a transport
    ///
    /// With `announce_initial_mode` the initial mode is sent to the device;
    /// a failed send is logged and recorded but does not stop construction.
    pub fn new(uart: BridgeUart<B, D>, config: SensorConfig) -> Self {
        let mut sensor = Self {
            uart,
            current_mode: config.initial_mode.settled(),
            config,
            error_message: String::new(),
        };

        if config.announce_initial_mode {
            if let Err(e) = sensor.set_mode(config.initial_mode) {
                warn!("initial mode {:?} not sent: {}", config.initial_mode, e);
            }
        }
        sensor
    }

    /// Switch the device to `mode`
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), SensorError> {
        match mode {
            Mode::Off => self.off(),
            Mode::Reset => self.reset(),
            Mode::Ping => self.ping(),
            Mode::Continuous => self.continuous(),
        }
    }

    /// Disable the sensor; no pings until another mode is set
    pub fn off(&mut self) -> Result<(), SensorError> {
        self.send_mode(Mode::Off)
    }

    /// Soft reset; the device resumes in continuous mode
    pub fn reset(&mut self) -> Result<(), SensorError> {
        self.send_mode(Mode::Reset)
    }

    /// Ping mode: a single ping per request, up to `MAX_DISTANCES` echoes
    pub fn ping(&mut self) -> Result<(), SensorError> {
        self.send_mode(Mode::Ping)
    }

    /// Continuous mode: the device pings on its own and keeps the latest
    /// result
    pub fn continuous(&mut self) -> Result<(), SensorError> {
        self.send_mode(Mode::Continuous)
    }

    /// The mode the device is believed to be in
    pub fn mode(&self) -> Mode {
        self.current_mode
    }

    /// Ask the device for its mode
    pub fn query_mode(&mut self) -> Result<Mode, SensorError> {
        self.discard_stale()?;
        self.send_frame(Frame::GetMode)?;

        let mut reply = [0u8; 1];
        self.uart
            .read_data(&mut reply)
            .map_err(|e| self.fail(SensorError::Transport(e)))?;

        Mode::try_from(reply[0]).map_err(|_| self.fail(SensorError::UnexpectedMode(reply[0])))
    }

    /// Distance to the nearest object, `NO_OBJECT` if none
    pub fn get_distance(&mut self) -> Result<i16, SensorError> {
        let mut distance = [NO_OBJECT; 1];
        self.get_distances(&mut distance, 1)?;
        Ok(distance[0])
    }

    /// Read the echoes the current mode produces
    ///
    /// One reading in continuous mode, `MAX_DISTANCES` otherwise. Returns
    /// how many slots of `distances` were filled.
    pub fn get_echoes(&mut self, distances: &mut [i16]) -> Result<usize, SensorError> {
        let count = match self.current_mode {
            Mode::Continuous => 1,
            _ => MAX_DISTANCES,
        };
        self.get_distances(distances, count)?;
        Ok(count)
    }

    /// Fill the first `count` slots of `distances`, first echo first
    pub fn get_distances(
        &mut self,
        distances: &mut [i16],
        count: usize,
    ) -> Result<(), SensorError> {
        self.check_count(count, distances.len())?;

        let frame = Frame::get_distances(count).map_err(|_| {
            self.fail(SensorError::InvalidRequestSize(SizeError::TooLarge {
                requested: count,
                max: MAX_DISTANCES,
            }))
        })?;
        self.discard_stale()?;
        self.send_frame(frame)?;

        let expected = count * 2;
        self.await_reply(expected)?;

        let mut reply = [0u8; MAX_DISTANCES * 2];
        self.uart
            .read_data(&mut reply[..expected])
            .map_err(|e| self.fail(SensorError::Transport(e)))?;

        for (slot, pair) in distances.iter_mut().zip(reply[..expected].chunks_exact(2)) {
            *slot = decode_distance(pair[0], pair[1]);
        }
        debug!("read {} distances", count);
        Ok(())
    }

    /// Distances paired with evenly spaced x-positions across the field of
    /// view
    pub fn get_distances_2d(
        &mut self,
        positions: &mut [i32],
        distances: &mut [i16],
        count: usize,
    ) -> Result<(), SensorError> {
        self.check_count(count, distances.len())?;
        if positions.len() < count {
            return Err(self.fail(SensorError::InvalidRequestSize(
                SizeError::PositionsTooSmall {
                    requested: count,
                    capacity: positions.len(),
                },
            )));
        }

        for (i, position) in positions[..count].iter_mut().enumerate() {
            *position = synthetic_position(i, count);
        }
        self.get_distances(distances, count)
    }

    /// Run the transport's connection self-test
    pub fn test_connection(&mut self) -> Result<(), SensorError> {
        self.uart
            .test_connection()
            .map_err(|e| self.fail(SensorError::Transport(e)))
    }

    /// Message of the most recent protocol failure
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Protocol message followed by the transport message
    pub fn error_trace(&self) -> String<ERROR_TRACE_CAPACITY> {
        let mut trace = String::new();
        let _ = write!(trace, "{}\n\t...{}", self.error_message, self.uart.error_message());
        trace
    }

    /// Configuration in use
    pub fn config(&self) -> &SensorConfig {
        &self.config
    }

    /// The transport underneath
    pub fn uart(&self) -> &BridgeUart<B, D> {
        &self.uart
    }

    /// Exclusive access to the transport
    pub fn uart_mut(&mut self) -> &mut BridgeUart<B, D> {
        &mut self.uart
    }

    /// Give back the transport
    pub fn release(self) -> BridgeUart<B, D> {
        self.uart
    }

    fn send_mode(&mut self, mode: Mode) -> Result<(), SensorError> {
        self.send_frame(Frame::SetMode(mode))?;
        self.current_mode = mode.settled();
        debug!("mode set to {:?}, now {:?}", mode, self.current_mode);
        Ok(())
    }

    fn send_frame(&mut self, frame: Frame) -> Result<(), SensorError> {
        self.uart
            .write_byte(frame.encode())
            .map_err(|cause| self.fail(SensorError::CommandSendFailed { frame, cause }))
    }

    fn check_count(&mut self, count: usize, capacity: usize) -> Result<(), SensorError> {
        let problem = if count > MAX_DISTANCES {
            Some(SizeError::TooLarge {
                requested: count,
                max: MAX_DISTANCES,
            })
        } else if count < 1 {
            Some(SizeError::TooSmall { requested: count })
        } else if capacity < count {
            Some(SizeError::DestinationTooSmall {
                requested: count,
                capacity,
            })
        } else {
            None
        };

        match problem {
            Some(e) => Err(self.fail(e.into())),
            None => Ok(()),
        }
    }

    /// Drop reply bytes left behind by an abandoned request
    fn discard_stale(&mut self) -> Result<(), SensorError> {
        let discarded = self
            .uart
            .discard_input()
            .map_err(|e| self.fail(SensorError::Transport(e)))?;
        if discarded > 0 {
            warn!("discarded {} stale reply bytes", discarded);
        }
        Ok(())
    }

    /// Poll RXLVL until `expected` bytes are waiting or the budget runs out
    fn await_reply(&mut self, expected: usize) -> Result<(), SensorError> {
        let mut available = 0;
        for attempt in 0..self.config.poll_attempts.max(1) {
            if attempt > 0 {
                self.uart.delay_ms(self.config.poll_backoff_ms);
            }
            available = self
                .uart
                .available_data()
                .map_err(|e| self.fail(SensorError::Transport(e)))?;
            if available >= expected {
                return Ok(());
            }
        }

        Err(self.fail(SensorError::Timeout { expected, available }))
    }

    fn fail(&mut self, err: SensorError) -> SensorError {
        self.error_message.clear();
        let _ = write!(self.error_message, "RangeSensor: {}", err);
        debug!("{}", self.error_message.as_str());
        err
    }
}
