//! # Bridge UART Transport
//!
//! Byte-level transport over the SC16IS750: configures the UART, paces
//! writes against the TX FIFO level and waits for enough bytes in the RX
//! FIFO before reading.
//!
//! ## Flow Control
//!
//! ```text
//! write_byte:  TXLVL ──► 0? ──wait timeout──► TXLVL ──► 0? ──► TransmitBufferFull
//!                  │                              │
//!                  └──────── > 0 ─────────────────┴──► THR <- byte
//!
//! read_data:   wait settle ──► RXLVL >= n? ──no──► wait (timeout - settle) ──► RXLVL >= n? ──no──► InsufficientData
//!                                  │                                              │
//!                                  └──────── yes ─────────────────────────────────┴──► RHR -> n bytes
//! ```
//!
//! No operation retries more than once, and every retry is a fixed delay.

use core::fmt::Write as _;

use embedded_hal::delay::DelayNs;
use heapless::String;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::registers::{self, *};
use crate::traits::{BusError, RegisterBus};

/// Capacity of the last-error message buffer
pub const ERROR_MESSAGE_CAPACITY: usize = 128;

/// Timing of the transport's fixed waits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(default)]
pub struct UartConfig {
    /// Total time allowed for a FIFO to become ready, in milliseconds
    pub timeout_ms: u32,
    /// Wait before checking RXLVL and between self-test write and read
    pub settle_ms: u32,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 100,
            settle_ms: 20,
        }
    }
}

/// Errors raised by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartError {
    /// Writing a register failed
    BusWriteFailed {
        /// Register sub-address
        register: u8,
        /// What the bus reported
        cause: BusError,
    },
    /// Reading a register failed
    BusReadFailed {
        /// Register sub-address
        register: u8,
        /// What the bus reported
        cause: BusError,
    },
    /// TXLVL stayed at zero through the retry
    TransmitBufferFull,
    /// RXLVL stayed below the requested length through the retry
    InsufficientData {
        /// Bytes requested
        expected: usize,
        /// Bytes RXLVL reported on the last check
        actual: usize,
    },
    /// The scratch-pad register did not echo the test character
    SelfTestMismatch {
        /// Byte written to SPR
        sent: u8,
        /// Byte read back from SPR
        received: u8,
    },
    /// One or more configuration writes failed during `initialize`
    InitFailed {
        /// Number of writes that failed
        failed_writes: u8,
        /// Register of the first failed write
        first_register: u8,
    },
}

impl core::fmt::Display for UartError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            UartError::BusWriteFailed { register, cause } => write!(
                f,
                "unable to write register {} over I2C ({})",
                registers::name(register),
                cause
            ),
            UartError::BusReadFailed { register, cause } => write!(
                f,
                "unable to read register {} over I2C ({})",
                registers::name(register),
                cause
            ),
            UartError::TransmitBufferFull => f.write_str("unable to write byte, TX buffer is full"),
            UartError::InsufficientData { expected, actual } => write!(
                f,
                "the data available to be read ({}) is less than required length of {}",
                actual, expected
            ),
            UartError::SelfTestMismatch { sent, received } => write!(
                f,
                "test failure, sent byte {:#04x} does not match received byte {:#04x}",
                sent, received
            ),
            UartError::InitFailed {
                failed_writes,
                first_register,
            } => write!(
                f,
                "{} configuration writes failed, first at {}",
                failed_writes,
                registers::name(first_register)
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for UartError {}

impl embedded_io::Error for UartError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            UartError::InsufficientData { .. } => embedded_io::ErrorKind::TimedOut,
            UartError::TransmitBufferFull => embedded_io::ErrorKind::WriteZero,
            UartError::SelfTestMismatch { .. } => embedded_io::ErrorKind::InvalidData,
            UartError::InitFailed { .. } => embedded_io::ErrorKind::NotConnected,
            UartError::BusWriteFailed { .. } | UartError::BusReadFailed { .. } => {
                embedded_io::ErrorKind::Other
            }
        }
    }
}

/// UART configuration sequence, in order
pub const INIT_SEQUENCE: [(u8, u8); 8] = [
    (LCR, LCR_DIVISOR_LATCH),
    (DLL, (BAUD_DIVISOR & 0xFF) as u8),
    (DLM, (BAUD_DIVISOR >> 8) as u8),
    (LCR, LCR_ENHANCED_BANK),
    (EFR, EFR_ENHANCED_FUNCTIONS),
    (LCR, LCR_8N1),
    (FCR, FCR_RESET_FIFOS),
    (FCR, FCR_ENABLE_FIFO),
];

/// Transport driver for the SC16IS750
///
/// Holds the register bus, a delay provider and the message of the last
/// failure. Every failing operation overwrites that message.
pub struct BridgeUart<B, D> {
    bus: B,
    delay: D,
    config: UartConfig,
    error_message: String<ERROR_MESSAGE_CAPACITY>,
}

impl<B: RegisterBus, D: DelayNs> BridgeUart<B, D> {
    /// Create a transport with default timing
    ///
    /// The chip is not configured; call `initialize` for real hardware.
    pub fn new(bus: B, delay: D) -> Self {
        Self::with_config(bus, delay, UartConfig::default())
    }

    /// Create a transport with explicit timing
    pub fn with_config(bus: B, delay: D, config: UartConfig) -> Self {
        Self {
            bus,
            delay,
            config,
            error_message: String::new(),
        }
    }

    /// Program baud rate, framing and FIFOs
    ///
    /// Every step is attempted even after a failure; the error reports how
    /// many steps failed and where the first one was.
    pub fn initialize(&mut self) -> Result<(), UartError> {
        let mut failed_writes = 0u8;
        let mut first_register = None;

        for (register, value) in INIT_SEQUENCE {
            if let Err(cause) = self.bus.write_register(register, value) {
                warn!("init write {}={:#04x} failed: {}", registers::name(register), value, cause);
                failed_writes += 1;
                first_register.get_or_insert(register);
            }
        }

        match first_register {
            None => {
                debug!("UART configured, divisor {:#06x}", BAUD_DIVISOR);
                Ok(())
            }
            Some(first_register) => Err(self.fail(UartError::InitFailed {
                failed_writes,
                first_register,
            })),
        }
    }

    /// Send one byte to the remote device
    pub fn write_byte(&mut self, value: u8) -> Result<(), UartError> {
        if self.tx_level()? == 0 {
            self.delay.delay_ms(self.config.timeout_ms);
            if self.tx_level()? == 0 {
                return Err(self.fail(UartError::TransmitBufferFull));
            }
        }

        self.bus
            .write_register(THR, value)
            .map_err(|cause| self.fail(UartError::BusWriteFailed { register: THR, cause }))
    }

    /// Fill `buf` from the receive FIFO
    ///
    /// Waits the settle delay first, then once more for the rest of the
    /// timeout if RXLVL is still short.
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<(), UartError> {
        let len = buf.len();
        if len == 0 {
            return Ok(());
        }

        self.delay.delay_ms(self.config.settle_ms);
        if self.available_data()? < len {
            self.delay
                .delay_ms(self.config.timeout_ms.saturating_sub(self.config.settle_ms));
            let actual = self.available_data()?;
            if actual < len {
                return Err(self.fail(UartError::InsufficientData {
                    expected: len,
                    actual,
                }));
            }
        }

        self.bus
            .read_register(RHR, buf)
            .map_err(|cause| self.fail(UartError::BusReadFailed { register: RHR, cause }))
    }

    /// Bytes waiting in the receive FIFO, as reported by RXLVL
    ///
    /// A failed read is an error, never zero.
    pub fn available_data(&mut self) -> Result<usize, UartError> {
        self.read_level(RXLVL)
    }

    /// Throw away whatever is waiting in the receive FIFO
    ///
    /// Returns how many bytes were discarded. At most one FIFO's worth is
    /// read; an empty holding register counts as nothing discarded.
    pub fn discard_input(&mut self) -> Result<usize, UartError> {
        let waiting = self.available_data()?.min(FIFO_DEPTH);
        if waiting == 0 {
            return Ok(0);
        }

        let mut scratch = [0u8; FIFO_DEPTH];
        match self.bus.read_register(RHR, &mut scratch[..waiting]) {
            Ok(()) => Ok(waiting),
            Err(BusError::NoData) => Ok(0),
            Err(cause) => Err(self.fail(UartError::BusReadFailed { register: RHR, cause })),
        }
    }

    /// Check the chip answers by echoing a byte through the scratch pad
    ///
    /// Always succeeds on a simulated bus.
    pub fn test_connection(&mut self) -> Result<(), UartError> {
        if self.bus.is_simulated() {
            return Ok(());
        }

        self.bus
            .write_register(SPR, TEST_CHARACTER)
            .map_err(|cause| self.fail(UartError::BusWriteFailed { register: SPR, cause }))?;

        self.delay.delay_ms(self.config.settle_ms);

        let mut echo = [0u8; 1];
        self.bus
            .read_register(SPR, &mut echo)
            .map_err(|cause| self.fail(UartError::BusReadFailed { register: SPR, cause }))?;

        if echo[0] != TEST_CHARACTER {
            return Err(self.fail(UartError::SelfTestMismatch {
                sent: TEST_CHARACTER,
                received: echo[0],
            }));
        }
        Ok(())
    }

    /// Message of the most recent failure, empty if none occurred
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Whether the bus underneath is the simulator
    pub fn is_simulated(&self) -> bool {
        self.bus.is_simulated()
    }

    /// Block for `ms` milliseconds on the transport's delay provider
    pub fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    /// Timing in use
    pub fn config(&self) -> &UartConfig {
        &self.config
    }

    /// Shared access to the bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Exclusive access to the bus
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Give back the bus and delay provider
    pub fn release(self) -> (B, D) {
        (self.bus, self.delay)
    }

    fn tx_level(&mut self) -> Result<usize, UartError> {
        self.read_level(TXLVL)
    }

    fn read_level(&mut self, register: u8) -> Result<usize, UartError> {
        let mut level = [0u8; 1];
        self.bus
            .read_register(register, &mut level)
            .map_err(|cause| self.fail(UartError::BusReadFailed { register, cause }))?;
        Ok(level[0] as usize)
    }

    fn fail(&mut self, err: UartError) -> UartError {
        self.error_message.clear();
        // a message longer than the buffer is cut short
        let _ = write!(self.error_message, "BridgeUart: {}", err);
        debug!("{}", self.error_message.as_str());
        err
    }
}

impl<B, D> embedded_io::ErrorType for BridgeUart<B, D> {
    type Error = UartError;
}

impl<B: RegisterBus, D: DelayNs> embedded_io::Read for BridgeUart<B, D> {
    /// Read whatever RXLVL reports, up to `buf.len()`
    ///
    /// Waits one timeout period for the first byte before giving up.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut available = self.available_data()?;
        if available == 0 {
            self.delay.delay_ms(self.config.timeout_ms);
            available = self.available_data()?;
            if available == 0 {
                return Err(self.fail(UartError::InsufficientData {
                    expected: 1,
                    actual: 0,
                }));
            }
        }

        let len = available.min(buf.len());
        self.bus
            .read_register(RHR, &mut buf[..len])
            .map_err(|cause| self.fail(UartError::BusReadFailed { register: RHR, cause }))?;
        Ok(len)
    }
}

impl<B: RegisterBus, D: DelayNs> embedded_io::Write for BridgeUart<B, D> {
    /// Write bytes until one is refused
    ///
    /// Fails only if the first byte could not be written.
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut written = 0;
        for &byte in buf {
            match self.write_byte(byte) {
                Ok(()) => written += 1,
                Err(e) if written == 0 => return Err(e),
                Err(_) => break,
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl<B: RegisterBus, D: DelayNs> embedded_io::ReadReady for BridgeUart<B, D> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.available_data()? > 0)
    }
}

impl<B: RegisterBus, D: DelayNs> embedded_io::WriteReady for BridgeUart<B, D> {
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.tx_level()? > 0)
    }
}
