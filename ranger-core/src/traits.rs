//! # RegisterBus Trait
//!
//! This module defines the one capability the transport driver needs from
//! whatever sits below it: write one byte to a register, read N bytes from a
//! register.
//!
//! ## Design Rationale
//!
//! Two backends implement the trait:
//! 1. **`I2cRegisterBus`**: the real SC16IS750 behind an `embedded-hal` I2C bus
//! 2. **`Simulator`**: an in-memory model of the ranging sensor on the far
//!    side of the UART
//!
//! The backend is chosen once, when the driver is built. Nothing above the
//! transport driver knows which one it talks to.

use embedded_hal::i2c::ErrorKind;

/// Errors reported by a register bus backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// The I2C transaction failed
    I2c(ErrorKind),
    /// A holding-register read found nothing staged
    NoData,
    /// The read buffer cannot hold the staged reply
    BufferTooSmall {
        /// Bytes staged by the peer
        needed: usize,
        /// Bytes the caller asked for
        provided: usize,
    },
}

impl core::fmt::Display for BusError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BusError::I2c(kind) => write!(f, "i2c error: {:?}", kind),
            BusError::NoData => f.write_str("no data staged"),
            BusError::BufferTooSmall { needed, provided } => {
                write!(f, "buffer of {} bytes cannot hold {} staged bytes", provided, needed)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BusError {}

/// Result type alias for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Register-level access to the bridge chip
///
/// # Example
///
/// ```
/// use ranger_core::registers::{SPR, TEST_CHARACTER};
/// use ranger_core::{RegisterBus, Simulator};
///
/// let mut bus = Simulator::new();
/// bus.write_register(SPR, TEST_CHARACTER).unwrap();
/// assert!(bus.is_simulated());
/// ```
pub trait RegisterBus {
    /// Write one byte to a register sub-address
    fn write_register(&mut self, register: u8, value: u8) -> BusResult<()>;

    /// Fill `buf` from a register sub-address
    ///
    /// Reading more than one byte from the holding register drains that
    /// many bytes of the receive FIFO.
    fn read_register(&mut self, register: u8, buf: &mut [u8]) -> BusResult<()>;

    /// Whether this backend is a software model rather than a chip
    ///
    /// The scratch-pad self-test is meaningless on a model and is skipped.
    fn is_simulated(&self) -> bool {
        false
    }
}

impl<B: RegisterBus + ?Sized> RegisterBus for &mut B {
    fn write_register(&mut self, register: u8, value: u8) -> BusResult<()> {
        (**self).write_register(register, value)
    }

    fn read_register(&mut self, register: u8, buf: &mut [u8]) -> BusResult<()> {
        (**self).read_register(register, buf)
    }

    fn is_simulated(&self) -> bool {
        (**self).is_simulated()
    }
}

#[cfg(feature = "std")]
impl<B: RegisterBus + ?Sized> RegisterBus for std::boxed::Box<B> {
    fn write_register(&mut self, register: u8, value: u8) -> BusResult<()> {
        (**self).write_register(register, value)
    }

    fn read_register(&mut self, register: u8, buf: &mut [u8]) -> BusResult<()> {
        (**self).read_register(register, buf)
    }

    fn is_simulated(&self) -> bool {
        (**self).is_simulated()
    }
}
