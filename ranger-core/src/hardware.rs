//! I2C backend: the real SC16IS750.

use embedded_hal::i2c::{Error as _, I2c};

use crate::registers::DEFAULT_ADDRESS;
use crate::traits::{BusError, BusResult, RegisterBus};

/// `RegisterBus` over an `embedded-hal` I2C bus
pub struct I2cRegisterBus<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> I2cRegisterBus<I2C> {
    /// Use the chip at the default address (A0, A1 tied to VSS)
    pub fn new(i2c: I2C) -> Self {
        Self::with_address(i2c, DEFAULT_ADDRESS)
    }

    /// Use the chip at a specific 7-bit address
    pub fn with_address(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// 7-bit bus address of the chip
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Give the bus back
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> RegisterBus for I2cRegisterBus<I2C> {
    fn write_register(&mut self, register: u8, value: u8) -> BusResult<()> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(|e| BusError::I2c(e.kind()))
    }

    fn read_register(&mut self, register: u8, buf: &mut [u8]) -> BusResult<()> {
        self.i2c
            .write_read(self.address, &[register], buf)
            .map_err(|e| BusError::I2c(e.kind()))
    }
}
