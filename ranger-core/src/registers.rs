//! # SC16IS750 Register Map
//!
//! Sub-addresses of the bridge chip's internal registers as they appear on
//! the I2C bus. The chip expects the register index in bits 6..3 of the
//! sub-address byte (datasheet table 33), hence the `<< 3` on every entry.
//!
//! Several registers share an address and are told apart by direction or
//! by the LCR bank selection:
//!
//! ```text
//! addr  write        read        LCR[7]=1      LCR=0xBF
//! 0x00  THR          RHR         DLL           -
//! 0x08  IER          IER         DLM           -
//! 0x10  FCR          IIR         -             EFR
//! ```

// General register set
pub const THR: u8 = 0x00 << 3; // Transmit holding register (write)
pub const RHR: u8 = 0x00 << 3; // Receive holding register (read)
pub const IER: u8 = 0x01 << 3; // Interrupt enable
pub const FCR: u8 = 0x02 << 3; // FIFO control (write)
pub const IIR: u8 = 0x02 << 3; // Interrupt identification (read)
pub const LCR: u8 = 0x03 << 3; // Line control
pub const MCR: u8 = 0x04 << 3; // Modem control
pub const LSR: u8 = 0x05 << 3; // Line status
pub const MSR: u8 = 0x06 << 3; // Modem status
pub const SPR: u8 = 0x07 << 3; // Scratch pad
pub const TXLVL: u8 = 0x08 << 3; // Free spaces in the TX FIFO
pub const RXLVL: u8 = 0x09 << 3; // Bytes waiting in the RX FIFO
pub const IODIR: u8 = 0x0A << 3;
pub const IOSTATE: u8 = 0x0B << 3;
pub const IOINTMSK: u8 = 0x0C << 3;
pub const IOCTRL: u8 = 0x0E << 3;
pub const EFCR: u8 = 0x0F << 3; // Extra features control

// Special register set (LCR[7] = 1)
pub const DLL: u8 = 0x00 << 3; // Divisor latch, low byte
pub const DLM: u8 = 0x01 << 3; // Divisor latch, high byte

// Enhanced register set (LCR = 0xBF)
pub const EFR: u8 = 0x02 << 3;
pub const XON1: u8 = 0x04 << 3;
pub const XON2: u8 = 0x05 << 3;
pub const XOFF1: u8 = 0x06 << 3;
pub const XOFF2: u8 = 0x07 << 3;

/// LCR value that exposes DLL/DLM for baud-rate programming
pub const LCR_DIVISOR_LATCH: u8 = 0x80;

/// LCR value that exposes the enhanced register bank (EFR, XON, XOFF)
pub const LCR_ENHANCED_BANK: u8 = 0xBF;

/// LCR value for 8 data bits, 1 stop bit, no parity
pub const LCR_8N1: u8 = 0x03;

/// EFR bit 4: enable enhanced functions
pub const EFR_ENHANCED_FUNCTIONS: u8 = 1 << 4;

/// FCR: reset both FIFOs
pub const FCR_RESET_FIFOS: u8 = 0x06;

/// FCR: enable FIFO mode
pub const FCR_ENABLE_FIFO: u8 = 0x01;

/// Baud-rate divisor for 9600 baud with the 14.7456 MHz crystal
pub const BAUD_DIVISOR: u16 = 0x0060;

/// Byte written to SPR and read back by the connection self-test
pub const TEST_CHARACTER: u8 = b'H';

/// 7-bit bus address with A0 and A1 tied to VSS (0x9A in 8-bit notation)
pub const DEFAULT_ADDRESS: u8 = 0x4D;

/// Depth of the chip's RX and TX FIFOs
pub const FIFO_DEPTH: usize = 64;

/// Human-readable name of a register sub-address, for diagnostics.
///
/// Aliased addresses report the general-bank name with the read/write pair
/// joined by a slash.
pub fn name(register: u8) -> &'static str {
    match register {
        THR => "THR/RHR",
        IER => "IER",
        FCR => "FCR/IIR",
        LCR => "LCR",
        MCR => "MCR",
        LSR => "LSR",
        MSR => "MSR",
        SPR => "SPR",
        TXLVL => "TXLVL",
        RXLVL => "RXLVL",
        IODIR => "IODIR",
        IOSTATE => "IOSTATE",
        IOINTMSK => "IOINTMSK",
        IOCTRL => "IOCTRL",
        EFCR => "EFCR",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_addresses_are_shifted() {
        assert_eq!(THR, 0x00);
        assert_eq!(LCR, 0x18);
        assert_eq!(SPR, 0x38);
        assert_eq!(TXLVL, 0x40);
        assert_eq!(RXLVL, 0x48);
        assert_eq!(EFCR, 0x78);
    }

    #[test]
    fn test_aliased_registers() {
        assert_eq!(THR, RHR);
        assert_eq!(DLL, THR);
        assert_eq!(DLM, IER);
        assert_eq!(EFR, FCR);
    }

    #[test]
    fn test_register_names() {
        assert_eq!(name(RXLVL), "RXLVL");
        assert_eq!(name(RHR), "THR/RHR");
        assert_eq!(name(0x01), "unknown");
    }
}
