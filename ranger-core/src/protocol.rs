//! # Sensor Command Frames
//!
//! Every command sent to the ranging sensor is a single byte. The top bits
//! select the command, the remaining bits carry its argument.
//!
//! ## Frame Format
//!
//! ```text
//!  b7   b6   b5   b4   b3   b2   b1   b0
//! ┌────┬────┬────┬────┬────┬────┬────┬────┐
//! │ 0  │ 0  │ 1  │ x  │ x  │ x  │ x  │ x  │  GetMode   -> 1 byte reply (mode code)
//! │ 0  │ 1  │ 0  │ 0  │ 0  │ 0  │ m1 │ m0 │  SetMode   -> no reply
//! │ 1  │ d6 │ d5 │ d4 │ d3 │ d2 │ d1 │ d0 │  GetDistances, d = count - 1
//! └────┴────┴────┴────┴────┴────┴────┴────┘
//! ```
//!
//! A distance reply is `count` little-endian 16-bit signed values, first
//! echo first. `-1` in a slot means no object was detected.

use serde::{Deserialize, Serialize};

/// Number of distance slots in one batch
#[cfg(not(feature = "short-table"))]
pub const MAX_DISTANCES: usize = 32;

/// Number of distance slots in one batch
#[cfg(feature = "short-table")]
pub const MAX_DISTANCES: usize = 8;

/// Largest count a distance request can encode (7-bit `count - 1`)
pub const MAX_FRAME_COUNT: usize = 128;

/// Distance value meaning "no object detected"
pub const NO_OBJECT: i16 = -1;

/// Horizontal resolution of the sensor's field of view, in pixels
pub const X_PIXELS: i32 = 1944;

/// Opcode position within the command byte
const CMD_SHIFT: u8 = 5;

/// Three-bit opcode mask (after shifting)
const CMD_MASK: u8 = 0x7;

const OPCODE_GET_MODE: u8 = 0b001;
const OPCODE_SET_MODE: u8 = 0b010;

/// Distance requests are flagged by the top bit alone
const DISTANCE_FLAG: u8 = 0x80;

const MODE_MASK: u8 = 0x3;
const COUNT_MASK: u8 = 0x7F;

/// Operating mode of the ranging sensor
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Mode {
    /// Sensor disabled, no pings are issued
    Off = 0,
    /// Soft reset; the device comes back up in `Continuous`
    Reset = 1,
    /// One ping per request, up to `MAX_DISTANCES` echoes captured
    Ping = 2,
    /// Pings as often as possible, latest result kept
    #[default]
    Continuous = 3,
}

impl Mode {
    /// All modes, in code order
    pub const ALL: [Mode; 4] = [Mode::Off, Mode::Reset, Mode::Ping, Mode::Continuous];

    /// Two-bit wire code of this mode
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decode a wire code the way the device firmware does: only the low
    /// two bits are looked at.
    pub const fn from_code_lossy(code: u8) -> Self {
        match code & MODE_MASK {
            0 => Mode::Off,
            1 => Mode::Reset,
            2 => Mode::Ping,
            _ => Mode::Continuous,
        }
    }

    /// Mode the device ends up in after being told to enter `self`
    pub const fn settled(self) -> Self {
        match self {
            Mode::Reset => Mode::Continuous,
            other => other,
        }
    }

    /// Whether the device produces distance readings in this mode
    pub const fn is_ranging(self) -> bool {
        matches!(self, Mode::Ping | Mode::Continuous)
    }
}

impl TryFrom<u8> for Mode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Off),
            1 => Ok(Self::Reset),
            2 => Ok(Self::Ping),
            3 => Ok(Self::Continuous),
            other => Err(FrameError::InvalidMode(other)),
        }
    }
}

/// One command byte, decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Frame {
    /// Ask the device for its current mode
    GetMode,
    /// Switch the device to a mode
    SetMode(Mode),
    /// Request `payload + 1` distance readings (payload 0..=127)
    GetDistances(u8),
}

impl Frame {
    /// Distance request for `count` readings
    pub fn get_distances(count: usize) -> Result<Self, FrameError> {
        if count == 0 || count > MAX_FRAME_COUNT {
            return Err(FrameError::CountOutOfRange(count));
        }
        Ok(Frame::GetDistances((count - 1) as u8))
    }

    /// Encode into the single command byte
    pub fn encode(&self) -> u8 {
        match *self {
            Frame::GetMode => OPCODE_GET_MODE << CMD_SHIFT,
            Frame::SetMode(mode) => (OPCODE_SET_MODE << CMD_SHIFT) | mode.code(),
            Frame::GetDistances(payload) => DISTANCE_FLAG | (payload & COUNT_MASK),
        }
    }

    /// Decode a command byte as the device would
    pub fn decode(byte: u8) -> Result<Self, FrameError> {
        if byte & DISTANCE_FLAG != 0 {
            return Ok(Frame::GetDistances(byte & COUNT_MASK));
        }

        match (byte >> CMD_SHIFT) & CMD_MASK {
            OPCODE_GET_MODE => Ok(Frame::GetMode),
            OPCODE_SET_MODE => Ok(Frame::SetMode(Mode::from_code_lossy(byte))),
            opcode => Err(FrameError::UnknownOpcode(opcode)),
        }
    }

    /// Number of readings a distance request asks for, 1..=128
    pub fn requested_count(&self) -> Option<usize> {
        match *self {
            Frame::GetDistances(payload) => Some((payload & COUNT_MASK) as usize + 1),
            _ => None,
        }
    }

    /// Number of reply bytes the device stages for this frame
    pub fn reply_len(&self) -> usize {
        match self {
            Frame::GetMode => 1,
            Frame::SetMode(_) => 0,
            Frame::GetDistances(_) => self.requested_count().unwrap_or(0) * 2,
        }
    }
}

/// Errors while building or parsing command frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Distance count outside 1..=128
    CountOutOfRange(usize),
    /// Opcode bits name no known command
    UnknownOpcode(u8),
    /// Mode code outside 0..=3
    InvalidMode(u8),
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FrameError::CountOutOfRange(count) => {
                write!(f, "distance count {} outside 1..={}", count, MAX_FRAME_COUNT)
            }
            FrameError::UnknownOpcode(opcode) => write!(f, "unknown opcode {:#05b}", opcode),
            FrameError::InvalidMode(code) => write!(f, "invalid mode code {}", code),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

/// Combine a little-endian byte pair into a signed distance
#[inline]
pub fn decode_distance(low: u8, high: u8) -> i16 {
    (u16::from(low) | (u16::from(high) << 8)) as i16
}

/// Split a distance into its little-endian byte pair
#[inline]
pub fn encode_distance(value: i16) -> [u8; 2] {
    value.to_le_bytes()
}

/// Evenly spaced x-positions for `count` readings across `X_PIXELS`.
///
/// Position `i` is `(i + 1) * (X_PIXELS / (count + 1))`, with the interval
/// truncated to whole pixels.
pub fn synthetic_position(index: usize, count: usize) -> i32 {
    let interval = X_PIXELS / (count as i32 + 1);
    (index as i32 + 1) * interval
}
