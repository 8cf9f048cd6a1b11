//! # Loopback Simulator
//!
//! An in-memory stand-in for the ranging sensor on the far side of the
//! bridge. It answers the same register reads and writes the transport
//! issues against the real chip, so the whole stack can run without
//! hardware.
//!
//! ## Register Model
//!
//! ```text
//! write THR ──► decode frame ──► GetMode      stage [mode code]
//!                            ├─► SetMode(m)   mode = m (Reset -> Continuous), stage nothing
//!                            └─► GetDistances stage count × 2 bytes (nothing when Off)
//!
//! read RHR   ──► hand over every staged byte at once, then forget them
//! read RXLVL ──► staged byte count, or a fixed value (see RxLevelReport)
//! read TXLVL ──► always room to transmit
//! ```

use heapless::Vec;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::protocol::{encode_distance, Frame, Mode, MAX_DISTANCES, NO_OBJECT};
use crate::registers::{self, FIFO_DEPTH, RHR, RXLVL, THR, TXLVL};
use crate::traits::{BusError, BusResult, RegisterBus};

/// Largest reply the simulator can stage: a full distance table
pub const STAGE_CAPACITY: usize = MAX_DISTANCES * 2;

/// RXLVL value reported in `RxLevelReport::Fixed` mode by default
pub const FIXED_RX_LEVEL: u8 = 100;

/// Byte returned for reads of registers the simulator does not model
pub const FILLER_BYTE: u8 = 17;

/// Slot of the canned table that reports "no object"
pub const EMPTY_SLOT: usize = 4;

/// What the simulator reports when RXLVL is read
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxLevelReport {
    /// Always this value, whatever is staged
    Fixed(u8),
    /// The number of bytes currently staged
    #[default]
    Staged,
}

/// Simulated ranging sensor
pub struct Simulator {
    current_mode: Mode,
    staged: Vec<u8, STAGE_CAPACITY>,
    distances: [i16; MAX_DISTANCES],
    rx_level: RxLevelReport,
}

impl Simulator {
    /// Sensor in `Continuous` mode with the canned distance table
    pub fn new() -> Self {
        Self::with_rx_level(RxLevelReport::default())
    }

    /// Same as `new`, reporting RXLVL as given
    pub fn with_rx_level(rx_level: RxLevelReport) -> Self {
        let mut distances = [0i16; MAX_DISTANCES];
        for (i, slot) in distances.iter_mut().enumerate() {
            *slot = 500 + i as i16;
        }
        distances[EMPTY_SLOT] = NO_OBJECT;

        Self {
            current_mode: Mode::Continuous,
            staged: Vec::new(),
            distances,
            rx_level,
        }
    }

    /// Mode the simulated device is in
    pub fn mode(&self) -> Mode {
        self.current_mode
    }

    /// Bytes waiting to be read from RHR
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// The distance table replies are built from
    pub fn distances(&self) -> &[i16] {
        &self.distances
    }

    /// Replace one entry of the distance table
    ///
    /// Returns `false` if `index` is outside the table.
    pub fn set_distance(&mut self, index: usize, value: i16) -> bool {
        match self.distances.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// How RXLVL reads are answered
    pub fn rx_level_report(&self) -> RxLevelReport {
        self.rx_level
    }

    fn receive_command(&mut self, byte: u8) {
        let frame = match Frame::decode(byte) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("simulator: ignoring command byte {:#04x}: {}", byte, e);
                return;
            }
        };

        self.staged.clear();
        match frame {
            Frame::GetMode => {
                debug!("simulator: GetMode, current mode {:?}", self.current_mode);
                // capacity is at least 2
                let _ = self.staged.push(self.current_mode.code());
            }
            Frame::SetMode(mode) => {
                debug!("simulator: SetMode, {:?} -> {:?}", self.current_mode, mode);
                self.current_mode = mode.settled();
            }
            Frame::GetDistances(_) => {
                let count = frame.requested_count().unwrap_or(0);
                debug!("simulator: GetDistances, count {}", count);
                if !self.current_mode.is_ranging() {
                    warn!("simulator: distance requested but the sensor is off");
                    return;
                }
                if count > MAX_DISTANCES {
                    warn!(
                        "simulator: {} distances requested, maximum is {}",
                        count, MAX_DISTANCES
                    );
                    return;
                }
                for &distance in &self.distances[..count] {
                    // count * 2 <= STAGE_CAPACITY
                    let _ = self.staged.extend_from_slice(&encode_distance(distance));
                }
            }
        }
    }

    fn send_staged(&mut self, buf: &mut [u8]) -> BusResult<()> {
        if self.staged.is_empty() {
            warn!("simulator: RHR read but nothing to send");
            return Err(BusError::NoData);
        }
        if buf.len() < self.staged.len() {
            warn!(
                "simulator: RHR read of {} bytes, {} staged",
                buf.len(),
                self.staged.len()
            );
            return Err(BusError::BufferTooSmall {
                needed: self.staged.len(),
                provided: buf.len(),
            });
        }

        debug!("simulator: sending {} bytes", self.staged.len());
        buf[..self.staged.len()].copy_from_slice(&self.staged);
        self.staged.clear();
        Ok(())
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for Simulator {
    fn write_register(&mut self, register: u8, value: u8) -> BusResult<()> {
        if register == THR {
            self.receive_command(value);
        }
        Ok(())
    }

    fn read_register(&mut self, register: u8, buf: &mut [u8]) -> BusResult<()> {
        match register {
            RXLVL => {
                let level = match self.rx_level {
                    RxLevelReport::Fixed(level) => level,
                    RxLevelReport::Staged => self.staged.len() as u8,
                };
                buf.fill(level);
                Ok(())
            }
            TXLVL => {
                buf.fill(FIFO_DEPTH as u8);
                Ok(())
            }
            RHR => self.send_staged(buf),
            other => {
                debug!("simulator: read of unmodelled register {}", registers::name(other));
                buf.fill(FILLER_BYTE);
                Ok(())
            }
        }
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode_distance;
    use crate::registers::{LCR, SPR};

    fn send(sim: &mut Simulator, frame: Frame) {
        sim.write_register(THR, frame.encode()).unwrap();
    }

    #[test]
    fn test_initial_state() {
        let sim = Simulator::new();
        assert_eq!(sim.mode(), Mode::Continuous);
        assert_eq!(sim.staged_len(), 0);
        assert_eq!(sim.distances()[0], 500);
        assert_eq!(sim.distances()[3], 503);
        assert_eq!(sim.distances()[EMPTY_SLOT], NO_OBJECT);
        assert_eq!(sim.distances()[MAX_DISTANCES - 1], 500 + MAX_DISTANCES as i16 - 1);
        assert!(sim.is_simulated());
    }

    #[test]
    fn test_get_mode_stages_one_byte() {
        let mut sim = Simulator::new();
        send(&mut sim, Frame::GetMode);
        assert_eq!(sim.staged_len(), 1);

        let mut buf = [0u8; 1];
        sim.read_register(RHR, &mut buf).unwrap();
        assert_eq!(buf[0], Mode::Continuous.code());
    }

    #[test]
    fn test_set_mode() {
        let mut sim = Simulator::new();
        send(&mut sim, Frame::SetMode(Mode::Ping));
        assert_eq!(sim.mode(), Mode::Ping);
        assert_eq!(sim.staged_len(), 0);

        send(&mut sim, Frame::SetMode(Mode::Off));
        assert_eq!(sim.mode(), Mode::Off);
    }

    #[test]
    fn test_reset_recovers_to_continuous() {
        let mut sim = Simulator::new();
        send(&mut sim, Frame::SetMode(Mode::Off));
        send(&mut sim, Frame::SetMode(Mode::Reset));
        assert_eq!(sim.mode(), Mode::Continuous);
    }

    #[test]
    fn test_distances_are_little_endian_in_order() {
        let mut sim = Simulator::new();
        send(&mut sim, Frame::get_distances(6).unwrap());
        assert_eq!(sim.staged_len(), 12);

        let mut buf = [0u8; 12];
        sim.read_register(RHR, &mut buf).unwrap();
        let values: std::vec::Vec<i16> = buf
            .chunks_exact(2)
            .map(|pair| decode_distance(pair[0], pair[1]))
            .collect();
        assert_eq!(values, vec![500, 501, 502, 503, -1, 505]);
    }

    #[test]
    fn test_full_table() {
        let mut sim = Simulator::new();
        send(&mut sim, Frame::get_distances(MAX_DISTANCES).unwrap());
        assert_eq!(sim.staged_len(), STAGE_CAPACITY);
    }

    #[test]
    fn test_no_distances_when_off() {
        let mut sim = Simulator::new();
        send(&mut sim, Frame::SetMode(Mode::Off));
        send(&mut sim, Frame::get_distances(2).unwrap());
        assert_eq!(sim.staged_len(), 0);

        let mut buf = [0u8; 4];
        assert_eq!(sim.read_register(RHR, &mut buf), Err(BusError::NoData));
    }

    #[test]
    fn test_oversized_request_is_rejected() {
        let mut sim = Simulator::new();
        send(&mut sim, Frame::get_distances(MAX_DISTANCES + 1).unwrap());
        assert_eq!(sim.staged_len(), 0);
    }

    #[test]
    fn test_staged_bytes_are_consumed_once() {
        let mut sim = Simulator::new();
        send(&mut sim, Frame::get_distances(1).unwrap());

        let mut buf = [0u8; 2];
        sim.read_register(RHR, &mut buf).unwrap();
        assert_eq!(buf, [0xF4, 0x01]);
        assert_eq!(sim.read_register(RHR, &mut buf), Err(BusError::NoData));
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let mut sim = Simulator::new();
        send(&mut sim, Frame::get_distances(2).unwrap());

        let mut buf = [0u8; 2];
        assert_eq!(
            sim.read_register(RHR, &mut buf),
            Err(BusError::BufferTooSmall {
                needed: 4,
                provided: 2,
            })
        );
        // still staged
        assert_eq!(sim.staged_len(), 4);
    }

    #[test]
    fn test_rx_level_tracks_staged_bytes() {
        let mut sim = Simulator::new();
        let mut level = [0u8; 1];

        sim.read_register(RXLVL, &mut level).unwrap();
        assert_eq!(level[0], 0);

        send(&mut sim, Frame::get_distances(3).unwrap());
        sim.read_register(RXLVL, &mut level).unwrap();
        assert_eq!(level[0], 6);
    }

    #[test]
    fn test_fixed_rx_level() {
        let mut sim = Simulator::with_rx_level(RxLevelReport::Fixed(FIXED_RX_LEVEL));
        assert_eq!(sim.rx_level_report(), RxLevelReport::Fixed(100));
        assert_eq!(Simulator::new().rx_level_report(), RxLevelReport::Staged);
        let mut level = [0u8; 1];
        sim.read_register(RXLVL, &mut level).unwrap();
        assert_eq!(level[0], 100);
    }

    #[test]
    fn test_tx_level_never_full() {
        let mut sim = Simulator::new();
        let mut level = [0u8; 1];
        sim.read_register(TXLVL, &mut level).unwrap();
        assert!(level[0] > 0);
    }

    #[test]
    fn test_other_registers() {
        let mut sim = Simulator::new();
        sim.write_register(LCR, Frame::GetMode.encode()).unwrap();
        assert_eq!(sim.staged_len(), 0);

        let mut buf = [0u8; 1];
        sim.read_register(SPR, &mut buf).unwrap();
        assert_eq!(buf[0], FILLER_BYTE);
    }

    #[test]
    fn test_unknown_command_keeps_state() {
        let mut sim = Simulator::new();
        send(&mut sim, Frame::GetMode);
        sim.write_register(THR, 0x60).unwrap();
        assert_eq!(sim.staged_len(), 1);
        assert_eq!(sim.mode(), Mode::Continuous);
    }

    #[test]
    fn test_custom_distance() {
        let mut sim = Simulator::new();
        assert!(sim.set_distance(0, -10));
        assert!(!sim.set_distance(MAX_DISTANCES, 1));

        send(&mut sim, Frame::get_distances(1).unwrap());
        let mut buf = [0u8; 2];
        sim.read_register(RHR, &mut buf).unwrap();
        assert_eq!(buf, [0xF6, 0xFF]);
    }
}
