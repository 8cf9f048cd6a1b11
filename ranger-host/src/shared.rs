//! Thread-safe handle to one physical device.
//!
//! Every request holds the device lock from the command byte to the last
//! reply byte, so two callers never interleave frames on the bus.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use log::debug;

use ranger_core::Mode;

use crate::device::Device;
use crate::{DeviceError, Result};

/// Cloneable handle; all clones talk to the same device
#[derive(Clone)]
pub struct SharedDevice {
    inner: Arc<Mutex<Device>>,
}

impl SharedDevice {
    /// Take ownership of `device`
    pub fn new(device: Device) -> Self {
        Self {
            inner: Arc::new(Mutex::new(device)),
        }
    }

    /// Run `f` with exclusive access, waiting for other callers to finish
    pub fn with<R>(&self, f: impl FnOnce(&mut Device) -> R) -> R {
        f(&mut *self.lock())
    }

    /// Read `count` echoes, waiting for other callers to finish
    pub fn get_distances(&self, count: usize) -> Result<Vec<i16>> {
        self.lock().get_distances(count)
    }

    /// Read `count` echoes, or fail with `Busy` if another request is in
    /// flight
    pub fn try_get_distances(&self, count: usize) -> Result<Vec<i16>> {
        let mut device = match self.inner.try_lock() {
            Ok(device) => device,
            Err(TryLockError::WouldBlock) => {
                debug!("distance request refused, device busy");
                return Err(DeviceError::Busy);
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        device.get_distances(count)
    }

    /// Switch the sensor to `mode`
    pub fn set_mode(&self, mode: Mode) -> Result<()> {
        self.lock().set_mode(mode)
    }

    /// The mode the sensor is believed to be in
    pub fn mode(&self) -> Mode {
        self.lock().mode()
    }

    /// Protocol and transport messages of the last failures
    pub fn last_error_trace(&self) -> String {
        self.lock().last_error_trace()
    }

    // a panic mid-request leaves the sensor state intact
    fn lock(&self) -> MutexGuard<'_, Device> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
