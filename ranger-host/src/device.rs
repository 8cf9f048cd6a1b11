//! Owned sensor handle with a `Vec`-returning API.

use embedded_hal::i2c::I2c;
use log::{info, warn};

use ranger_core::{
    BridgeUart, I2cRegisterBus, Mode, RangeSensor, RegisterBus, Simulator, MAX_DISTANCES,
    NO_OBJECT,
};

use crate::config::DeviceConfig;
use crate::{Result, StdDelay};

type DynBus = Box<dyn RegisterBus + Send>;

/// One ranging sensor, real or simulated
///
/// The backend is fixed at construction; nothing here branches on it
/// afterwards.
pub struct Device {
    sensor: RangeSensor<DynBus, StdDelay>,
}

/// Build a device with the default configuration
///
/// With `simulate` set the port is dropped and the simulator answers instead.
pub fn new_device<I2C>(port: I2C, simulate: bool) -> Result<Device>
where
    I2C: I2c + Send + 'static,
{
    Device::new(port, simulate, DeviceConfig::default())
}

impl Device {
    /// Build a device on `port`, or on the simulator when `simulate` is set
    ///
    /// The hardware path programs the bridge UART and fails if any
    /// configuration write fails. A failed connection self-test is only
    /// logged.
    pub fn new<I2C>(port: I2C, simulate: bool, config: DeviceConfig) -> Result<Self>
    where
        I2C: I2c + Send + 'static,
    {
        if simulate {
            drop(port);
            return Ok(Self::simulated(config));
        }

        let bus: DynBus = Box::new(I2cRegisterBus::with_address(port, config.address));
        let mut uart = BridgeUart::with_config(bus, StdDelay, config.uart);
        uart.initialize()?;
        info!("bridge UART at {:#04x} configured", config.address);

        Ok(Self::start(uart, config))
    }

    /// Build a device backed by the simulator
    pub fn simulated(config: DeviceConfig) -> Self {
        let bus: DynBus = Box::new(Simulator::with_rx_level(config.simulator_rx_level));
        let uart = BridgeUart::with_config(bus, StdDelay, config.uart);
        info!("simulated sensor, RXLVL reported as {:?}", config.simulator_rx_level);

        Self::start(uart, config)
    }

    fn start(uart: BridgeUart<DynBus, StdDelay>, config: DeviceConfig) -> Self {
        let mut sensor = RangeSensor::new(uart, config.sensor);
        if let Err(e) = sensor.test_connection() {
            warn!("connection test failed: {}", e);
        }
        info!("sensor ready, mode {:?}", sensor.mode());
        Self { sensor }
    }

    /// Switch the sensor to `mode`
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        Ok(self.sensor.set_mode(mode)?)
    }

    /// The mode the sensor is believed to be in
    pub fn mode(&self) -> Mode {
        self.sensor.mode()
    }

    /// Ask the sensor which mode it is in
    pub fn query_mode(&mut self) -> Result<Mode> {
        Ok(self.sensor.query_mode()?)
    }

    /// Nearest object, `NO_OBJECT` if none
    pub fn get_distance(&mut self) -> Result<i16> {
        Ok(self.sensor.get_distance()?)
    }

    /// The first `count` echoes
    pub fn get_distances(&mut self, count: usize) -> Result<Vec<i16>> {
        // oversized counts are refused before the slice length is checked
        let mut distances = vec![NO_OBJECT; count.min(MAX_DISTANCES)];
        self.sensor.get_distances(&mut distances, count)?;
        Ok(distances)
    }

    /// The first `count` echoes with evenly spaced x-positions
    pub fn get_distance_2d(&mut self, count: usize) -> Result<(Vec<i32>, Vec<i16>)> {
        let len = count.min(MAX_DISTANCES);
        let mut positions = vec![0; len];
        let mut distances = vec![NO_OBJECT; len];
        self.sensor
            .get_distances_2d(&mut positions, &mut distances, count)?;
        Ok((positions, distances))
    }

    /// Whatever the current mode produces: one echo in continuous mode,
    /// the full table otherwise
    pub fn get_echoes(&mut self) -> Result<Vec<i16>> {
        let mut distances = [NO_OBJECT; MAX_DISTANCES];
        let count = self.sensor.get_echoes(&mut distances)?;
        Ok(distances[..count].to_vec())
    }

    /// Run the bridge self-test
    pub fn test_connection(&mut self) -> Result<()> {
        Ok(self.sensor.test_connection()?)
    }

    /// Protocol and transport messages of the last failures
    pub fn last_error_trace(&self) -> String {
        self.sensor.error_trace().as_str().to_owned()
    }

    /// Whether the simulator answers instead of hardware
    pub fn is_simulated(&self) -> bool {
        self.sensor.uart().is_simulated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceError;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};
    use ranger_core::registers::{
        DEFAULT_ADDRESS, FIFO_DEPTH, RHR, RXLVL, SPR, TEST_CHARACTER, THR, TXLVL,
    };
    use ranger_core::uart::INIT_SEQUENCE;
    use ranger_core::{Frame, RxLevelReport, SensorError, UartConfig, UartError};

    fn fast_config() -> DeviceConfig {
        DeviceConfig {
            uart: UartConfig {
                timeout_ms: 0,
                settle_ms: 0,
            },
            ..DeviceConfig::default()
        }
    }

    fn bring_up() -> Vec<I2cTransaction> {
        let mut transactions: Vec<I2cTransaction> = INIT_SEQUENCE
            .iter()
            .map(|&(register, value)| I2cTransaction::write(DEFAULT_ADDRESS, vec![register, value]))
            .collect();
        transactions.push(I2cTransaction::write(DEFAULT_ADDRESS, vec![SPR, TEST_CHARACTER]));
        transactions.push(I2cTransaction::write_read(
            DEFAULT_ADDRESS,
            vec![SPR],
            vec![TEST_CHARACTER],
        ));
        transactions
    }

    #[test]
    fn test_simulated_device() {
        let mut device = Device::simulated(fast_config());
        assert!(device.is_simulated());
        assert_eq!(device.mode(), Mode::Continuous);

        assert_eq!(device.get_distance().unwrap(), 500);
        assert_eq!(device.get_distances(5).unwrap(), vec![500, 501, 502, 503, NO_OBJECT]);
        device.test_connection().unwrap();
    }

    #[test]
    fn test_simulate_flag_drops_port() {
        // no expectations: the port must never be used
        let mut i2c = I2cMock::new(&[]);
        let mut device = Device::new(i2c.clone(), true, fast_config()).unwrap();

        device.set_mode(Mode::Ping).unwrap();
        assert_eq!(device.query_mode().unwrap(), Mode::Ping);
        i2c.done();
    }

    #[test]
    fn test_distance_2d() {
        let mut device = Device::simulated(fast_config());
        let (positions, distances) = device.get_distance_2d(3).unwrap();
        assert_eq!(positions, vec![486, 972, 1458]);
        assert_eq!(distances, vec![500, 501, 502]);
    }

    #[test]
    fn test_echoes() {
        let mut device = Device::simulated(fast_config());
        assert_eq!(device.get_echoes().unwrap(), vec![500]);

        device.set_mode(Mode::Ping).unwrap();
        assert_eq!(device.get_echoes().unwrap().len(), MAX_DISTANCES);
    }

    #[test]
    fn test_out_of_range_counts() {
        let mut device = Device::simulated(fast_config());
        assert!(matches!(
            device.get_distances(0),
            Err(DeviceError::Sensor(SensorError::InvalidRequestSize(_)))
        ));
        assert!(matches!(
            device.get_distances(usize::MAX),
            Err(DeviceError::Sensor(SensorError::InvalidRequestSize(_)))
        ));
        assert!(matches!(
            device.get_distance_2d(MAX_DISTANCES + 1),
            Err(DeviceError::Sensor(SensorError::InvalidRequestSize(_)))
        ));
        assert!(device.last_error_trace().starts_with("RangeSensor: invalid number"));
    }

    #[test]
    fn test_off_times_out() {
        let mut config = fast_config();
        config.sensor.poll_attempts = 2;
        config.sensor.poll_backoff_ms = 0;
        let mut device = Device::simulated(config);

        device.set_mode(Mode::Off).unwrap();
        assert!(matches!(
            device.get_distance(),
            Err(DeviceError::Sensor(SensorError::Timeout { expected: 2, .. }))
        ));
    }

    #[test]
    fn test_fixed_rx_level_backend() {
        let mut config = fast_config();
        config.simulator_rx_level = RxLevelReport::Fixed(100);
        let mut device = Device::simulated(config);
        assert_eq!(device.get_distances(2).unwrap(), vec![500, 501]);
    }

    #[test]
    fn test_hardware_device_reads_distances() {
        let request = Frame::get_distances(2).unwrap().encode();
        let mut expectations = bring_up();
        expectations.extend([
            I2cTransaction::write_read(DEFAULT_ADDRESS, vec![RXLVL], vec![0]),
            I2cTransaction::write_read(DEFAULT_ADDRESS, vec![TXLVL], vec![FIFO_DEPTH as u8]),
            I2cTransaction::write(DEFAULT_ADDRESS, vec![THR, request]),
            I2cTransaction::write_read(DEFAULT_ADDRESS, vec![RXLVL], vec![4]),
            I2cTransaction::write_read(DEFAULT_ADDRESS, vec![RXLVL], vec![4]),
            I2cTransaction::write_read(DEFAULT_ADDRESS, vec![RHR], vec![0x2C, 0x01, 0xFF, 0xFF]),
        ]);
        let mut i2c = I2cMock::new(&expectations);

        let mut device = Device::new(i2c.clone(), false, fast_config()).unwrap();
        assert!(!device.is_simulated());
        assert_eq!(device.get_distances(2).unwrap(), vec![300, NO_OBJECT]);

        drop(device);
        i2c.done();
    }

    #[test]
    fn test_hardware_mode_change() {
        let mut expectations = bring_up();
        expectations.extend([
            I2cTransaction::write_read(DEFAULT_ADDRESS, vec![TXLVL], vec![1]),
            I2cTransaction::write(DEFAULT_ADDRESS, vec![THR, Frame::SetMode(Mode::Off).encode()]),
        ]);
        let mut i2c = I2cMock::new(&expectations);

        let mut device = Device::new(i2c.clone(), false, fast_config()).unwrap();
        device.set_mode(Mode::Off).unwrap();
        assert_eq!(device.mode(), Mode::Off);

        drop(device);
        i2c.done();
    }

    #[test]
    fn test_failed_self_test_is_not_fatal() {
        let mut expectations: Vec<I2cTransaction> = INIT_SEQUENCE
            .iter()
            .map(|&(register, value)| I2cTransaction::write(DEFAULT_ADDRESS, vec![register, value]))
            .collect();
        expectations.push(I2cTransaction::write(DEFAULT_ADDRESS, vec![SPR, TEST_CHARACTER]));
        expectations.push(I2cTransaction::write_read(DEFAULT_ADDRESS, vec![SPR], vec![0x00]));
        let mut i2c = I2cMock::new(&expectations);

        let device = Device::new(i2c.clone(), false, fast_config()).unwrap();
        assert!(device.last_error_trace().contains("does not match"));

        drop(device);
        i2c.done();
    }

    #[test]
    fn test_failed_initialization_is_fatal() {
        let mut expectations: Vec<I2cTransaction> = INIT_SEQUENCE
            .iter()
            .map(|&(register, value)| I2cTransaction::write(DEFAULT_ADDRESS, vec![register, value]))
            .collect();
        expectations[0] = expectations[0].clone().with_error(ErrorKind::Other);
        let mut i2c = I2cMock::new(&expectations);

        let result = new_device(i2c.clone(), false);
        assert!(matches!(
            result,
            Err(DeviceError::Uart(UartError::InitFailed {
                failed_writes: 1,
                ..
            }))
        ));
        i2c.done();
    }
}
