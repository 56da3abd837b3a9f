//! BMP280 barometric pressure sensor driver
//!
//! Measurements run in forced mode: the driver writes the control register,
//! polls the status register until the conversion is done, then burst-reads
//! pressure and temperature. Compensation uses the 32-bit temperature and
//! 64-bit pressure formulas from the datasheet.

use embedded_hal::delay::DelayNs;
use log::debug;
use raspio_hal::I2cBus;

use crate::error::SensorError;

/// Default 7-bit address (SDO tied low)
pub const ADDRESS: u8 = 0x76;

/// Alternate address (SDO tied high)
pub const ADDRESS_ALT: u8 = 0x77;

/// Content of the id register
pub const CHIP_ID: u8 = 0x58;

/// Register addresses
pub mod reg {
    /// Calibration, 24 bytes little-endian
    pub const CALIBRATION: u8 = 0x88;
    /// Chip identification
    pub const ID: u8 = 0xD0;
    /// Soft reset
    pub const RESET: u8 = 0xE0;
    /// Status (measuring, im_update)
    pub const STATUS: u8 = 0xF3;
    /// Oversampling and power mode
    pub const CTRL_MEAS: u8 = 0xF4;
    /// Standby time and IIR filter
    pub const CONFIG: u8 = 0xF5;
    /// Start of the 6-byte pressure/temperature burst
    pub const PRESS_MSB: u8 = 0xF7;
}

/// Value written to [`reg::RESET`] to reset the device
pub const RESET_COMMAND: u8 = 0xB6;

/// Status bit set while a conversion runs
pub const STATUS_MEASURING: u8 = 1 << 3;

const MODE_FORCED: u8 = 0b01;

const CALIBRATION_LEN: usize = 24;

/// Status polls before giving up on a measurement
const MAX_STATUS_POLLS: u32 = 50;

const STATUS_POLL_US: u32 = 2_000;

/// Oversampling of one measurement channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Oversampling {
    /// Channel disabled
    Skip = 0,
    X1 = 1,
    X2 = 2,
    X4 = 3,
    X8 = 4,
    X16 = 5,
}

/// IIR filter coefficient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Filter {
    #[default]
    Off = 0,
    X2 = 1,
    X4 = 2,
    X8 = 3,
    X16 = 4,
}

/// Measurement configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bmp280Config {
    pub temperature: Oversampling,
    pub pressure: Oversampling,
    pub filter: Filter,
}

impl Default for Bmp280Config {
    fn default() -> Self {
        // Datasheet "standard resolution" setting
        Self {
            temperature: Oversampling::X1,
            pressure: Oversampling::X4,
            filter: Filter::Off,
        }
    }
}

impl Bmp280Config {
    /// `ctrl_meas` value starting a forced measurement
    pub fn ctrl_meas(&self) -> u8 {
        (self.temperature as u8) << 5 | (self.pressure as u8) << 2 | MODE_FORCED
    }

    /// `config` register value
    pub fn config(&self) -> u8 {
        (self.filter as u8) << 2
    }
}

/// Factory trimming parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,
    pub dig_p1: u16,
    pub dig_p: [i16; 8],
}

impl Calibration {
    pub fn from_bytes(bytes: &[u8; CALIBRATION_LEN]) -> Result<Self, SensorError> {
        let word = |i: usize| u16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]);
        let dig_t1 = word(0);
        let dig_p1 = word(3);
        // Both are divisors or scale factors; zero means a bad read
        if dig_t1 == 0 || dig_p1 == 0 {
            return Err(SensorError::InvalidCalibration);
        }
        let mut dig_p = [0i16; 8];
        for (i, p) in dig_p.iter_mut().enumerate() {
            *p = word(4 + i) as i16;
        }
        Ok(Self {
            dig_t1,
            dig_t2: word(1) as i16,
            dig_t3: word(2) as i16,
            dig_p1,
            dig_p,
        })
    }

    /// Fine temperature carried into the pressure compensation
    pub fn t_fine(&self, adc_t: i32) -> i32 {
        let t1 = i32::from(self.dig_t1);
        let var1 = (((adc_t >> 3) - (t1 << 1)) * i32::from(self.dig_t2)) >> 11;
        let delta = (adc_t >> 4) - t1;
        let var2 = (((delta * delta) >> 12) * i32::from(self.dig_t3)) >> 14;
        var1 + var2
    }

    /// Temperature in 0.01 °C
    pub fn temperature_x100(&self, t_fine: i32) -> i32 {
        (t_fine * 5 + 128) >> 8
    }

    /// Pressure in Pa as unsigned Q24.8
    pub fn pressure_q24_8(&self, t_fine: i32, adc_p: i32) -> u32 {
        let [p2, p3, p4, p5, p6, p7, p8, p9] = self.dig_p.map(i64::from);

        let var1 = i64::from(t_fine) - 128_000;
        let var2 = var1 * var1 * p6;
        let var2 = var2 + ((var1 * p5) << 17);
        let var2 = var2 + (p4 << 35);
        let var1 = ((var1 * var1 * p3) >> 8) + ((var1 * p2) << 12);
        let var1 = (((1i64 << 47) + var1) * i64::from(self.dig_p1)) >> 33;
        if var1 == 0 {
            return 0;
        }

        let p = 1_048_576 - i64::from(adc_p);
        let p = (((p << 31) - var2) * 3125) / var1;
        let var1 = (p9 * (p >> 13) * (p >> 13)) >> 25;
        let var2 = (p8 * p) >> 19;
        (((p + var1 + var2) >> 8) + (p7 << 4)) as u32
    }
}

/// Compensated measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bmp280Reading {
    /// Temperature in 0.01 °C
    pub temperature_c_x100: i32,
    /// Pressure in Pa, Q24.8
    pub pressure_q24_8: u32,
}

impl Bmp280Reading {
    /// Whole pascals
    pub fn pressure_pa(&self) -> u32 {
        self.pressure_q24_8 >> 8
    }
}

/// BMP280 on an I2C bus
#[derive(Debug)]
pub struct Bmp280<B, D> {
    bus: B,
    delay: D,
    address: u8,
    config: Bmp280Config,
    calibration: Calibration,
}

impl<B: I2cBus, D: DelayNs> Bmp280<B, D> {
    /// Check the chip id, load the calibration and apply `config`
    pub fn new(
        mut bus: B,
        delay: D,
        address: u8,
        config: Bmp280Config,
    ) -> Result<Self, SensorError> {
        let id = bus.read_register(address, reg::ID)?;
        if id != CHIP_ID {
            return Err(SensorError::UnexpectedChipId {
                expected: CHIP_ID,
                found: id,
            });
        }

        let mut raw = [0u8; CALIBRATION_LEN];
        bus.write_read(address, &[reg::CALIBRATION], &mut raw)?;
        let calibration = Calibration::from_bytes(&raw)?;
        debug!("bmp280 at {address:#04x}: calibration {calibration:?}");

        bus.write_register(address, reg::CONFIG, config.config())?;
        Ok(Self {
            bus,
            delay,
            address,
            config,
            calibration,
        })
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn config(&self) -> Bmp280Config {
        self.config
    }

    pub fn set_config(&mut self, config: Bmp280Config) -> Result<(), SensorError> {
        self.bus
            .write_register(self.address, reg::CONFIG, config.config())?;
        self.config = config;
        Ok(())
    }

    /// Soft reset; calibration survives in non-volatile memory
    pub fn reset(&mut self) -> Result<(), SensorError> {
        self.bus
            .write_register(self.address, reg::RESET, RESET_COMMAND)?;
        self.delay.delay_us(STATUS_POLL_US);
        Ok(())
    }

    pub fn release(self) -> B {
        self.bus
    }

    /// Raw (adc_P, adc_T) of one forced measurement
    pub fn measure_raw(&mut self) -> Result<(i32, i32), SensorError> {
        self.bus
            .write_register(self.address, reg::CTRL_MEAS, self.config.ctrl_meas())?;
        self.wait_measurement()?;

        let mut data = [0u8; 6];
        self.bus
            .write_read(self.address, &[reg::PRESS_MSB], &mut data)?;
        let adc = |msb: u8, lsb: u8, xlsb: u8| {
            i32::from(msb) << 12 | i32::from(lsb) << 4 | i32::from(xlsb >> 4)
        };
        Ok((adc(data[0], data[1], data[2]), adc(data[3], data[4], data[5])))
    }

    fn wait_measurement(&mut self) -> Result<(), SensorError> {
        for _ in 0..MAX_STATUS_POLLS {
            let status = self.bus.read_register(self.address, reg::STATUS)?;
            if status & STATUS_MEASURING == 0 {
                return Ok(());
            }
            self.delay.delay_us(STATUS_POLL_US);
        }
        Err(SensorError::MeasurementTimeout)
    }

    pub fn read(&mut self) -> Result<Bmp280Reading, SensorError> {
        let (adc_p, adc_t) = self.measure_raw()?;
        let t_fine = self.calibration.t_fine(adc_t);
        Ok(Bmp280Reading {
            temperature_c_x100: self.calibration.temperature_x100(t_fine),
            pressure_q24_8: self.calibration.pressure_q24_8(t_fine, adc_p),
        })
    }
}
