//! BMP085 barometric pressure sensor driver
//!
//! The BMP085 has no continuous mode: every measurement is started by a
//! command to the control register, followed by a fixed conversion delay.
//! Raw values are compensated with 11 factory calibration words stored in
//! the device EEPROM.
//!
//! # Compensation
//!
//! Integer arithmetic exactly as given in the datasheet; results are
//! temperature in 0.1 °C and pressure in Pa.

use embedded_hal::delay::DelayNs;
use log::debug;
use raspio_hal::I2cBus;

use crate::error::SensorError;

/// Fixed 7-bit device address
pub const ADDRESS: u8 = 0x77;

/// Content of the chip id register
pub const CHIP_ID: u8 = 0x55;

/// Register addresses
pub mod reg {
    /// Calibration EEPROM, 22 bytes big-endian
    pub const CALIBRATION: u8 = 0xAA;
    /// Chip identification
    pub const CHIP_ID: u8 = 0xD0;
    /// Measurement control
    pub const CONTROL: u8 = 0xF4;
    /// Conversion result MSB, followed by LSB and XLSB
    pub const DATA: u8 = 0xF6;
}

/// Control register commands
pub mod cmd {
    /// Start a temperature conversion
    pub const TEMPERATURE: u8 = 0x2E;
    /// Start a pressure conversion; oversampling goes in bits 6-7
    pub const PRESSURE: u8 = 0x34;
}

const CALIBRATION_LEN: usize = 22;

/// Temperature conversion time in microseconds
const TEMPERATURE_CONVERSION_US: u32 = 4_500;

/// Pressure oversampling setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Oversampling {
    UltraLowPower = 0,
    #[default]
    Standard = 1,
    HighResolution = 2,
    UltraHighResolution = 3,
}

impl Oversampling {
    /// Setting value (`oss` in the datasheet)
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Maximum conversion time in microseconds
    pub const fn conversion_time_us(self) -> u32 {
        match self {
            Oversampling::UltraLowPower => 4_500,
            Oversampling::Standard => 7_500,
            Oversampling::HighResolution => 13_500,
            Oversampling::UltraHighResolution => 25_500,
        }
    }
}

/// Factory calibration words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub ac1: i16,
    pub ac2: i16,
    pub ac3: i16,
    pub ac4: u16,
    pub ac5: u16,
    pub ac6: u16,
    pub b1: i16,
    pub b2: i16,
    pub mb: i16,
    pub mc: i16,
    pub md: i16,
}

impl Calibration {
    /// Parse the EEPROM image
    ///
    /// Words reading 0x0000 or 0xFFFF mean the EEPROM was not read back
    /// correctly.
    pub fn from_bytes(bytes: &[u8; CALIBRATION_LEN]) -> Result<Self, SensorError> {
        let mut words = [0u16; CALIBRATION_LEN / 2];
        for (word, pair) in words.iter_mut().zip(bytes.chunks_exact(2)) {
            *word = u16::from_be_bytes([pair[0], pair[1]]);
            if *word == 0x0000 || *word == 0xFFFF {
                return Err(SensorError::InvalidCalibration);
            }
        }
        let signed = |i: usize| words[i] as i16;
        Ok(Self {
            ac1: signed(0),
            ac2: signed(1),
            ac3: signed(2),
            ac4: words[3],
            ac5: words[4],
            ac6: words[5],
            b1: signed(6),
            b2: signed(7),
            mb: signed(8),
            mc: signed(9),
            md: signed(10),
        })
    }

    /// Intermediate temperature term shared by both compensations
    pub fn b5(&self, ut: i32) -> i32 {
        let x1 = ((ut - i32::from(self.ac6)) * i32::from(self.ac5)) >> 15;
        let x2 = (i32::from(self.mc) << 11) / (x1 + i32::from(self.md));
        x1 + x2
    }

    /// Temperature in 0.1 °C
    pub fn temperature_x10(&self, ut: i32) -> i32 {
        (self.b5(ut) + 8) >> 4
    }

    /// Pressure in Pa
    pub fn pressure_pa(&self, ut: i32, up: i32, oversampling: Oversampling) -> i32 {
        let oss = u32::from(oversampling.value());
        let b6 = self.b5(ut) - 4000;

        let x1 = (i32::from(self.b2) * ((b6 * b6) >> 12)) >> 11;
        let x2 = (i32::from(self.ac2) * b6) >> 11;
        let x3 = x1 + x2;
        let b3 = (((i32::from(self.ac1) * 4 + x3) << oss) + 2) / 4;

        let x1 = (i32::from(self.ac3) * b6) >> 13;
        let x2 = (i32::from(self.b1) * ((b6 * b6) >> 12)) >> 16;
        let x3 = (x1 + x2 + 2) >> 2;
        let b4 = (u32::from(self.ac4) * (x3 + 32768) as u32) >> 15;
        let b7 = (up - b3) as u32 * (50_000 >> oss);

        let p = if b7 < 0x8000_0000 {
            (b7 * 2 / b4) as i32
        } else {
            (b7 / b4 * 2) as i32
        };

        let x1 = (p >> 8) * (p >> 8);
        let x1 = (x1 * 3038) >> 16;
        let x2 = (-7357 * p) >> 16;
        p + ((x1 + x2 + 3791) >> 4)
    }
}

/// Compensated measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bmp085Reading {
    /// Temperature in 0.1 °C
    pub temperature_c_x10: i32,
    /// Pressure in Pa
    pub pressure_pa: i32,
}

/// BMP085 on an I2C bus
#[derive(Debug)]
pub struct Bmp085<B, D> {
    bus: B,
    delay: D,
    oversampling: Oversampling,
    calibration: Calibration,
}

impl<B: I2cBus, D: DelayNs> Bmp085<B, D> {
    /// Check the chip id and load the calibration
    pub fn new(mut bus: B, delay: D, oversampling: Oversampling) -> Result<Self, SensorError> {
        let id = bus.read_register(ADDRESS, reg::CHIP_ID)?;
        if id != CHIP_ID {
            return Err(SensorError::UnexpectedChipId {
                expected: CHIP_ID,
                found: id,
            });
        }

        let mut raw = [0u8; CALIBRATION_LEN];
        bus.write_read(ADDRESS, &[reg::CALIBRATION], &mut raw)?;
        let calibration = Calibration::from_bytes(&raw)?;
        debug!("bmp085: calibration {calibration:?}");

        Ok(Self {
            bus,
            delay,
            oversampling,
            calibration,
        })
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn oversampling(&self) -> Oversampling {
        self.oversampling
    }

    pub fn set_oversampling(&mut self, oversampling: Oversampling) {
        self.oversampling = oversampling;
    }

    pub fn release(self) -> B {
        self.bus
    }

    /// Uncompensated temperature (UT)
    pub fn read_raw_temperature(&mut self) -> Result<i32, SensorError> {
        self.bus
            .write_register(ADDRESS, reg::CONTROL, cmd::TEMPERATURE)?;
        self.delay.delay_us(TEMPERATURE_CONVERSION_US);
        let mut data = [0u8; 2];
        self.bus.write_read(ADDRESS, &[reg::DATA], &mut data)?;
        Ok(i32::from(u16::from_be_bytes(data)))
    }

    /// Uncompensated pressure (UP)
    pub fn read_raw_pressure(&mut self) -> Result<i32, SensorError> {
        let oss = self.oversampling.value();
        self.bus
            .write_register(ADDRESS, reg::CONTROL, cmd::PRESSURE + (oss << 6))?;
        self.delay.delay_us(self.oversampling.conversion_time_us());
        let mut data = [0u8; 3];
        self.bus.write_read(ADDRESS, &[reg::DATA], &mut data)?;
        let raw = i32::from(data[0]) << 16 | i32::from(data[1]) << 8 | i32::from(data[2]);
        Ok(raw >> (8 - oss))
    }

    /// Temperature in 0.1 °C
    pub fn read_temperature(&mut self) -> Result<i32, SensorError> {
        let ut = self.read_raw_temperature()?;
        Ok(self.calibration.temperature_x10(ut))
    }

    /// Temperature and pressure; pressure needs a fresh temperature anyway
    pub fn read(&mut self) -> Result<Bmp085Reading, SensorError> {
        let ut = self.read_raw_temperature()?;
        let up = self.read_raw_pressure()?;
        Ok(Bmp085Reading {
            temperature_c_x10: self.calibration.temperature_x10(ut),
            pressure_pa: self.calibration.pressure_pa(ut, up, self.oversampling),
        })
    }
}
