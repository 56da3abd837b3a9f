//! DHT11/DHT22 temperature and humidity sensor driver
//!
//! The sensor talks over a single open-drain line. The host wakes it by
//! holding the line low, then releases it; the sensor acknowledges with a
//! low/high pulse pair and sends 40 bits. Every bit starts with a ~50 µs low
//! phase; the length of the following high phase carries the value (~26 µs
//! for 0, ~70 µs for 1).
//!
//! The frame is 5 bytes, most significant bit first:
//!
//! | Byte | DHT11 | DHT22 |
//! |------|-------|-------|
//! | 0-1 | humidity, integer part | humidity × 10 |
//! | 2-3 | temperature, integer part | temperature × 10, bit 15 = sign |
//! | 4 | checksum | checksum |
//!
//! Readings are best effort: timing on a non-realtime OS occasionally
//! misses a pulse, so [`Dht::read`] retries.

use std::time::Duration;

use embedded_hal::delay::DelayNs;
use log::{debug, warn};
use raspio_hal::{BidirectionalPin, Clock, InputBinaryPin, OutputBinaryPin};

use crate::error::DhtError;

/// Attempts made by [`Dht::read`] before giving up
pub const MAX_ATTEMPTS: u32 = 10;

/// High phases longer than this are 1 bits
pub const BIT_THRESHOLD: Duration = Duration::from_micros(48);

/// Longest wait for any single edge
pub const EDGE_TIMEOUT: Duration = Duration::from_millis(100);

const FRAME_BITS: usize = 40;

/// Sensor variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DhtModel {
    Dht11,
    #[default]
    Dht22,
}

impl DhtModel {
    /// How long the host holds the line low to wake the sensor
    pub const fn wakeup_interval(self) -> Duration {
        match self {
            DhtModel::Dht11 => Duration::from_millis(18),
            DhtModel::Dht22 => Duration::from_millis(1),
        }
    }

    /// Minimum time between two readings
    pub const fn sampling_interval(self) -> Duration {
        match self {
            DhtModel::Dht11 => Duration::from_secs(1),
            DhtModel::Dht22 => Duration::from_secs(2),
        }
    }

    /// Humidity and temperature in tenths
    fn decode(self, frame: &DhtFrame) -> (u16, i16) {
        let [b0, b1, b2, b3, _] = frame.0;
        let negative = b2 & 0x80 != 0;
        let (humidity, temperature) = match self {
            DhtModel::Dht11 => (u16::from(b0) * 10, i16::from(b2 & 0x7F) * 10),
            DhtModel::Dht22 => (
                u16::from_be_bytes([b0, b1]),
                i16::from_be_bytes([b2 & 0x7F, b3]),
            ),
        };
        (humidity, if negative { -temperature } else { temperature })
    }
}

/// Raw 40-bit frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DhtFrame(pub [u8; 5]);

impl DhtFrame {
    /// Low byte of the sum of the four data bytes
    pub fn computed_checksum(&self) -> u8 {
        self.0[..4].iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
    }

    pub fn validate(&self) -> Result<(), DhtError> {
        let expected = self.0[4];
        let computed = self.computed_checksum();
        if expected == computed {
            Ok(())
        } else {
            Err(DhtError::InvalidChecksum { expected, computed })
        }
    }
}

/// Decoded measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhtReading {
    /// Relative humidity in 0.1 % steps
    pub relative_humidity_x10: u16,
    /// Temperature in 0.1 °C steps
    pub temperature_c_x10: i16,
    /// Attempts it took, including the successful one
    pub attempts: u32,
}

impl DhtReading {
    pub fn relative_humidity(&self) -> f32 {
        f32::from(self.relative_humidity_x10) / 10.0
    }

    pub fn temperature_c(&self) -> f32 {
        f32::from(self.temperature_c_x10) / 10.0
    }
}

/// DHT sensor on one bidirectional line
#[derive(Debug)]
pub struct Dht<P, C, D> {
    pin: P,
    clock: C,
    delay: D,
    model: DhtModel,
    last_read: Option<Duration>,
}

impl<P, C, D> Dht<P, C, D>
where
    P: BidirectionalPin,
    C: Clock,
    D: DelayNs,
{
    pub fn new(pin: P, clock: C, delay: D, model: DhtModel) -> Self {
        Self {
            pin,
            clock,
            delay,
            model,
            last_read: None,
        }
    }

    pub fn model(&self) -> DhtModel {
        self.model
    }

    pub fn release(self) -> P {
        self.pin
    }

    /// Read the sensor, retrying failed attempts
    ///
    /// Each attempt first waits out what remains of the sampling interval.
    /// When every attempt fails the last error is returned.
    pub fn read(&mut self) -> Result<DhtReading, DhtError> {
        let mut attempts = 1;
        loop {
            self.wait_sampling_interval();
            match self.read_frame() {
                Ok(frame) => {
                    let (relative_humidity_x10, temperature_c_x10) = self.model.decode(&frame);
                    debug!(
                        "dht: {frame:02x?} after {attempts} attempt(s)",
                        frame = frame.0
                    );
                    return Ok(DhtReading {
                        relative_humidity_x10,
                        temperature_c_x10,
                        attempts,
                    });
                }
                Err(e) if attempts < MAX_ATTEMPTS => {
                    warn!("dht: attempt {attempts}/{MAX_ATTEMPTS} failed: {e}");
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn wait_sampling_interval(&mut self) {
        let Some(last) = self.last_read else {
            return;
        };
        let elapsed = self.clock.now().saturating_sub(last);
        let remaining = self.model.sampling_interval().saturating_sub(elapsed);
        if !remaining.is_zero() {
            self.delay.delay_us(remaining.as_micros() as u32);
        }
    }

    /// Run one wake/acknowledge/transfer cycle
    pub fn read_frame(&mut self) -> Result<DhtFrame, DhtError> {
        let result = self.transfer();
        self.last_read = Some(self.clock.now());
        let frame = result?;
        frame.validate()?;
        Ok(frame)
    }

    fn transfer(&mut self) -> Result<DhtFrame, DhtError> {
        // Wake
        self.pin.as_output()?;
        self.pin.write(false)?;
        self.delay
            .delay_us(self.model.wakeup_interval().as_micros() as u32);
        self.pin.write(true)?;
        self.pin.as_input()?;

        // Acknowledge: low, high, then the first bit's low phase
        self.pin.wait(false, Some(EDGE_TIMEOUT))?;
        self.pin.wait(true, Some(EDGE_TIMEOUT))?;
        self.pin.wait(false, Some(EDGE_TIMEOUT))?;

        let mut frame = DhtFrame::default();
        for bit in 0..FRAME_BITS {
            self.pin.wait(true, Some(EDGE_TIMEOUT))?;
            let rose = self.clock.now();
            self.pin.wait(false, Some(EDGE_TIMEOUT))?;
            if self.clock.now().saturating_sub(rose) > BIT_THRESHOLD {
                frame.0[bit / 8] |= 0x80 >> (bit % 8);
            }
        }
        Ok(frame)
    }
}
