//! Bus and device drivers
//!
//! This crate provides drivers built on the raspio traits:
//!
//! - Software SPI and I2C masters over plain GPIO pins
//! - DHT11/DHT22 temperature and humidity sensors
//! - BMP085 and BMP280 pressure sensors
//! - MCP23017 16-bit I/O expander
//!
//! Drivers are generic over the pin and bus traits of `raspio-hal`, so the
//! same code runs on the register drivers, on the pseudo-filesystem driver
//! and on the in-memory driver of `raspio-core`.

#![deny(unsafe_code)]

pub mod bitbang;
pub mod error;
pub mod expander;
pub mod sensor;

#[cfg(test)]
pub(crate) mod testing;

pub use bitbang::{I2cBitBang, SlaveSelect, SpiConnection};
pub use error::{BitBangError, DhtError, SensorError};
pub use expander::mcp23017::Mcp23017;
pub use sensor::bmp085::Bmp085;
pub use sensor::bmp280::Bmp280;
pub use sensor::dht::{Dht, DhtModel, DhtReading};
