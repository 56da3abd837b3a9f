//! Sensor drivers

pub mod bmp085;
pub mod bmp280;
pub mod dht;
