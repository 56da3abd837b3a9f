//! Software bus masters
//!
//! Both masters toggle GPIO pins directly and pace the clock with a
//! [`DelayNs`](embedded_hal::delay::DelayNs) implementation. Throughput is
//! bounded by the pin driver: register drivers reach a few hundred kHz, the
//! pseudo-filesystem driver a few kHz.

pub mod i2c;
pub mod spi;

pub use i2c::I2cBitBang;
pub use spi::{SlaveSelect, SpiConnection};
