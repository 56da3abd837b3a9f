//! BCM283x-specific HAL for raspio
//!
//! This crate provides Raspberry Pi implementations of the shared
//! `raspio-hal` traits:
//!
//! - Memory-mapped register access with duplicated reads and writes
//! - Per-driver pin registry
//! - Pin drivers: registers with epoll edge detection, registers only,
//!   and the GPIO pseudo-filesystem, plus capability-based selection
//! - Board identification from `/proc/cpuinfo`
//! - I2C master on the BSC peripheral
//! - SPI through `spidev`
//!
//! # Example
//!
//! ```rust,ignore
//! use raspio_hal::{DriverCapabilities, PinDirection, ProcessorPin};
//! use raspio_hal_bcm::select_driver;
//!
//! let driver = select_driver(DriverCapabilities::CAN_SET_PIN_RESISTOR)?;
//! driver.allocate(ProcessorPin::P17, PinDirection::Output)?;
//! driver.write(ProcessorPin::P17, true)?;
//! ```

pub mod board;
pub mod driver;
pub mod edge;
pub mod gpio;
pub mod i2c;
pub mod memory;
pub mod registers;
pub mod registry;
pub mod spidev;
pub mod sysfs;

#[cfg(test)]
pub(crate) mod testing;

pub use board::{Board, Processor};
pub use driver::{
    open_driver, select_driver, BcmGpioDriver, DriverKind, MemoryGpioDriver, SysfsGpioDriver,
};
pub use i2c::{BscBus, BscI2c};
pub use memory::{MemoryMap, RegisterBackend, Registers};
pub use spidev::SpiDevice;
