//! raspio Hardware Abstraction Layer
//!
//! This crate defines the pin vocabulary and the hardware abstraction traits
//! shared by every other raspio crate. Chip-specific crates implement the
//! traits; the connection layer and the device drivers only consume them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  raspio-cli, raspio-drivers             │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  raspio-core (connection, binary pins)  │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  raspio-hal (this crate - traits)       │
//! └─────────────────────────────────────────┘
//!                     ▲
//!                     │
//!            ┌────────┴────────┐
//!            │ raspio-hal-bcm  │
//!            └─────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`driver::GpioDriver`] - Pin allocation and raw pin I/O
//! - [`gpio::InputBinaryPin`], [`gpio::OutputBinaryPin`],
//!   [`gpio::BidirectionalPin`] - Single pin access
//! - [`i2c::I2cBus`] - I2C bus operations
//! - [`spi::SpiBus`] - SPI bus operations
//! - [`time::Clock`] - Monotonic time source

#![deny(unsafe_code)]

pub mod driver;
pub mod error;
pub mod gpio;
pub mod i2c;
pub mod pin;
pub mod spi;
pub mod time;

// Re-export key types at crate root for convenience
pub use driver::{DriverCapabilities, GpioDriver};
pub use error::{BusError, GpioError};
pub use gpio::{
    BidirectionalPin, InputBinaryPin, OutputBinaryPin, PinDetectedEdges, PinDirection,
    PinResistor,
};
pub use i2c::{I2cAction, I2cBus, I2cTransaction};
pub use pin::{ConnectorPin, Header, Pinout, ProcessorPin, ProcessorPins};
pub use spi::{Endianness, SpiBus};
pub use time::{Clock, SystemClock};
