//! Board-agnostic pin connection layer
//!
//! This crate contains everything that sits on top of a [`GpioDriver`]
//! without depending on a specific implementation:
//!
//! - Declarative pin configurations (role, polarity, name, callback)
//! - [`GpioConnection`]: a set of configured pins with periodic input
//!   polling and change notification
//! - Periodic timers driving the poll cycle
//! - Binary pins owning a single allocated pin
//! - A blocking delay and an in-memory driver for tests and dry runs
//! - Serializable configuration types
//!
//! [`GpioDriver`]: raspio_hal::GpioDriver

#![deny(unsafe_code)]

pub mod config;
pub mod configuration;
pub mod connection;
pub mod delay;
pub mod error;
pub mod mock;
pub mod pins;
pub mod settings;
pub mod timer;

pub use configuration::{
    InputPinConfiguration, OutputPinConfiguration, PinCallback, PinCommon, PinConfiguration,
    SwitchInputPinConfiguration,
};
pub use connection::{GpioConnection, ObserverId, PinChange, PinObserver, PinSelector};
pub use delay::StdDelay;
pub use error::ConnectionError;
pub use mock::MockDriver;
pub use pins::{GpioInputBinaryPin, GpioInputOutputBinaryPin, GpioOutputBinaryPin};
pub use settings::GpioConnectionSettings;
pub use timer::{HighResolutionTimer, PeriodicTimer, StandardTimer, TimerKind};
