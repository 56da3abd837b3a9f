//! Connection errors

use std::io;

use raspio_hal::{GpioError, ProcessorPin};
use thiserror::Error;

/// Errors raised by [`GpioConnection`](crate::GpioConnection)
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Pin is already part of the connection
    #[error("{0} is already part of the connection")]
    DuplicatePin(ProcessorPin),

    /// Another pin already uses this name
    #[error("a pin named '{0}' is already part of the connection")]
    DuplicateName(String),

    /// Selector does not match any configured pin
    #[error("no pin matching {0} in the connection")]
    PinNotFound(String),

    /// Operation does not apply to the pin's direction
    #[error("cannot {operation} {pin}: it is configured as an input")]
    InvalidOperation {
        pin: ProcessorPin,
        operation: &'static str,
    },

    /// Poll timer thread could not be started
    #[error("failed to start the poll timer: {0}")]
    Timer(#[source] io::Error),

    #[error(transparent)]
    Gpio(#[from] GpioError),
}
