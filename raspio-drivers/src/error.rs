//! Driver errors

use raspio_hal::{BusError, GpioError};
use thiserror::Error;

/// Errors raised by the software bus masters
#[derive(Debug, Error)]
pub enum BitBangError {
    /// More bits requested than the value holds
    #[error("cannot shift {requested} bits through a {width}-bit value")]
    BitCountOutOfRange { requested: u32, width: u32 },

    /// Read attempted on a connection without a data input pin
    #[error("no data input pin configured")]
    NoDataInput,

    /// Write attempted on a connection without a data output pin
    #[error("no data output pin configured")]
    NoDataOutput,

    #[error(transparent)]
    Gpio(#[from] GpioError),
}

impl From<BitBangError> for BusError {
    fn from(error: BitBangError) -> Self {
        match error {
            BitBangError::Gpio(e) => BusError::Gpio(e),
            BitBangError::NoDataInput => BusError::Gpio(GpioError::Unsupported {
                driver: "bit-banged SPI",
                operation: "reading without a data input pin",
            }),
            BitBangError::NoDataOutput => BusError::Gpio(GpioError::Unsupported {
                driver: "bit-banged SPI",
                operation: "writing without a data output pin",
            }),
            BitBangError::BitCountOutOfRange { .. } => BusError::Gpio(GpioError::Unsupported {
                driver: "bit-banged SPI",
                operation: "transfers wider than the value",
            }),
        }
    }
}

/// Errors raised by the DHT driver
#[derive(Debug, Error)]
pub enum DhtError {
    /// Frame received but its checksum does not match
    #[error("invalid checksum: frame carries {expected:#04x}, data sums to {computed:#04x}")]
    InvalidChecksum { expected: u8, computed: u8 },

    /// Line access failed or a pulse did not come in time
    #[error(transparent)]
    Gpio(#[from] GpioError),
}

impl DhtError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DhtError::Gpio(e) if e.is_timeout())
    }
}

/// Errors raised by register-based sensor and expander drivers
#[derive(Debug, Error)]
pub enum SensorError {
    /// Device answered with an unexpected identification
    #[error("unexpected chip id {found:#04x} (expected {expected:#04x})")]
    UnexpectedChipId { expected: u8, found: u8 },

    /// Calibration memory holds no usable data
    #[error("calibration data is invalid")]
    InvalidCalibration,

    /// Device did not finish a measurement in time
    #[error("measurement did not complete")]
    MeasurementTimeout,

    /// Pin number outside the device range
    #[error("pin {0} is out of range")]
    InvalidPin(u8),

    #[error(transparent)]
    Bus(#[from] BusError),
}
