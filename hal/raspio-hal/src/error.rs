//! Error types shared by drivers and buses

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::pin::{ConnectorPin, Pinout, ProcessorPin};

/// Errors raised by pin drivers and binary pins
#[derive(Debug, Error)]
pub enum GpioError {
    /// Line number outside the processor range
    #[error("GPIO line {0} is out of range (0-63)")]
    InvalidPin(u8),

    /// Connector pin name could not be parsed
    #[error("invalid connector pin '{0}'")]
    InvalidConnectorPin(String),

    /// Pinout name could not be parsed
    #[error("invalid pinout '{0}'")]
    InvalidPinout(String),

    /// Connector pin has no processor pin on this pinout
    #[error("connector pin {pin} is not wired to a GPIO on the {pinout:?} pinout")]
    UnmappedConnectorPin { pin: ConnectorPin, pinout: Pinout },

    /// Processor pin is not wired to any connector pin on this pinout
    #[error("{pin} is not available on the {pinout:?} pinout")]
    UnmappedProcessorPin { pin: ProcessorPin, pinout: Pinout },

    /// Waiting for a pin state ran out of time
    #[error("timed out after {timeout:?} waiting for {pin} to be {}", level_name(.expected))]
    Timeout {
        pin: ProcessorPin,
        expected: bool,
        timeout: Duration,
    },

    /// Operation needs a capability the driver lacks
    #[error("{operation} is not supported by the {driver} driver")]
    Unsupported {
        driver: &'static str,
        operation: &'static str,
    },

    /// Pin has not been allocated by this driver
    #[error("{0} is not allocated")]
    NotAllocated(ProcessorPin),

    /// Pin handle was released and can no longer be used
    #[error("{0} has been released")]
    Disposed(ProcessorPin),

    /// Direction-dependent operation on a pin in the other direction
    #[error("{pin} is not configured as {expected}")]
    WrongDirection {
        pin: ProcessorPin,
        expected: &'static str,
    },

    /// No driver satisfies the requested capabilities
    #[error("no GPIO driver satisfies the required capabilities ({0})")]
    NoSuitableDriver(String),

    /// Mapping physical memory failed
    #[error("mapping {size} bytes at {address:#010x} failed: {source}")]
    MapFailed {
        address: u64,
        size: usize,
        source: io::Error,
    },

    /// Unmapping physical memory failed
    #[error("unmapping {size} bytes failed: {source}")]
    UnmapFailed { size: usize, source: io::Error },

    /// Pseudo-file access failed
    #[error("I/O error on {}: {source}", .path.display())]
    File { path: PathBuf, source: io::Error },

    /// System call failed
    #[error("{call} failed: {source}")]
    Os {
        call: &'static str,
        source: io::Error,
    },
}

fn level_name(high: &bool) -> &'static str {
    if *high {
        "high"
    } else {
        "low"
    }
}

impl GpioError {
    /// Wrap an I/O error together with the file it came from
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        GpioError::File {
            path: path.into(),
            source,
        }
    }

    /// Capture `errno` after a failed system call
    pub fn last_os_error(call: &'static str) -> Self {
        GpioError::Os {
            call,
            source: io::Error::last_os_error(),
        }
    }

    /// Check if this error is a wait timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, GpioError::Timeout { .. })
    }
}

impl embedded_hal::digital::Error for GpioError {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

/// Errors raised by I2C and SPI buses
#[derive(Debug, Error)]
pub enum BusError {
    /// Device did not acknowledge
    #[error("device {address:#04x} did not acknowledge (NACK)")]
    Nack { address: u8 },

    /// Slave held the clock line longer than allowed
    #[error("clock stretch timeout talking to device {address:#04x}")]
    ClockStretchTimeout { address: u8 },

    /// Transfer ended before all bytes were moved
    #[error("incomplete transfer with device {address:#04x}: {remaining} bytes remaining")]
    IncompleteData { address: u8, remaining: usize },

    /// Address outside the 7-bit range
    #[error("invalid I2C address {0:#04x}")]
    InvalidAddress(u8),

    /// Transaction has more actions than supported
    #[error("transaction exceeds {0} actions")]
    TransactionTooLong(usize),

    /// Read and write buffers of a transfer differ in length
    #[error("transfer buffers differ in length ({read} != {write})")]
    LengthMismatch { read: usize, write: usize },

    /// Bus I/O failed in the operating system
    #[error("{operation} failed: {source}")]
    Io {
        operation: &'static str,
        source: io::Error,
    },

    /// Underlying pin failed (bit-banged buses, GPIO setup)
    #[error(transparent)]
    Gpio(#[from] GpioError),
}

impl embedded_hal::i2c::Error for BusError {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
        match self {
            BusError::Nack { .. } => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            BusError::ClockStretchTimeout { .. } => ErrorKind::Bus,
            _ => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = GpioError::Timeout {
            pin: ProcessorPin::P17,
            expected: true,
            timeout: Duration::from_millis(10),
        };
        assert!(err.is_timeout());
        assert_eq!(
            err.to_string(),
            "timed out after 10ms waiting for GPIO17 to be high"
        );
    }

    #[test]
    fn test_bus_error_wraps_gpio() {
        let err: BusError = GpioError::Disposed(ProcessorPin::P2).into();
        assert_eq!(err.to_string(), "GPIO2 has been released");
    }
}
