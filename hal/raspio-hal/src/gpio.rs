//! GPIO pin abstractions
//!
//! Provides the per-pin vocabulary (direction, pull resistor, detected
//! edges) and traits for single digital pins that device drivers are
//! written against.

use core::fmt;
use core::time::Duration;

use crate::error::GpioError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Timeout used when a wait is requested without one
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shortest timeout a wait will honour
pub const MIN_WAIT_TIMEOUT: Duration = Duration::from_millis(1);

/// Resolve a caller-supplied wait timeout
///
/// `None` and zero select [`DEFAULT_WAIT_TIMEOUT`]; anything shorter than
/// [`MIN_WAIT_TIMEOUT`] is raised to it.
pub fn effective_timeout(timeout: Option<Duration>) -> Duration {
    match timeout {
        None => DEFAULT_WAIT_TIMEOUT,
        Some(t) if t.is_zero() => DEFAULT_WAIT_TIMEOUT,
        Some(t) => t.max(MIN_WAIT_TIMEOUT),
    }
}

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PinDirection {
    Input,
    Output,
}

impl fmt::Display for PinDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinDirection::Input => f.write_str("input"),
            PinDirection::Output => f.write_str("output"),
        }
    }
}

/// Internal pull resistor of an input pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PinResistor {
    /// Floating input
    #[default]
    None,
    /// Weak pull to ground
    PullDown,
    /// Weak pull to supply
    PullUp,
}

/// Edges reported by the edge detection plumbing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PinDetectedEdges {
    #[default]
    None,
    Rising,
    Falling,
    Both,
}

impl PinDetectedEdges {
    /// Value understood by the `edge` pseudo-file
    pub fn as_sysfs_str(self) -> &'static str {
        match self {
            PinDetectedEdges::None => "none",
            PinDetectedEdges::Rising => "rising",
            PinDetectedEdges::Falling => "falling",
            PinDetectedEdges::Both => "both",
        }
    }
}

/// Digital output pin
///
/// Implementations hold an allocated output line and drive it directly,
/// without any logical inversion.
pub trait OutputBinaryPin {
    /// Drive the pin high (`true`) or low (`false`)
    fn write(&mut self, state: bool) -> Result<(), GpioError>;

    /// Drive the pin high
    fn set_high(&mut self) -> Result<(), GpioError> {
        self.write(true)
    }

    /// Drive the pin low
    fn set_low(&mut self) -> Result<(), GpioError> {
        self.write(false)
    }
}

/// Digital input pin
pub trait InputBinaryPin {
    /// Read the electrical state of the pin
    fn read(&mut self) -> Result<bool, GpioError>;

    /// Block until the pin reads `state`
    ///
    /// See [`effective_timeout`] for how `timeout` is interpreted. Fails
    /// with [`GpioError::Timeout`] when the deadline passes.
    fn wait(&mut self, state: bool, timeout: Option<Duration>) -> Result<(), GpioError>;
}

/// Pin that switches between input and output at runtime
///
/// Single-wire protocols (DHT sensors, open-drain emulation) need to drive
/// a line and then listen on it.
pub trait BidirectionalPin: InputBinaryPin + OutputBinaryPin {
    /// Switch the pin to input mode
    fn as_input(&mut self) -> Result<(), GpioError>;

    /// Switch the pin to output mode
    fn as_output(&mut self) -> Result<(), GpioError>;
}

impl<P: OutputBinaryPin + ?Sized> OutputBinaryPin for &mut P {
    fn write(&mut self, state: bool) -> Result<(), GpioError> {
        (**self).write(state)
    }
}

impl<P: InputBinaryPin + ?Sized> InputBinaryPin for &mut P {
    fn read(&mut self) -> Result<bool, GpioError> {
        (**self).read()
    }

    fn wait(&mut self, state: bool, timeout: Option<Duration>) -> Result<(), GpioError> {
        (**self).wait(state, timeout)
    }
}

impl<P: BidirectionalPin + ?Sized> BidirectionalPin for &mut P {
    fn as_input(&mut self) -> Result<(), GpioError> {
        (**self).as_input()
    }

    fn as_output(&mut self) -> Result<(), GpioError> {
        (**self).as_output()
    }
}
