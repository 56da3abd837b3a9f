//! Pin allocation drivers
//!
//! A [`GpioDriver`] owns the hardware access path (registers, pseudo-files)
//! and exposes raw pin operations. Drivers are stateless with respect to
//! connections: they only track which pins they have allocated.

use core::fmt;
use core::ops::{BitAnd, BitOr};
use core::time::Duration;

use crate::error::GpioError;
use crate::gpio::{PinDetectedEdges, PinDirection, PinResistor};
use crate::pin::{ProcessorPin, ProcessorPins};

/// Capability flags advertised by a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DriverCapabilities(u8);

impl DriverCapabilities {
    pub const NONE: Self = Self(0);
    /// Pull resistors can be configured
    pub const CAN_SET_PIN_RESISTOR: Self = Self(1 << 0);
    /// Edge detection is available, so waits block in the kernel
    pub const CAN_SET_PIN_DETECTED_EDGES: Self = Self(1 << 1);
    /// Direction changes take effect without kernel round trips
    pub const CAN_CHANGE_PIN_DIRECTION_RAPIDLY: Self = Self(1 << 2);
    /// Works on boards other than a Raspberry Pi
    pub const CAN_WORK_ON_THIRD_PARTY_COMPUTERS: Self = Self(1 << 3);

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Flags present in either set
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Check that every flag of `other` is present
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Number of flags set, used to rank drivers
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }
}

impl BitOr for DriverCapabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for DriverCapabilities {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for DriverCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(DriverCapabilities, &str); 4] = [
            (DriverCapabilities::CAN_SET_PIN_RESISTOR, "resistor"),
            (DriverCapabilities::CAN_SET_PIN_DETECTED_EDGES, "edges"),
            (
                DriverCapabilities::CAN_CHANGE_PIN_DIRECTION_RAPIDLY,
                "rapid-direction",
            ),
            (
                DriverCapabilities::CAN_WORK_ON_THIRD_PARTY_COMPUTERS,
                "third-party",
            ),
        ];

        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("none")?;
        }
        Ok(())
    }
}

/// Raw pin access through one hardware path
///
/// All methods take `&self`; implementations serialize access to their
/// own pin registry so a driver can be shared between a connection, its
/// poll thread and stand-alone binary pins.
pub trait GpioDriver: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Capabilities of this driver
    fn capabilities(&self) -> DriverCapabilities;

    /// Allocate a pin in the given direction
    ///
    /// Inputs are reset to [`PinResistor::None`]. Allocating an already
    /// allocated pin switches its direction.
    fn allocate(&self, pin: ProcessorPin, direction: PinDirection) -> Result<(), GpioError>;

    /// Configure the pull resistor of an input pin
    fn set_pin_resistor(&self, pin: ProcessorPin, resistor: PinResistor) -> Result<(), GpioError>;

    /// Configure which edges wake up [`GpioDriver::wait`]
    fn set_pin_detected_edges(
        &self,
        pin: ProcessorPin,
        edges: PinDetectedEdges,
    ) -> Result<(), GpioError>;

    /// Block until the raw value of `pin` equals `state`
    ///
    /// # Arguments
    /// * `pin` - Allocated input pin
    /// * `state` - Expected raw value
    /// * `timeout` - Deadline, resolved with [`crate::gpio::effective_timeout`]
    fn wait(&self, pin: ProcessorPin, state: bool, timeout: Option<Duration>)
        -> Result<(), GpioError>;

    /// Drive an output pin
    fn write(&self, pin: ProcessorPin, value: bool) -> Result<(), GpioError>;

    /// Read the raw value of a pin
    fn read(&self, pin: ProcessorPin) -> Result<bool, GpioError>;

    /// Read several pins at once
    ///
    /// Returns the subset of `pins` that read high.
    fn read_pins(&self, pins: ProcessorPins) -> Result<ProcessorPins, GpioError>;

    /// Return a pin to its unallocated state
    fn release(&self, pin: ProcessorPin) -> Result<(), GpioError>;
}

impl<D: GpioDriver + ?Sized> GpioDriver for std::sync::Arc<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn capabilities(&self) -> DriverCapabilities {
        (**self).capabilities()
    }

    fn allocate(&self, pin: ProcessorPin, direction: PinDirection) -> Result<(), GpioError> {
        (**self).allocate(pin, direction)
    }

    fn set_pin_resistor(&self, pin: ProcessorPin, resistor: PinResistor) -> Result<(), GpioError> {
        (**self).set_pin_resistor(pin, resistor)
    }

    fn set_pin_detected_edges(
        &self,
        pin: ProcessorPin,
        edges: PinDetectedEdges,
    ) -> Result<(), GpioError> {
        (**self).set_pin_detected_edges(pin, edges)
    }

    fn wait(
        &self,
        pin: ProcessorPin,
        state: bool,
        timeout: Option<Duration>,
    ) -> Result<(), GpioError> {
        (**self).wait(pin, state, timeout)
    }

    fn write(&self, pin: ProcessorPin, value: bool) -> Result<(), GpioError> {
        (**self).write(pin, value)
    }

    fn read(&self, pin: ProcessorPin) -> Result<bool, GpioError> {
        (**self).read(pin)
    }

    fn read_pins(&self, pins: ProcessorPins) -> Result<ProcessorPins, GpioError> {
        (**self).read_pins(pins)
    }

    fn release(&self, pin: ProcessorPin) -> Result<(), GpioError> {
        (**self).release(pin)
    }
}
