//! Pseudo-filesystem driver

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::debug;
use raspio_hal::{
    DriverCapabilities, GpioDriver, GpioError, PinDetectedEdges, PinDirection, PinResistor,
    ProcessorPin, ProcessorPins,
};

use crate::registry::PinRegistry;
use crate::sysfs::SysfsGpio;

use super::busy_wait;

/// Driver using only `/sys/class/gpio`
///
/// Slow, but works on any board whose kernel exposes the GPIO class.
#[derive(Debug)]
pub struct SysfsGpioDriver {
    sysfs: SysfsGpio,
    registry: Mutex<PinRegistry>,
}

impl Default for SysfsGpioDriver {
    fn default() -> Self {
        Self::new(SysfsGpio::default())
    }
}

impl SysfsGpioDriver {
    pub const CAPABILITIES: DriverCapabilities =
        DriverCapabilities::CAN_WORK_ON_THIRD_PARTY_COMPUTERS;

    pub fn new(sysfs: SysfsGpio) -> Self {
        Self {
            sysfs,
            registry: Mutex::new(PinRegistry::new()),
        }
    }

    /// Use the default root, failing when it does not exist
    pub fn open() -> Result<Self, GpioError> {
        let driver = Self::default();
        let root = driver.sysfs.root();
        if !root.is_dir() {
            return Err(GpioError::file(
                root,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        Ok(driver)
    }

    fn registry(&self) -> MutexGuard<'_, PinRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unsupported(&self, operation: &'static str) -> GpioError {
        GpioError::Unsupported {
            driver: self.name(),
            operation,
        }
    }
}

impl GpioDriver for SysfsGpioDriver {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn capabilities(&self) -> DriverCapabilities {
        Self::CAPABILITIES
    }

    fn allocate(&self, pin: ProcessorPin, direction: PinDirection) -> Result<(), GpioError> {
        let mut registry = self.registry();
        self.sysfs.export(pin)?;
        self.sysfs.set_direction(pin, direction)?;
        registry.allocate(pin, direction)?;
        debug!("{} allocated {pin} as {direction}", self.name());
        Ok(())
    }

    fn set_pin_resistor(&self, _pin: ProcessorPin, _resistor: PinResistor) -> Result<(), GpioError> {
        Err(self.unsupported("pull resistors"))
    }

    fn set_pin_detected_edges(
        &self,
        _pin: ProcessorPin,
        _edges: PinDetectedEdges,
    ) -> Result<(), GpioError> {
        Err(self.unsupported("edge detection"))
    }

    fn wait(
        &self,
        pin: ProcessorPin,
        state: bool,
        timeout: Option<Duration>,
    ) -> Result<(), GpioError> {
        busy_wait(pin, state, timeout, || self.sysfs.read_value(pin))
    }

    fn write(&self, pin: ProcessorPin, value: bool) -> Result<(), GpioError> {
        self.registry().check_output(pin)?;
        self.sysfs.write_value(pin, value)
    }

    fn read(&self, pin: ProcessorPin) -> Result<bool, GpioError> {
        self.sysfs.read_value(pin)
    }

    fn read_pins(&self, pins: ProcessorPins) -> Result<ProcessorPins, GpioError> {
        let mut high = ProcessorPins::NONE;
        for pin in pins.iter() {
            if self.sysfs.read_value(pin)? {
                high.insert(pin);
            }
        }
        Ok(high)
    }

    fn release(&self, pin: ProcessorPin) -> Result<(), GpioError> {
        if self.registry().release(pin).is_some() {
            self.sysfs.unexport(pin)?;
            debug!("{} released {pin}", self.name());
        }
        Ok(())
    }
}
