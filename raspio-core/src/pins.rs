//! Binary pins over a driver
//!
//! Each pin allocates its processor pin when created and releases it when
//! dropped or explicitly released. A released pin fails every further call
//! with [`GpioError::Disposed`].
//!
//! The pins implement both the raspio binary pin traits and the
//! `embedded-hal` digital traits, so they can be handed to bus and sensor
//! drivers written against either.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use log::warn;
use raspio_hal::{
    BidirectionalPin, GpioDriver, GpioError, InputBinaryPin, OutputBinaryPin, PinDirection,
    PinResistor, ProcessorPin,
};

/// Allocation shared by the three pin kinds
struct PinHandle {
    driver: Arc<dyn GpioDriver>,
    pin: ProcessorPin,
    released: bool,
}

impl PinHandle {
    fn check(&self) -> Result<&dyn GpioDriver, GpioError> {
        if self.released {
            Err(GpioError::Disposed(self.pin))
        } else {
            Ok(self.driver.as_ref())
        }
    }

    fn release(&mut self) -> Result<(), GpioError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.driver.release(self.pin)
    }
}

impl fmt::Debug for PinHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinHandle")
            .field("driver", &self.driver.name())
            .field("pin", &self.pin)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for PinHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("releasing {}: {e}", self.pin);
        }
    }
}

fn allocate_input(
    driver: &dyn GpioDriver,
    pin: ProcessorPin,
    resistor: PinResistor,
) -> Result<(), GpioError> {
    driver.allocate(pin, PinDirection::Input)?;
    if resistor != PinResistor::None {
        if let Err(e) = driver.set_pin_resistor(pin, resistor) {
            let _ = driver.release(pin);
            return Err(e);
        }
    }
    Ok(())
}

/// Pin allocated as an output
#[derive(Debug)]
pub struct GpioOutputBinaryPin {
    handle: PinHandle,
}

impl GpioOutputBinaryPin {
    pub fn new(driver: Arc<dyn GpioDriver>, pin: ProcessorPin) -> Result<Self, GpioError> {
        driver.allocate(pin, PinDirection::Output)?;
        Ok(Self {
            handle: PinHandle {
                driver,
                pin,
                released: false,
            },
        })
    }

    pub fn pin(&self) -> ProcessorPin {
        self.handle.pin
    }

    /// Give the pin back to the driver; later calls fail
    pub fn release(&mut self) -> Result<(), GpioError> {
        self.handle.release()
    }
}

impl OutputBinaryPin for GpioOutputBinaryPin {
    fn write(&mut self, state: bool) -> Result<(), GpioError> {
        self.handle.check()?.write(self.handle.pin, state)
    }
}

impl ErrorType for GpioOutputBinaryPin {
    type Error = GpioError;
}

impl OutputPin for GpioOutputBinaryPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        OutputBinaryPin::write(self, false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        OutputBinaryPin::write(self, true)
    }
}

/// Pin allocated as an input
#[derive(Debug)]
pub struct GpioInputBinaryPin {
    handle: PinHandle,
}

impl GpioInputBinaryPin {
    pub fn new(
        driver: Arc<dyn GpioDriver>,
        pin: ProcessorPin,
        resistor: PinResistor,
    ) -> Result<Self, GpioError> {
        allocate_input(driver.as_ref(), pin, resistor)?;
        Ok(Self {
            handle: PinHandle {
                driver,
                pin,
                released: false,
            },
        })
    }

    pub fn pin(&self) -> ProcessorPin {
        self.handle.pin
    }

    pub fn release(&mut self) -> Result<(), GpioError> {
        self.handle.release()
    }
}

impl InputBinaryPin for GpioInputBinaryPin {
    fn read(&mut self) -> Result<bool, GpioError> {
        self.handle.check()?.read(self.handle.pin)
    }

    fn wait(&mut self, state: bool, timeout: Option<Duration>) -> Result<(), GpioError> {
        self.handle.check()?.wait(self.handle.pin, state, timeout)
    }
}

impl ErrorType for GpioInputBinaryPin {
    type Error = GpioError;
}

impl InputPin for GpioInputBinaryPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        InputBinaryPin::read(self)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        InputBinaryPin::read(self).map(|high| !high)
    }
}

/// Pin switching direction on demand
///
/// Starts as an input. Reading or waiting switches it to input, writing
/// switches it to output; a switch only reaches the driver when the
/// direction actually changes.
#[derive(Debug)]
pub struct GpioInputOutputBinaryPin {
    handle: PinHandle,
    resistor: PinResistor,
    direction: PinDirection,
}

impl GpioInputOutputBinaryPin {
    pub fn new(
        driver: Arc<dyn GpioDriver>,
        pin: ProcessorPin,
        resistor: PinResistor,
    ) -> Result<Self, GpioError> {
        allocate_input(driver.as_ref(), pin, resistor)?;
        Ok(Self {
            handle: PinHandle {
                driver,
                pin,
                released: false,
            },
            resistor,
            direction: PinDirection::Input,
        })
    }

    pub fn pin(&self) -> ProcessorPin {
        self.handle.pin
    }

    pub fn direction(&self) -> PinDirection {
        self.direction
    }

    pub fn release(&mut self) -> Result<(), GpioError> {
        self.handle.release()
    }
}

impl BidirectionalPin for GpioInputOutputBinaryPin {
    fn as_input(&mut self) -> Result<(), GpioError> {
        let driver = self.handle.check()?;
        if self.direction != PinDirection::Input {
            allocate_input(driver, self.handle.pin, self.resistor)?;
            self.direction = PinDirection::Input;
        }
        Ok(())
    }

    fn as_output(&mut self) -> Result<(), GpioError> {
        let driver = self.handle.check()?;
        if self.direction != PinDirection::Output {
            driver.allocate(self.handle.pin, PinDirection::Output)?;
            self.direction = PinDirection::Output;
        }
        Ok(())
    }
}

impl InputBinaryPin for GpioInputOutputBinaryPin {
    fn read(&mut self) -> Result<bool, GpioError> {
        self.as_input()?;
        self.handle.check()?.read(self.handle.pin)
    }

    fn wait(&mut self, state: bool, timeout: Option<Duration>) -> Result<(), GpioError> {
        self.as_input()?;
        self.handle.check()?.wait(self.handle.pin, state, timeout)
    }
}

impl OutputBinaryPin for GpioInputOutputBinaryPin {
    fn write(&mut self, state: bool) -> Result<(), GpioError> {
        self.as_output()?;
        self.handle.check()?.write(self.handle.pin, state)
    }
}

impl ErrorType for GpioInputOutputBinaryPin {
    type Error = GpioError;
}

impl InputPin for GpioInputOutputBinaryPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        InputBinaryPin::read(self)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        InputBinaryPin::read(self).map(|high| !high)
    }
}

impl OutputPin for GpioInputOutputBinaryPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        OutputBinaryPin::write(self, false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        OutputBinaryPin::write(self, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;
    use raspio_hal::DriverCapabilities;

    #[test]
    fn test_output_pin_lifecycle() {
        let driver = Arc::new(MockDriver::new());
        let mut pin = GpioOutputBinaryPin::new(driver.clone(), ProcessorPin::P18).unwrap();
        assert_eq!(driver.direction(ProcessorPin::P18), Some(PinDirection::Output));

        OutputBinaryPin::write(&mut pin, true).unwrap();
        assert!(driver.level(ProcessorPin::P18));
        OutputPin::set_low(&mut pin).unwrap();
        assert!(!driver.level(ProcessorPin::P18));

        pin.release().unwrap();
        assert_eq!(driver.direction(ProcessorPin::P18), None);
        assert!(matches!(
            OutputBinaryPin::write(&mut pin, true),
            Err(GpioError::Disposed(ProcessorPin::P18))
        ));
        // Releasing twice is harmless
        pin.release().unwrap();
    }

    #[test]
    fn test_drop_releases() {
        let driver = Arc::new(MockDriver::new());
        let pin = GpioInputBinaryPin::new(driver.clone(), ProcessorPin::P17, PinResistor::PullUp)
            .unwrap();
        assert_eq!(driver.resistor(ProcessorPin::P17), Some(PinResistor::PullUp));
        drop(pin);
        assert_eq!(driver.direction(ProcessorPin::P17), None);
    }

    #[test]
    fn test_input_pin_reads_and_waits() {
        let driver = Arc::new(MockDriver::new());
        let mut pin =
            GpioInputBinaryPin::new(driver.clone(), ProcessorPin::P17, PinResistor::None).unwrap();

        assert!(InputPin::is_low(&mut pin).unwrap());
        driver.set_level(ProcessorPin::P17, true);
        assert!(InputBinaryPin::read(&mut pin).unwrap());
        pin.wait(true, Some(Duration::from_millis(10))).unwrap();

        let err = pin.wait(false, Some(Duration::from_millis(10))).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_resistor_failure_releases_pin() {
        let driver = Arc::new(MockDriver::with_capabilities(DriverCapabilities::NONE));
        let result = GpioInputBinaryPin::new(driver.clone(), ProcessorPin::P17, PinResistor::PullUp);
        assert!(matches!(result, Err(GpioError::Unsupported { .. })));
        assert_eq!(driver.direction(ProcessorPin::P17), None);
    }

    #[test]
    fn test_bidirectional_pin_switches_lazily() {
        let driver = Arc::new(MockDriver::new());
        let mut pin =
            GpioInputOutputBinaryPin::new(driver.clone(), ProcessorPin::P2, PinResistor::PullUp)
                .unwrap();
        assert_eq!(pin.direction(), PinDirection::Input);

        OutputBinaryPin::write(&mut pin, false).unwrap();
        assert_eq!(driver.direction(ProcessorPin::P2), Some(PinDirection::Output));
        OutputBinaryPin::write(&mut pin, true).unwrap();
        assert_eq!(driver.writes_to(ProcessorPin::P2), vec![false, true]);

        assert!(InputBinaryPin::read(&mut pin).unwrap());
        assert_eq!(pin.direction(), PinDirection::Input);
        assert_eq!(driver.direction(ProcessorPin::P2), Some(PinDirection::Input));
        assert_eq!(driver.resistor(ProcessorPin::P2), Some(PinResistor::PullUp));

        pin.release().unwrap();
        assert!(matches!(
            pin.as_output(),
            Err(GpioError::Disposed(ProcessorPin::P2))
        ));
    }
}
