//! Register-only driver

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::debug;
use raspio_hal::{
    DriverCapabilities, GpioDriver, GpioError, PinDetectedEdges, PinDirection, PinResistor,
    ProcessorPin, ProcessorPins,
};

use crate::board::Board;
use crate::gpio::GpioBlock;
use crate::memory::{MemoryMap, RegisterBackend, GPIOMEM_PATH, MEM_PATH};
use crate::registers::{BLOCK_SIZE, GPIO_OFFSET};
use crate::registry::PinRegistry;

use super::busy_wait;

/// Map the GPIO register block
///
/// Prefers `/dev/gpiomem`, which exposes only the GPIO block and needs no
/// root privileges, and falls back to `/dev/mem` at the peripheral base of
/// the detected processor.
pub fn map_gpio_block() -> Result<MemoryMap, GpioError> {
    match MemoryMap::open_device(GPIOMEM_PATH, 0, BLOCK_SIZE) {
        Ok(map) => Ok(map),
        Err(e) => {
            debug!("{e}; falling back to {MEM_PATH}");
            let board = Board::detect()?;
            let base = board
                .processor
                .peripheral_base()
                .ok_or(GpioError::Unsupported {
                    driver: "memory",
                    operation: "mapping registers of an unknown processor",
                })?;
            MemoryMap::open_device(MEM_PATH, base + GPIO_OFFSET, BLOCK_SIZE)
        }
    }
}

/// Driver accessing the GPIO registers directly
///
/// Waits are busy loops over the level register. Generic over the register
/// backend so the register traffic can be observed.
#[derive(Debug)]
pub struct MemoryGpioDriver<B = MemoryMap> {
    gpio: GpioBlock<B>,
    registry: Mutex<PinRegistry>,
}

impl MemoryGpioDriver<MemoryMap> {
    pub const CAPABILITIES: DriverCapabilities = DriverCapabilities::CAN_SET_PIN_RESISTOR
        .union(DriverCapabilities::CAN_CHANGE_PIN_DIRECTION_RAPIDLY);

    /// Map the GPIO block of this board
    pub fn open() -> Result<Self, GpioError> {
        Ok(Self::with_backend(map_gpio_block()?))
    }
}

impl<B: RegisterBackend> MemoryGpioDriver<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            gpio: GpioBlock::new(backend),
            registry: Mutex::new(PinRegistry::new()),
        }
    }

    pub fn gpio(&self) -> &GpioBlock<B> {
        &self.gpio
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, PinRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: RegisterBackend> GpioDriver for MemoryGpioDriver<B> {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> DriverCapabilities {
        MemoryGpioDriver::<MemoryMap>::CAPABILITIES
    }

    fn allocate(&self, pin: ProcessorPin, direction: PinDirection) -> Result<(), GpioError> {
        let mut registry = self.registry();
        registry.allocate(pin, direction)?;
        // Stop driving the line before the pull sequence
        self.gpio.set_direction(pin, direction);
        if direction == PinDirection::Input {
            self.gpio.set_resistor(pin, PinResistor::None);
        }
        debug!("{} allocated {pin} as {direction}", self.name());
        Ok(())
    }

    fn set_pin_resistor(&self, pin: ProcessorPin, resistor: PinResistor) -> Result<(), GpioError> {
        let mut registry = self.registry();
        let state = registry.state(pin).ok_or(GpioError::NotAllocated(pin))?;
        if state.resistor == resistor {
            return Ok(());
        }
        self.gpio.set_resistor(pin, resistor);
        registry.set_resistor(pin, resistor)
    }

    fn set_pin_detected_edges(
        &self,
        _pin: ProcessorPin,
        _edges: PinDetectedEdges,
    ) -> Result<(), GpioError> {
        Err(GpioError::Unsupported {
            driver: self.name(),
            operation: "edge detection",
        })
    }

    fn wait(
        &self,
        pin: ProcessorPin,
        state: bool,
        timeout: Option<Duration>,
    ) -> Result<(), GpioError> {
        busy_wait(pin, state, timeout, || Ok(self.gpio.read(pin)))
    }

    fn write(&self, pin: ProcessorPin, value: bool) -> Result<(), GpioError> {
        self.registry().check_output(pin)?;
        self.gpio.write(pin, value);
        Ok(())
    }

    fn read(&self, pin: ProcessorPin) -> Result<bool, GpioError> {
        Ok(self.gpio.read(pin))
    }

    fn read_pins(&self, pins: ProcessorPins) -> Result<ProcessorPins, GpioError> {
        Ok(self.gpio.read_pins(pins))
    }

    fn release(&self, pin: ProcessorPin) -> Result<(), GpioError> {
        if self.registry().release(pin).is_some() {
            self.gpio.set_direction(pin, PinDirection::Input);
            debug!("{} released {pin}", self.name());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::gpio::{FSEL_INPUT, FSEL_OUTPUT, GPFSEL0, GPLEV0, GPPUD, GPSET0};
    use crate::testing::{Access, MockBackend};
    use std::sync::Arc;
    use std::time::Instant;

    fn driver() -> (Arc<MockBackend>, MemoryGpioDriver<Arc<MockBackend>>) {
        let backend = Arc::new(MockBackend::gpio());
        (backend.clone(), MemoryGpioDriver::with_backend(backend))
    }

    #[test]
    fn test_allocate_output_and_write() {
        let (backend, driver) = driver();

        driver.allocate(ProcessorPin::P18, PinDirection::Output).unwrap();
        assert_eq!(driver.gpio().function(ProcessorPin::P18), FSEL_OUTPUT);

        driver.write(ProcessorPin::P18, true).unwrap();
        assert_eq!(backend.writes_to(GPSET0), vec![1 << 18, 1 << 18]);
        assert!(driver.read(ProcessorPin::P18).unwrap());
    }

    #[test]
    fn test_input_allocation_selects_function_before_pull() {
        let (backend, driver) = driver();
        driver.allocate(ProcessorPin::P4, PinDirection::Output).unwrap();
        driver.write(ProcessorPin::P4, true).unwrap();
        driver.release(ProcessorPin::P4).unwrap();
        backend.take_log();

        let start = Instant::now();
        driver.allocate(ProcessorPin::P4, PinDirection::Input).unwrap();
        let elapsed = start.elapsed();

        let log = backend.take_log();
        let position = |offset: usize| {
            log.iter()
                .position(|access| matches!(access, Access::Write(o, _) if *o == offset))
                .unwrap()
        };
        assert!(position(GPFSEL0) < position(GPPUD), "{log:?}");
        assert_eq!(driver.gpio().function(ProcessorPin::P4), FSEL_INPUT);
        assert!(elapsed < Duration::from_millis(5), "{elapsed:?}");
    }

    #[test]
    fn test_write_requires_output() {
        let (_, driver) = driver();

        assert!(matches!(
            driver.write(ProcessorPin::P5, true),
            Err(GpioError::NotAllocated(_))
        ));
        driver.allocate(ProcessorPin::P5, PinDirection::Input).unwrap();
        assert!(matches!(
            driver.write(ProcessorPin::P5, true),
            Err(GpioError::WrongDirection { .. })
        ));
    }

    #[test]
    fn test_resistor_written_only_on_change() {
        let (backend, driver) = driver();
        driver.allocate(ProcessorPin::P4, PinDirection::Input).unwrap();
        backend.take_log();

        driver
            .set_pin_resistor(ProcessorPin::P4, PinResistor::PullUp)
            .unwrap();
        assert_eq!(backend.writes_to(GPPUD).len(), 4);

        // Same resistor again: remembered, nothing written
        backend.take_log();
        driver
            .set_pin_resistor(ProcessorPin::P4, PinResistor::PullUp)
            .unwrap();
        assert!(backend.writes_to(GPPUD).is_empty());

        // Back to none must reach the hardware
        driver
            .set_pin_resistor(ProcessorPin::P4, PinResistor::None)
            .unwrap();
        assert_eq!(backend.writes_to(GPPUD).len(), 4);
    }

    #[test]
    fn test_wait_times_out() {
        let (_, driver) = driver();
        driver.allocate(ProcessorPin::P17, PinDirection::Input).unwrap();

        let start = Instant::now();
        let err = driver
            .wait(ProcessorPin::P17, true, Some(Duration::from_millis(10)))
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(
            err,
            GpioError::Timeout {
                pin: ProcessorPin::P17,
                expected: true,
                ..
            }
        ));
        assert!(elapsed >= Duration::from_millis(10), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(60), "{elapsed:?}");
    }

    #[test]
    fn test_wait_returns_when_level_matches() {
        let (backend, driver) = driver();
        driver.allocate(ProcessorPin::P17, PinDirection::Input).unwrap();
        backend.poke(GPLEV0, 1 << 17);

        driver
            .wait(ProcessorPin::P17, true, Some(Duration::from_millis(10)))
            .unwrap();
    }

    #[test]
    fn test_edges_unsupported_and_release() {
        let (_, driver) = driver();
        driver.allocate(ProcessorPin::P22, PinDirection::Output).unwrap();

        assert!(matches!(
            driver.set_pin_detected_edges(ProcessorPin::P22, PinDetectedEdges::Both),
            Err(GpioError::Unsupported { .. })
        ));

        driver.release(ProcessorPin::P22).unwrap();
        assert_eq!(driver.gpio().function(ProcessorPin::P22), FSEL_INPUT);
        // Releasing twice is harmless
        driver.release(ProcessorPin::P22).unwrap();
    }
}
