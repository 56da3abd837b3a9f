//! Register driver with kernel edge detection

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, warn};
use raspio_hal::gpio::effective_timeout;
use raspio_hal::{
    DriverCapabilities, GpioDriver, GpioError, PinDetectedEdges, PinDirection, PinResistor,
    ProcessorPin, ProcessorPins,
};

use crate::edge::EdgeWatch;
use crate::memory::{MemoryMap, RegisterBackend};
use crate::sysfs::SysfsGpio;

use super::memory::{map_gpio_block, MemoryGpioDriver};

/// Full-featured driver
///
/// Pin I/O goes through the registers. Inputs are additionally exported in
/// the pseudo-filesystem with `edge=both`, so [`GpioDriver::wait`] sleeps in
/// `epoll_wait` instead of spinning.
#[derive(Debug)]
pub struct BcmGpioDriver<B = MemoryMap> {
    registers: MemoryGpioDriver<B>,
    sysfs: SysfsGpio,
    edges: Mutex<HashMap<ProcessorPin, Arc<EdgeWatch>>>,
}

impl BcmGpioDriver<MemoryMap> {
    pub const CAPABILITIES: DriverCapabilities = DriverCapabilities::CAN_SET_PIN_RESISTOR
        .union(DriverCapabilities::CAN_SET_PIN_DETECTED_EDGES);

    /// Map the GPIO block and use the default pseudo-filesystem root
    pub fn open() -> Result<Self, GpioError> {
        Ok(Self::with_parts(map_gpio_block()?, SysfsGpio::default()))
    }
}

impl<B: RegisterBackend> BcmGpioDriver<B> {
    pub fn with_parts(backend: B, sysfs: SysfsGpio) -> Self {
        Self {
            registers: MemoryGpioDriver::with_backend(backend),
            sysfs,
            edges: Mutex::new(HashMap::new()),
        }
    }

    fn edges(&self) -> MutexGuard<'_, HashMap<ProcessorPin, Arc<EdgeWatch>>> {
        self.edges.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_watching(&self, pin: ProcessorPin) {
        if self.edges().remove(&pin).is_some() {
            if let Err(e) = self.sysfs.unexport(pin) {
                warn!("{e}");
            }
        }
    }
}

impl<B: RegisterBackend> GpioDriver for BcmGpioDriver<B> {
    fn name(&self) -> &'static str {
        "bcm"
    }

    fn capabilities(&self) -> DriverCapabilities {
        BcmGpioDriver::<MemoryMap>::CAPABILITIES
    }

    fn allocate(&self, pin: ProcessorPin, direction: PinDirection) -> Result<(), GpioError> {
        match direction {
            PinDirection::Input => {
                // Exporting rewrites the direction, so registers go last
                let watch = EdgeWatch::open(&self.sysfs, pin)?;
                self.edges().insert(pin, Arc::new(watch));
                self.registers.allocate(pin, direction)
            }
            PinDirection::Output => {
                self.stop_watching(pin);
                self.registers.allocate(pin, direction)
            }
        }
    }

    fn set_pin_resistor(&self, pin: ProcessorPin, resistor: PinResistor) -> Result<(), GpioError> {
        self.registers.set_pin_resistor(pin, resistor)
    }

    fn set_pin_detected_edges(
        &self,
        pin: ProcessorPin,
        edges: PinDetectedEdges,
    ) -> Result<(), GpioError> {
        self.sysfs.set_edges(pin, edges)?;
        debug!("{pin} detects {} edges", edges.as_sysfs_str());
        Ok(())
    }

    fn wait(
        &self,
        pin: ProcessorPin,
        state: bool,
        timeout: Option<Duration>,
    ) -> Result<(), GpioError> {
        let Some(watch) = self.edges().get(&pin).cloned() else {
            return self.registers.wait(pin, state, timeout);
        };

        let timeout = effective_timeout(timeout);
        let deadline = Instant::now() + timeout;
        loop {
            if self.registers.read(pin)? == state {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(GpioError::Timeout {
                    pin,
                    expected: state,
                    timeout,
                });
            }
            watch.wait(deadline - now)?;
        }
    }

    fn write(&self, pin: ProcessorPin, value: bool) -> Result<(), GpioError> {
        self.registers.write(pin, value)
    }

    fn read(&self, pin: ProcessorPin) -> Result<bool, GpioError> {
        self.registers.read(pin)
    }

    fn read_pins(&self, pins: ProcessorPins) -> Result<ProcessorPins, GpioError> {
        self.registers.read_pins(pins)
    }

    fn release(&self, pin: ProcessorPin) -> Result<(), GpioError> {
        self.stop_watching(pin);
        self.registers.release(pin)
    }
}
