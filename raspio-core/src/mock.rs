//! In-memory pin driver
//!
//! Keeps pin levels in memory so connections, binary pins and bus drivers
//! can run without hardware. Input levels are driven from the outside with
//! [`MockDriver::set_level`]; every write is recorded.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use raspio_hal::gpio::effective_timeout;
use raspio_hal::{
    DriverCapabilities, GpioDriver, GpioError, PinDetectedEdges, PinDirection, PinResistor,
    ProcessorPin, ProcessorPins,
};

const POLL_INTERVAL: Duration = Duration::from_micros(100);

#[derive(Debug, Default)]
struct MockState {
    levels: ProcessorPins,
    directions: HashMap<ProcessorPin, PinDirection>,
    resistors: HashMap<ProcessorPin, PinResistor>,
    edges: HashMap<ProcessorPin, PinDetectedEdges>,
    writes: Vec<(ProcessorPin, bool)>,
    batch_reads: usize,
}

/// Driver without hardware behind it
#[derive(Debug)]
pub struct MockDriver {
    capabilities: DriverCapabilities,
    state: Mutex<MockState>,
}

impl MockDriver {
    pub const CAPABILITIES: DriverCapabilities = DriverCapabilities::CAN_SET_PIN_RESISTOR
        .union(DriverCapabilities::CAN_SET_PIN_DETECTED_EDGES)
        .union(DriverCapabilities::CAN_CHANGE_PIN_DIRECTION_RAPIDLY)
        .union(DriverCapabilities::CAN_WORK_ON_THIRD_PARTY_COMPUTERS);

    pub fn new() -> Self {
        Self::with_capabilities(Self::CAPABILITIES)
    }

    /// Driver reporting only `capabilities`
    pub fn with_capabilities(capabilities: DriverCapabilities) -> Self {
        Self {
            capabilities,
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drive the electrical level of a pin
    pub fn set_level(&self, pin: ProcessorPin, high: bool) {
        let mut state = self.state();
        if high {
            state.levels.insert(pin);
        } else {
            state.levels.remove(pin);
        }
    }

    pub fn level(&self, pin: ProcessorPin) -> bool {
        self.state().levels.contains(pin)
    }

    /// Direction of an allocated pin
    pub fn direction(&self, pin: ProcessorPin) -> Option<PinDirection> {
        self.state().directions.get(&pin).copied()
    }

    pub fn resistor(&self, pin: ProcessorPin) -> Option<PinResistor> {
        self.state().resistors.get(&pin).copied()
    }

    pub fn edges(&self, pin: ProcessorPin) -> Option<PinDetectedEdges> {
        self.state().edges.get(&pin).copied()
    }

    /// Every write so far, oldest first
    pub fn writes(&self) -> Vec<(ProcessorPin, bool)> {
        self.state().writes.clone()
    }

    /// Writes to one pin, oldest first
    pub fn writes_to(&self, pin: ProcessorPin) -> Vec<bool> {
        self.state()
            .writes
            .iter()
            .filter(|(written, _)| *written == pin)
            .map(|&(_, value)| value)
            .collect()
    }

    /// Number of batch reads served
    pub fn batch_reads(&self) -> usize {
        self.state().batch_reads
    }

    fn check_allocated(state: &MockState, pin: ProcessorPin) -> Result<PinDirection, GpioError> {
        state
            .directions
            .get(&pin)
            .copied()
            .ok_or(GpioError::NotAllocated(pin))
    }

    fn require(&self, capability: DriverCapabilities, operation: &'static str) -> Result<(), GpioError> {
        if self.capabilities.contains(capability) {
            Ok(())
        } else {
            Err(GpioError::Unsupported {
                driver: "mock",
                operation,
            })
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioDriver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn capabilities(&self) -> DriverCapabilities {
        self.capabilities
    }

    fn allocate(&self, pin: ProcessorPin, direction: PinDirection) -> Result<(), GpioError> {
        let mut state = self.state();
        state.directions.insert(pin, direction);
        if direction == PinDirection::Input {
            state.resistors.insert(pin, PinResistor::None);
        }
        debug!("mock: {pin} allocated as {direction}");
        Ok(())
    }

    fn set_pin_resistor(&self, pin: ProcessorPin, resistor: PinResistor) -> Result<(), GpioError> {
        self.require(DriverCapabilities::CAN_SET_PIN_RESISTOR, "pull resistor configuration")?;
        let mut state = self.state();
        Self::check_allocated(&state, pin)?;
        state.resistors.insert(pin, resistor);
        Ok(())
    }

    fn set_pin_detected_edges(
        &self,
        pin: ProcessorPin,
        edges: PinDetectedEdges,
    ) -> Result<(), GpioError> {
        self.require(DriverCapabilities::CAN_SET_PIN_DETECTED_EDGES, "edge detection")?;
        let mut state = self.state();
        Self::check_allocated(&state, pin)?;
        state.edges.insert(pin, edges);
        Ok(())
    }

    fn wait(
        &self,
        pin: ProcessorPin,
        state: bool,
        timeout: Option<Duration>,
    ) -> Result<(), GpioError> {
        let timeout = effective_timeout(timeout);
        let deadline = Instant::now() + timeout;
        loop {
            if self.level(pin) == state {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(GpioError::Timeout {
                    pin,
                    expected: state,
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn write(&self, pin: ProcessorPin, value: bool) -> Result<(), GpioError> {
        let mut state = self.state();
        if Self::check_allocated(&state, pin)? != PinDirection::Output {
            return Err(GpioError::WrongDirection {
                pin,
                expected: "output",
            });
        }
        if value {
            state.levels.insert(pin);
        } else {
            state.levels.remove(pin);
        }
        state.writes.push((pin, value));
        Ok(())
    }

    fn read(&self, pin: ProcessorPin) -> Result<bool, GpioError> {
        Ok(self.level(pin))
    }

    fn read_pins(&self, pins: ProcessorPins) -> Result<ProcessorPins, GpioError> {
        let mut state = self.state();
        state.batch_reads += 1;
        Ok(state.levels & pins)
    }

    fn release(&self, pin: ProcessorPin) -> Result<(), GpioError> {
        let mut state = self.state();
        state.directions.remove(&pin);
        state.resistors.remove(&pin);
        state.edges.remove(&pin);
        debug!("mock: {pin} released");
        Ok(())
    }
}
