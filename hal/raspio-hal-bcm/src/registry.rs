//! Per-driver pin registry
//!
//! Tracks which pins a driver instance has allocated, in which direction,
//! and the pull resistor last applied to each input.

use heapless::FnvIndexMap;
use raspio_hal::{GpioError, PinDirection, PinResistor, ProcessorPin};

/// Maximum number of GPIO lines tracked
pub const GPIO_COUNT: usize = 64;

/// Allocation state of one pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinState {
    pub direction: PinDirection,
    pub resistor: PinResistor,
}

/// Registry of allocated pins
#[derive(Debug)]
pub struct PinRegistry {
    allocated: FnvIndexMap<ProcessorPin, PinState, GPIO_COUNT>,
}

impl Default for PinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PinRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            allocated: FnvIndexMap::new(),
        }
    }

    /// Record a pin as allocated
    ///
    /// Re-allocating a pin changes its direction. Inputs start without a
    /// pull resistor. Returns the previous state, if any.
    pub fn allocate(
        &mut self,
        pin: ProcessorPin,
        direction: PinDirection,
    ) -> Result<Option<PinState>, GpioError> {
        let state = PinState {
            direction,
            resistor: PinResistor::None,
        };
        self.allocated
            .insert(pin, state)
            .map_err(|_| GpioError::InvalidPin(pin.number()))
    }

    /// Remember the resistor applied to a pin
    pub fn set_resistor(&mut self, pin: ProcessorPin, resistor: PinResistor) -> Result<(), GpioError> {
        let state = self
            .allocated
            .get_mut(&pin)
            .ok_or(GpioError::NotAllocated(pin))?;
        state.resistor = resistor;
        Ok(())
    }

    /// Forget a pin
    pub fn release(&mut self, pin: ProcessorPin) -> Option<PinState> {
        self.allocated.remove(&pin)
    }

    pub fn state(&self, pin: ProcessorPin) -> Option<PinState> {
        self.allocated.get(&pin).copied()
    }

    /// Check if a pin is allocated
    pub fn is_allocated(&self, pin: ProcessorPin) -> bool {
        self.allocated.contains_key(&pin)
    }

    /// Fail unless the pin is allocated as an output
    pub fn check_output(&self, pin: ProcessorPin) -> Result<(), GpioError> {
        match self.state(pin) {
            None => Err(GpioError::NotAllocated(pin)),
            Some(PinState {
                direction: PinDirection::Input,
                ..
            }) => Err(GpioError::WrongDirection {
                pin,
                expected: "output",
            }),
            Some(_) => Ok(()),
        }
    }

    /// Get the number of allocated pins
    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }

    /// Allocated pins in allocation order
    pub fn pins(&self) -> impl Iterator<Item = ProcessorPin> + '_ {
        self.allocated.keys().copied()
    }
}
