//! GPIO register block
//!
//! Function select, level, set/clear and pull resistor sequencing on top
//! of a [`Registers`] window.

use std::time::{Duration, Instant};

use raspio_hal::{PinDirection, PinResistor, ProcessorPin, ProcessorPins};

use crate::memory::{RegisterBackend, Registers};
use crate::registers::gpio::*;
use crate::registers::{bank_location, fsel_location};

/// Settle time around each step of the pull resistor sequence
pub const PUD_SETTLE_TIME: Duration = Duration::from_micros(5);

/// Busy-wait for `duration`
fn settle(duration: Duration) {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

/// GPIO register block
#[derive(Debug)]
pub struct GpioBlock<B> {
    regs: Registers<B>,
}

impl<B: RegisterBackend> GpioBlock<B> {
    pub fn new(backend: B) -> Self {
        Self {
            regs: Registers::new(backend),
        }
    }

    /// Set the 3-bit function select field of a pin
    pub fn set_function(&self, pin: ProcessorPin, function: u32) {
        let (offset, shift) = fsel_location(pin.number());
        self.regs
            .write_masked(offset, function << shift, FSEL_MASK << shift);
    }

    /// Current function select field of a pin
    pub fn function(&self, pin: ProcessorPin) -> u32 {
        let (offset, shift) = fsel_location(pin.number());
        (self.regs.read(offset) >> shift) & FSEL_MASK
    }

    pub fn set_direction(&self, pin: ProcessorPin, direction: PinDirection) {
        let function = match direction {
            PinDirection::Input => FSEL_INPUT,
            PinDirection::Output => FSEL_OUTPUT,
        };
        self.set_function(pin, function);
    }

    /// Drive a pin through the set or clear register
    pub fn write(&self, pin: ProcessorPin, value: bool) {
        let base = if value { GPSET0 } else { GPCLR0 };
        let (offset, bit) = bank_location(base, pin.number());
        self.regs.write(offset, bit);
    }

    pub fn read(&self, pin: ProcessorPin) -> bool {
        let (offset, bit) = bank_location(GPLEV0, pin.number());
        self.regs.read(offset) & bit != 0
    }

    /// Read several pins, touching each level bank at most once
    pub fn read_pins(&self, pins: ProcessorPins) -> ProcessorPins {
        let mut high = 0u64;
        for bank in 0..2 {
            let wanted = pins.bank(bank);
            if wanted != 0 {
                let level = self.regs.read(GPLEV0 + 4 * bank) & wanted;
                high |= u64::from(level) << (32 * bank);
            }
        }
        ProcessorPins::from_bits(high)
    }

    /// Run the pull resistor sequence for one pin
    ///
    /// GPPUD control, settle, clock the pin in, settle, then reset both
    /// registers. The order is mandated by the peripheral.
    pub fn set_resistor(&self, pin: ProcessorPin, resistor: PinResistor) {
        let control = match resistor {
            PinResistor::None => PUD_OFF,
            PinResistor::PullDown => PUD_DOWN,
            PinResistor::PullUp => PUD_UP,
        };
        let (clock, bit) = bank_location(GPPUDCLK0, pin.number());

        self.regs.write(GPPUD, control);
        settle(PUD_SETTLE_TIME);
        self.regs.write(clock, bit);
        settle(PUD_SETTLE_TIME);
        self.regs.write(GPPUD, PUD_OFF);
        self.regs.write(clock, 0);
    }

    pub fn registers(&self) -> &Registers<B> {
        &self.regs
    }
}
