//! MCP23017 16-bit I/O expander driver
//!
//! Pins 0-7 are port A (GPA0-GPA7), pins 8-15 are port B (GPB0-GPB7).
//! Register addresses assume the power-on `IOCON.BANK = 0` layout, where
//! each port B register directly follows its port A counterpart.
//!
//! Single-pin operations read the register, change one bit and write it
//! back; port operations write whole bytes.

use log::trace;
use raspio_hal::i2c::check_address;
use raspio_hal::{I2cBus, PinDirection};

use crate::error::SensorError;

/// Address with A2..A0 tied low; the strap pins add 0-7
pub const BASE_ADDRESS: u8 = 0x20;

/// Number of I/O pins
pub const PIN_COUNT: u8 = 16;

/// Port A register addresses (`IOCON.BANK = 0`)
pub mod reg {
    /// Direction, 1 = input
    pub const IODIRA: u8 = 0x00;
    /// Input polarity, 1 = inverted
    pub const IPOLA: u8 = 0x02;
    /// Pull-up resistors, 1 = enabled
    pub const GPPUA: u8 = 0x0C;
    /// Port input level
    pub const GPIOA: u8 = 0x12;
    /// Output latch
    pub const OLATA: u8 = 0x14;
}

/// 8-bit port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    A,
    B,
}

impl Port {
    /// Address of the port's instance of a port A register
    pub const fn register(self, port_a: u8) -> u8 {
        match self {
            Port::A => port_a,
            Port::B => port_a + 1,
        }
    }
}

/// Port and bit of a pin number
fn locate(pin: u8) -> Result<(Port, u8), SensorError> {
    match pin {
        0..=7 => Ok((Port::A, pin)),
        8..=15 => Ok((Port::B, pin - 8)),
        _ => Err(SensorError::InvalidPin(pin)),
    }
}

/// MCP23017 on an I2C bus
#[derive(Debug)]
pub struct Mcp23017<B> {
    bus: B,
    address: u8,
}

impl<B: I2cBus> Mcp23017<B> {
    pub fn new(bus: B, address: u8) -> Result<Self, SensorError> {
        check_address(address)?;
        Ok(Self { bus, address })
    }

    /// Expander with all strap pins low
    pub fn with_base_address(bus: B) -> Self {
        Self {
            bus,
            address: BASE_ADDRESS,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn release(self) -> B {
        self.bus
    }

    fn update_bit(&mut self, port_a: u8, pin: u8, set: bool) -> Result<(), SensorError> {
        let (port, bit) = locate(pin)?;
        let register = port.register(port_a);
        let current = self.bus.read_register(self.address, register)?;
        let value = if set {
            current | 1 << bit
        } else {
            current & !(1 << bit)
        };
        trace!(
            "mcp23017 {:#04x}: register {register:#04x} {current:#04x} -> {value:#04x}",
            self.address
        );
        self.bus.write_register(self.address, register, value)?;
        Ok(())
    }

    pub fn set_direction(&mut self, pin: u8, direction: PinDirection) -> Result<(), SensorError> {
        self.update_bit(reg::IODIRA, pin, direction == PinDirection::Input)
    }

    pub fn set_pull_up(&mut self, pin: u8, enabled: bool) -> Result<(), SensorError> {
        self.update_bit(reg::GPPUA, pin, enabled)
    }

    /// Invert the level reported for an input pin
    pub fn set_polarity(&mut self, pin: u8, inverted: bool) -> Result<(), SensorError> {
        self.update_bit(reg::IPOLA, pin, inverted)
    }

    /// Drive an output pin through its latch
    pub fn write(&mut self, pin: u8, high: bool) -> Result<(), SensorError> {
        self.update_bit(reg::OLATA, pin, high)
    }

    pub fn read(&mut self, pin: u8) -> Result<bool, SensorError> {
        let (port, bit) = locate(pin)?;
        Ok(self.read_port(port)? & 1 << bit != 0)
    }

    /// Direction of a whole port, 1 bits are inputs
    pub fn set_port_direction(&mut self, port: Port, inputs: u8) -> Result<(), SensorError> {
        self.bus
            .write_register(self.address, port.register(reg::IODIRA), inputs)?;
        Ok(())
    }

    pub fn read_port(&mut self, port: Port) -> Result<u8, SensorError> {
        Ok(self
            .bus
            .read_register(self.address, port.register(reg::GPIOA))?)
    }

    pub fn write_port(&mut self, port: Port, value: u8) -> Result<(), SensorError> {
        self.bus
            .write_register(self.address, port.register(reg::OLATA), value)?;
        Ok(())
    }
}
