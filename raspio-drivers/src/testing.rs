//! Register-map I2C device shared by the sensor and expander tests

use raspio_hal::{BusError, I2cBus};

/// Reacts to a register write, e.g. by loading conversion results
pub type WriteHook = Box<dyn FnMut(&mut [u8; 256], u8, u8)>;

/// Device exposing 256 byte registers behind an auto-incrementing pointer
///
/// A write sets the pointer from its first byte and stores the remaining
/// bytes; a read returns bytes from the pointer onwards.
pub struct RegisterBus {
    pub address: u8,
    pub registers: [u8; 256],
    pub writes: Vec<Vec<u8>>,
    pointer: u8,
    on_write: Option<WriteHook>,
}

impl RegisterBus {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            registers: [0; 256],
            writes: Vec::new(),
            pointer: 0,
            on_write: None,
        }
    }

    pub fn with_hook(mut self, hook: impl FnMut(&mut [u8; 256], u8, u8) + 'static) -> Self {
        self.on_write = Some(Box::new(hook));
        self
    }

    /// Store bytes starting at `register`
    pub fn load(&mut self, register: u8, bytes: &[u8]) {
        let start = usize::from(register);
        self.registers[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn check(&self, address: u8) -> Result<(), BusError> {
        if address == self.address {
            Ok(())
        } else {
            Err(BusError::Nack { address })
        }
    }
}

impl I2cBus for RegisterBus {
    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), BusError> {
        self.check(address)?;
        self.writes.push(data.to_vec());
        let Some((&pointer, values)) = data.split_first() else {
            return Ok(());
        };
        self.pointer = pointer;
        for &value in values {
            let register = self.pointer;
            self.registers[usize::from(register)] = value;
            if let Some(hook) = self.on_write.as_mut() {
                hook(&mut self.registers, register, value);
            }
            self.pointer = self.pointer.wrapping_add(1);
        }
        Ok(())
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.check(address)?;
        for byte in buf.iter_mut() {
            *byte = self.registers[usize::from(self.pointer)];
            self.pointer = self.pointer.wrapping_add(1);
        }
        Ok(())
    }
}
