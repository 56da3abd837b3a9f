//! I2C bus abstractions
//!
//! Provides traits for I2C master operations that can be implemented
//! by the BSC peripheral driver and by the bit-banged master.

use heapless::Vec;

use crate::error::BusError;

/// Maximum number of actions in one [`I2cTransaction`]
pub const MAX_TRANSACTION_ACTIONS: usize = 8;

/// Highest valid 7-bit address
pub const MAX_ADDRESS: u8 = 0x7f;

/// One step of an I2C transaction
#[derive(Debug)]
pub enum I2cAction<'a> {
    /// Write the buffer to the device
    Write(&'a [u8]),
    /// Fill the buffer from the device
    Read(&'a mut [u8]),
}

/// Ordered sequence of reads and writes addressed to one device
#[derive(Debug, Default)]
pub struct I2cTransaction<'a> {
    actions: Vec<I2cAction<'a>, MAX_TRANSACTION_ACTIONS>,
}

impl<'a> I2cTransaction<'a> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Append a write action
    pub fn write(mut self, data: &'a [u8]) -> Result<Self, BusError> {
        self.actions
            .push(I2cAction::Write(data))
            .map_err(|_| BusError::TransactionTooLong(MAX_TRANSACTION_ACTIONS))?;
        Ok(self)
    }

    /// Append a read action
    pub fn read(mut self, buf: &'a mut [u8]) -> Result<Self, BusError> {
        self.actions
            .push(I2cAction::Read(buf))
            .map_err(|_| BusError::TransactionTooLong(MAX_TRANSACTION_ACTIONS))?;
        Ok(self)
    }

    pub fn actions_mut(&mut self) -> &mut [I2cAction<'a>] {
        &mut self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Reject addresses outside the 7-bit range
pub fn check_address(address: u8) -> Result<(), BusError> {
    if address > MAX_ADDRESS {
        Err(BusError::InvalidAddress(address))
    } else {
        Ok(())
    }
}

/// I2C bus master
///
/// Provides basic I2C read/write operations for communicating with
/// peripheral devices.
pub trait I2cBus {
    /// Write data to a device at the given address
    ///
    /// # Arguments
    /// * `address` - 7-bit I2C address
    /// * `data` - Bytes to write
    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), BusError>;

    /// Read data from a device at the given address
    ///
    /// # Arguments
    /// * `address` - 7-bit I2C address
    /// * `buf` - Buffer to read into
    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError>;

    /// Write then read
    ///
    /// This is commonly used to write a register address then read data.
    ///
    /// # Arguments
    /// * `address` - 7-bit I2C address
    /// * `write_data` - Bytes to write (typically register address)
    /// * `read_buf` - Buffer to read into
    fn write_read(
        &mut self,
        address: u8,
        write_data: &[u8],
        read_buf: &mut [u8],
    ) -> Result<(), BusError> {
        self.write(address, write_data)?;
        self.read(address, read_buf)
    }

    /// Run every action of a transaction in order
    fn execute(&mut self, address: u8, transaction: &mut I2cTransaction<'_>) -> Result<(), BusError> {
        for action in transaction.actions_mut() {
            match action {
                I2cAction::Write(data) => self.write(address, data)?,
                I2cAction::Read(buf) => self.read(address, buf)?,
            }
        }
        Ok(())
    }

    /// Read one register byte
    fn read_register(&mut self, address: u8, register: u8) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        self.write_read(address, &[register], &mut buf)?;
        Ok(buf[0])
    }

    /// Write one register byte
    fn write_register(&mut self, address: u8, register: u8, value: u8) -> Result<(), BusError> {
        self.write(address, &[register, value])
    }
}

impl<B: I2cBus + ?Sized> I2cBus for &mut B {
    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), BusError> {
        (**self).write(address, data)
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError> {
        (**self).read(address, buf)
    }

    fn write_read(
        &mut self,
        address: u8,
        write_data: &[u8],
        read_buf: &mut [u8],
    ) -> Result<(), BusError> {
        (**self).write_read(address, write_data, read_buf)
    }

    fn execute(&mut self, address: u8, transaction: &mut I2cTransaction<'_>) -> Result<(), BusError> {
        (**self).execute(address, transaction)
    }
}

/// I2C configuration
#[derive(Debug, Clone, Copy)]
pub struct I2cConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl I2cConfig {
    /// Standard mode (100 kHz)
    pub const STANDARD: Self = Self { frequency: 100_000 };

    /// Fast mode (400 kHz)
    pub const FAST: Self = Self { frequency: 400_000 };
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bus that records writes and answers reads with a counter
    struct RecordingBus {
        writes: std::vec::Vec<(u8, std::vec::Vec<u8>)>,
        next: u8,
    }

    impl I2cBus for RecordingBus {
        fn write(&mut self, address: u8, data: &[u8]) -> Result<(), BusError> {
            self.writes.push((address, data.to_vec()));
            Ok(())
        }

        fn read(&mut self, _address: u8, buf: &mut [u8]) -> Result<(), BusError> {
            for byte in buf.iter_mut() {
                *byte = self.next;
                self.next += 1;
            }
            Ok(())
        }
    }

    #[test]
    fn test_transaction_executes_in_order() {
        let mut bus = RecordingBus {
            writes: std::vec::Vec::new(),
            next: 10,
        };
        let mut first = [0u8; 2];
        let mut second = [0u8; 1];
        let mut tx = I2cTransaction::new()
            .write(&[0xAA])
            .unwrap()
            .read(&mut first)
            .unwrap()
            .write(&[0xBB, 0xCC])
            .unwrap()
            .read(&mut second)
            .unwrap();
        assert_eq!(tx.len(), 4);

        bus.execute(0x40, &mut tx).unwrap();
        drop(tx);

        assert_eq!(bus.writes, vec![(0x40, vec![0xAA]), (0x40, vec![0xBB, 0xCC])]);
        assert_eq!(first, [10, 11]);
        assert_eq!(second, [12]);
    }

    #[test]
    fn test_transaction_capacity() {
        let mut tx = I2cTransaction::new();
        for _ in 0..MAX_TRANSACTION_ACTIONS {
            tx = tx.write(&[0]).unwrap();
        }
        assert!(matches!(
            tx.write(&[0]),
            Err(BusError::TransactionTooLong(MAX_TRANSACTION_ACTIONS))
        ));
    }

    #[test]
    fn test_register_helpers() {
        let mut bus = RecordingBus {
            writes: std::vec::Vec::new(),
            next: 0x55,
        };
        assert_eq!(bus.read_register(0x20, 0x12).unwrap(), 0x55);
        bus.write_register(0x20, 0x00, 0xFF).unwrap();
        assert_eq!(bus.writes[1], (0x20, vec![0x00, 0xFF]));
        assert!(check_address(0x80).is_err());
    }
}
