//! SPI bus abstractions
//!
//! Provides traits for SPI master operations, implemented by the spidev
//! character device wrapper and by the bit-banged connection.

use crate::error::BusError;

/// SPI bus master
///
/// Provides basic SPI transfer operations for communicating with
/// peripheral devices.
pub trait SpiBus {
    /// Transfer data (simultaneous read/write)
    ///
    /// Writes data from `write` buffer while reading into `read` buffer.
    /// Both buffers must be the same length.
    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), BusError>;

    /// Write data, discarding what is clocked in
    fn write(&mut self, data: &[u8]) -> Result<(), BusError>;

    /// Read data (writes zeros)
    fn read(&mut self, buf: &mut [u8]) -> Result<(), BusError> {
        let zeros = vec![0u8; buf.len()];
        self.transfer(buf, &zeros)
    }

    /// Transfer data in place
    ///
    /// Writes data from buffer while reading into the same buffer.
    fn transfer_in_place(&mut self, data: &mut [u8]) -> Result<(), BusError> {
        let write = data.to_vec();
        self.transfer(data, &write)
    }
}

/// Check that both halves of a full-duplex transfer line up
pub fn check_transfer_lengths(read: &[u8], write: &[u8]) -> Result<(), BusError> {
    if read.len() == write.len() {
        Ok(())
    } else {
        Err(BusError::LengthMismatch {
            read: read.len(),
            write: write.len(),
        })
    }
}

/// Bit order on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Endianness {
    /// Most significant bit first
    #[default]
    BigEndian,
    /// Least significant bit first
    LittleEndian,
}

impl Endianness {
    /// Position of the `i`-th transmitted bit within a `bit_count` wide value
    pub const fn bit_index(self, i: u32, bit_count: u32) -> u32 {
        match self {
            Endianness::BigEndian => bit_count - 1 - i,
            Endianness::LittleEndian => i,
        }
    }
}

/// SPI mode (combined polarity and phase)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Mode 0: CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// Mode 1: CPOL=0, CPHA=1
    Mode1,
    /// Mode 2: CPOL=1, CPHA=0
    Mode2,
    /// Mode 3: CPOL=1, CPHA=1
    Mode3,
}

impl Mode {
    /// Kernel `SPI_MODE_*` value
    pub const fn bits(self) -> u8 {
        match self {
            Mode::Mode0 => 0,
            Mode::Mode1 => 1,
            Mode::Mode2 => 2,
            Mode::Mode3 => 3,
        }
    }
}

/// SPI configuration
#[derive(Debug, Clone, Copy)]
pub struct SpiConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
    /// Polarity and phase
    pub mode: Mode,
    /// Word size
    pub bits_per_word: u8,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            frequency: 1_000_000, // 1 MHz
            mode: Mode::Mode0,
            bits_per_word: 8,
        }
    }
}
