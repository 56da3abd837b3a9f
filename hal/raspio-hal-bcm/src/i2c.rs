//! I2C master on the Broadcom Serial Controller (BSC)
//!
//! Drives the BSC registers directly: the FIFO is filled and drained while
//! polling the status register, and the slave address register is only
//! reprogrammed when the target device changes.

use std::thread;
use std::time::Duration;

use log::debug;
use raspio_hal::i2c::check_address;
use raspio_hal::{BusError, GpioError, I2cBus, ProcessorPin};

use crate::gpio::GpioBlock;
use crate::memory::{MemoryMap, RegisterBackend, Registers, MEM_PATH};
use crate::registers::bsc::*;
use crate::registers::gpio::{FSEL_ALT0, FSEL_INPUT};
use crate::registers::{BLOCK_SIZE, BSC0_OFFSET, BSC1_OFFSET, GPIO_OFFSET};

/// BSC controller selected by its pins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BscBus {
    /// SDA on GPIO0, SCL on GPIO1
    Bsc0,
    /// SDA on GPIO2, SCL on GPIO3
    Bsc1,
}

impl BscBus {
    /// Controller wired to the given data and clock pins
    pub fn from_pins(sda: ProcessorPin, scl: ProcessorPin) -> Result<Self, BusError> {
        match (sda.number(), scl.number()) {
            (0, 1) => Ok(BscBus::Bsc0),
            (2, 3) => Ok(BscBus::Bsc1),
            _ => Err(BusError::Gpio(GpioError::Unsupported {
                driver: "bsc",
                operation: "I2C on pins other than GPIO0/1 or GPIO2/3",
            })),
        }
    }

    pub const fn pins(self) -> (ProcessorPin, ProcessorPin) {
        match self {
            BscBus::Bsc0 => (ProcessorPin::P0, ProcessorPin::P1),
            BscBus::Bsc1 => (ProcessorPin::P2, ProcessorPin::P3),
        }
    }

    pub const fn offset(self) -> u64 {
        match self {
            BscBus::Bsc0 => BSC0_OFFSET,
            BscBus::Bsc1 => BSC1_OFFSET,
        }
    }
}

/// Time to shift one byte plus its acknowledge bit at the given divider
pub fn byte_wait_interval(divider: u32) -> Duration {
    let divider = u64::from(divider.max(1));
    Duration::from_nanos(9 * 1_000_000_000 * divider / CORE_CLOCK_HZ)
}

/// BSC I2C master
///
/// Switches SDA and SCL to their ALT0 function on creation and back to
/// inputs on drop.
pub struct BscI2c<B: RegisterBackend = MemoryMap> {
    gpio: GpioBlock<B>,
    bsc: Registers<B>,
    bus: BscBus,
    current_address: Option<u8>,
    wait_interval: Duration,
}

impl BscI2c<MemoryMap> {
    /// Map the GPIO and BSC blocks through `/dev/mem`
    ///
    /// # Arguments
    /// * `peripheral_base` - Base address of the processor's peripherals
    /// * `sda` - Data pin
    /// * `scl` - Clock pin
    pub fn open(peripheral_base: u64, sda: ProcessorPin, scl: ProcessorPin) -> Result<Self, BusError> {
        let bus = BscBus::from_pins(sda, scl)?;
        let gpio = MemoryMap::open_device(MEM_PATH, peripheral_base + GPIO_OFFSET, BLOCK_SIZE)?;
        let bsc = MemoryMap::open_device(MEM_PATH, peripheral_base + bus.offset(), BLOCK_SIZE)?;
        Ok(Self::with_backends(gpio, bsc, bus))
    }
}

impl<B: RegisterBackend> BscI2c<B> {
    pub fn with_backends(gpio: B, bsc: B, bus: BscBus) -> Self {
        let gpio = GpioBlock::new(gpio);
        let (sda, scl) = bus.pins();
        gpio.set_function(sda, FSEL_ALT0);
        gpio.set_function(scl, FSEL_ALT0);

        let bsc = Registers::new(bsc);
        let divider = match bsc.read(DIV) {
            0 => DEFAULT_CLOCK_DIVIDER,
            divider => divider,
        };
        debug!("{bus:?} ready, clock divider {divider}");

        Self {
            gpio,
            bsc,
            bus,
            current_address: None,
            wait_interval: byte_wait_interval(divider),
        }
    }

    pub fn clock_divider(&self) -> u32 {
        self.bsc.read(DIV)
    }

    /// Set the clock divider (SCL = 250 MHz / divider)
    pub fn set_clock_divider(&mut self, divider: u32) {
        self.bsc.write(DIV, divider);
        self.wait_interval = byte_wait_interval(divider);
    }

    /// Set the bus speed in Hz
    pub fn set_frequency(&mut self, frequency: u32) {
        let divider = (CORE_CLOCK_HZ / u64::from(frequency.max(1))) as u32;
        self.set_clock_divider(divider);
    }

    pub fn wait_interval(&self) -> Duration {
        self.wait_interval
    }

    fn ensure_address(&mut self, address: u8) -> Result<(), BusError> {
        check_address(address)?;
        if self.current_address != Some(address) {
            self.bsc.write(A, u32::from(address));
            self.current_address = Some(address);
        }
        Ok(())
    }

    fn start(&self, length: usize) {
        self.bsc.write(C, C_CLEAR_1);
        self.bsc.write(S, S_CLKT | S_ERR | S_DONE);
        self.bsc.write(DLEN, length as u32);
    }

    fn finish(&self, address: u8, remaining: usize) -> Result<(), BusError> {
        let status = self.bsc.read(S);
        self.bsc.write(S, S_DONE);

        if status & S_ERR != 0 {
            Err(BusError::Nack { address })
        } else if status & S_CLKT != 0 {
            Err(BusError::ClockStretchTimeout { address })
        } else if remaining > 0 {
            Err(BusError::IncompleteData { address, remaining })
        } else {
            Ok(())
        }
    }

    /// Move bytes from the RX FIFO while data is available
    fn drain_fifo(&self, buf: &mut [u8]) -> usize {
        let mut count = 0;
        while count < buf.len() && self.bsc.read(S) & S_RXD != 0 {
            buf[count] = self.bsc.read_fifo(FIFO) as u8;
            count += 1;
        }
        count
    }

    fn is_done(&self) -> bool {
        self.bsc.read(S) & S_DONE != 0
    }
}

impl<B: RegisterBackend> I2cBus for BscI2c<B> {
    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), BusError> {
        self.ensure_address(address)?;
        self.start(data.len());

        let mut bytes = data.iter();
        for &byte in bytes.by_ref().take(FIFO_SIZE) {
            self.bsc.write_fifo(FIFO, u32::from(byte));
        }
        self.bsc.write(C, C_I2CEN | C_ST);

        loop {
            while !bytes.as_slice().is_empty() && self.bsc.read(S) & S_TXD != 0 {
                if let Some(&byte) = bytes.next() {
                    self.bsc.write_fifo(FIFO, u32::from(byte));
                }
            }
            if self.is_done() {
                break;
            }
            thread::sleep(self.wait_interval);
        }

        self.finish(address, bytes.len())
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.ensure_address(address)?;
        self.start(buf.len());
        self.bsc.write(C, C_I2CEN | C_ST | C_READ);

        let mut received = 0;
        loop {
            received += self.drain_fifo(&mut buf[received..]);
            if self.is_done() {
                break;
            }
            thread::sleep(self.wait_interval);
        }
        received += self.drain_fifo(&mut buf[received..]);

        self.finish(address, buf.len() - received)
    }
}

impl<B: RegisterBackend> Drop for BscI2c<B> {
    fn drop(&mut self) {
        self.bsc.write(C, 0);
        let (sda, scl) = self.bus.pins();
        self.gpio.set_function(sda, FSEL_INPUT);
        self.gpio.set_function(scl, FSEL_INPUT);
        debug!("{:?} released", self.bus);
    }
}
