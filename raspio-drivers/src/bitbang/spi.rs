//! Bit-banged SPI master
//!
//! Four pins: clock and slave select are outputs, the data input and data
//! output lines are optional so that read-only and write-only peripherals
//! (shift registers, ADCs with a single data line) can be driven.
//!
//! Clock idles low and data is sampled after the falling edge, which suits
//! the simple parts this master is used for (74HC595, MCP3008 and friends).
//!
//! # Example
//!
//! ```ignore
//! let mut spi = SpiConnection::new(clock, select, Some(miso), Some(mosi), StdDelay::new());
//! let mut device = spi.select_slave()?;
//! device.write_u8(0x80, 8)?;
//! let sample = device.read_u16(10)?;
//! ```

use core::ops::{Deref, DerefMut};

use embedded_hal::delay::DelayNs;
use log::warn;
use raspio_hal::spi::check_transfer_lengths;
use raspio_hal::{BusError, Endianness, InputBinaryPin, OutputBinaryPin, SpiBus};

use crate::error::BitBangError;

/// Default half clock period in nanoseconds
pub const DEFAULT_SYNC_DELAY_NS: u32 = 1_000;

/// Software SPI master
#[derive(Debug)]
pub struct SpiConnection<CLK, SS, MISO, MOSI, D> {
    clock: CLK,
    select: SS,
    miso: Option<MISO>,
    mosi: Option<MOSI>,
    delay: D,
    endianness: Endianness,
    sync_delay_ns: u32,
}

impl<CLK, SS, MISO, MOSI, D> SpiConnection<CLK, SS, MISO, MOSI, D>
where
    CLK: OutputBinaryPin,
    SS: OutputBinaryPin,
    MISO: InputBinaryPin,
    MOSI: OutputBinaryPin,
    D: DelayNs,
{
    /// Create a connection, most significant bit first
    pub fn new(clock: CLK, select: SS, miso: Option<MISO>, mosi: Option<MOSI>, delay: D) -> Self {
        Self {
            clock,
            select,
            miso,
            mosi,
            delay,
            endianness: Endianness::BigEndian,
            sync_delay_ns: DEFAULT_SYNC_DELAY_NS,
        }
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Time the clock is held high on each pulse
    pub fn with_sync_delay_ns(mut self, ns: u32) -> Self {
        self.sync_delay_ns = ns;
        self
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Give the pins back
    pub fn release(self) -> (CLK, SS, Option<MISO>, Option<MOSI>) {
        (self.clock, self.select, self.miso, self.mosi)
    }

    /// Pull slave select low until the returned guard is dropped
    pub fn select_slave(&mut self) -> Result<SlaveSelect<'_, CLK, SS, MISO, MOSI, D>, BitBangError> {
        self.select.write(false)?;
        Ok(SlaveSelect { connection: self })
    }

    fn pulse_clock(&mut self) -> Result<(), BitBangError> {
        self.clock.write(true)?;
        self.delay.delay_ns(self.sync_delay_ns);
        self.clock.write(false)?;
        Ok(())
    }

    /// Put one bit on the data output and clock it out
    pub fn write_bit(&mut self, bit: bool) -> Result<(), BitBangError> {
        self.mosi
            .as_mut()
            .ok_or(BitBangError::NoDataOutput)?
            .write(bit)?;
        self.pulse_clock()
    }

    /// Clock one bit in from the data input
    pub fn read_bit(&mut self) -> Result<bool, BitBangError> {
        if self.miso.is_none() {
            return Err(BitBangError::NoDataInput);
        }
        self.pulse_clock()?;
        let miso = self.miso.as_mut().ok_or(BitBangError::NoDataInput)?;
        Ok(miso.read()?)
    }

    /// Write the low `bit_count` bits of `value`
    pub fn write_bits(&mut self, value: u64, bit_count: u32) -> Result<(), BitBangError> {
        check_bit_count(bit_count, u64::BITS)?;
        for i in 0..bit_count {
            let index = self.endianness.bit_index(i, bit_count);
            self.write_bit(value >> index & 1 != 0)?;
        }
        Ok(())
    }

    /// Read `bit_count` bits into the low bits of the result
    pub fn read_bits(&mut self, bit_count: u32) -> Result<u64, BitBangError> {
        check_bit_count(bit_count, u64::BITS)?;
        let mut value = 0u64;
        for i in 0..bit_count {
            if self.read_bit()? {
                value |= 1 << self.endianness.bit_index(i, bit_count);
            }
        }
        Ok(value)
    }

    pub fn write_u8(&mut self, value: u8, bit_count: u32) -> Result<(), BitBangError> {
        check_bit_count(bit_count, u8::BITS)?;
        self.write_bits(u64::from(value), bit_count)
    }

    pub fn write_u16(&mut self, value: u16, bit_count: u32) -> Result<(), BitBangError> {
        check_bit_count(bit_count, u16::BITS)?;
        self.write_bits(u64::from(value), bit_count)
    }

    pub fn read_u8(&mut self, bit_count: u32) -> Result<u8, BitBangError> {
        check_bit_count(bit_count, u8::BITS)?;
        Ok(self.read_bits(bit_count)? as u8)
    }

    pub fn read_u16(&mut self, bit_count: u32) -> Result<u16, BitBangError> {
        check_bit_count(bit_count, u16::BITS)?;
        Ok(self.read_bits(bit_count)? as u16)
    }

    /// Shift one byte out while shifting one in
    fn transfer_byte(&mut self, out: u8) -> Result<u8, BitBangError> {
        if self.miso.is_none() {
            return Err(BitBangError::NoDataInput);
        }
        let mut value = 0u8;
        for i in 0..u8::BITS {
            let index = self.endianness.bit_index(i, u8::BITS);
            if let Some(mosi) = self.mosi.as_mut() {
                mosi.write(out >> index & 1 != 0)?;
            }
            self.pulse_clock()?;
            let miso = self.miso.as_mut().ok_or(BitBangError::NoDataInput)?;
            if miso.read()? {
                value |= 1 << index;
            }
        }
        Ok(value)
    }
}

fn check_bit_count(requested: u32, width: u32) -> Result<(), BitBangError> {
    if requested > width {
        Err(BitBangError::BitCountOutOfRange { requested, width })
    } else {
        Ok(())
    }
}

/// Selected slave; slave select goes high again on drop
pub struct SlaveSelect<'a, CLK, SS, MISO, MOSI, D>
where
    SS: OutputBinaryPin,
{
    connection: &'a mut SpiConnection<CLK, SS, MISO, MOSI, D>,
}

impl<CLK, SS, MISO, MOSI, D> Deref for SlaveSelect<'_, CLK, SS, MISO, MOSI, D>
where
    SS: OutputBinaryPin,
{
    type Target = SpiConnection<CLK, SS, MISO, MOSI, D>;

    fn deref(&self) -> &Self::Target {
        self.connection
    }
}

impl<CLK, SS, MISO, MOSI, D> DerefMut for SlaveSelect<'_, CLK, SS, MISO, MOSI, D>
where
    SS: OutputBinaryPin,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connection
    }
}

impl<CLK, SS, MISO, MOSI, D> Drop for SlaveSelect<'_, CLK, SS, MISO, MOSI, D>
where
    SS: OutputBinaryPin,
{
    fn drop(&mut self) {
        if let Err(e) = self.connection.select.write(true) {
            warn!("deselecting SPI slave: {e}");
        }
    }
}

impl<CLK, SS, MISO, MOSI, D> SpiBus for SpiConnection<CLK, SS, MISO, MOSI, D>
where
    CLK: OutputBinaryPin,
    SS: OutputBinaryPin,
    MISO: InputBinaryPin,
    MOSI: OutputBinaryPin,
    D: DelayNs,
{
    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), BusError> {
        check_transfer_lengths(read, write)?;
        if self.miso.is_none() && !read.is_empty() {
            return Err(BitBangError::NoDataInput.into());
        }
        let mut device = self.select_slave()?;
        for (incoming, &outgoing) in read.iter_mut().zip(write) {
            *incoming = device.transfer_byte(outgoing)?;
        }
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), BusError> {
        let mut device = self.select_slave()?;
        for &byte in data {
            device.write_u8(byte, u8::BITS)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use raspio_hal::GpioError;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Line {
        Clock,
        Select,
        Mosi,
    }

    type Log = Rc<RefCell<Vec<(Line, bool)>>>;

    struct RecordingPin {
        line: Line,
        log: Log,
    }

    impl OutputBinaryPin for RecordingPin {
        fn write(&mut self, state: bool) -> Result<(), GpioError> {
            self.log.borrow_mut().push((self.line, state));
            Ok(())
        }
    }

    /// Data input answering from a queue, low once exhausted
    struct ScriptedInput {
        bits: VecDeque<bool>,
    }

    impl InputBinaryPin for ScriptedInput {
        fn read(&mut self) -> Result<bool, GpioError> {
            Ok(self.bits.pop_front().unwrap_or(false))
        }

        fn wait(&mut self, _state: bool, _timeout: Option<core::time::Duration>) -> Result<(), GpioError> {
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    type TestConnection = SpiConnection<RecordingPin, RecordingPin, ScriptedInput, RecordingPin, NoDelay>;

    fn connection(miso_bits: &[bool]) -> (TestConnection, Log) {
        let log: Log = Rc::default();
        let pin = |line| RecordingPin {
            line,
            log: log.clone(),
        };
        let spi = SpiConnection::new(
            pin(Line::Clock),
            pin(Line::Select),
            Some(ScriptedInput {
                bits: miso_bits.iter().copied().collect(),
            }),
            Some(pin(Line::Mosi)),
            NoDelay,
        );
        (spi, log)
    }

    fn mosi_bits(log: &Log) -> Vec<bool> {
        log.borrow()
            .iter()
            .filter(|(line, _)| *line == Line::Mosi)
            .map(|&(_, value)| value)
            .collect()
    }

    fn clock_pulses(log: &Log) -> usize {
        log.borrow()
            .iter()
            .filter(|&&entry| entry == (Line::Clock, true))
            .count()
    }

    #[test]
    fn test_write_bit_sets_data_before_clock() {
        let (mut spi, log) = connection(&[]);
        spi.write_bit(true).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![(Line::Mosi, true), (Line::Clock, true), (Line::Clock, false)]
        );
    }

    #[test]
    fn test_big_endian_write() {
        let (mut spi, log) = connection(&[]);
        spi.write_u8(0b1010_0001, 8).unwrap();
        assert_eq!(
            mosi_bits(&log),
            vec![true, false, true, false, false, false, false, true]
        );
        assert_eq!(clock_pulses(&log), 8);
    }

    #[test]
    fn test_little_endian_partial_write() {
        let (spi, log) = connection(&[]);
        let mut spi = spi.with_endianness(Endianness::LittleEndian);
        spi.write_u16(0b110, 3).unwrap();
        assert_eq!(mosi_bits(&log), vec![false, true, true]);
    }

    #[test]
    fn test_read_bits() {
        let (mut spi, log) = connection(&[true, false, true, true]);
        assert_eq!(spi.read_u8(4).unwrap(), 0b1011);
        assert_eq!(clock_pulses(&log), 4);

        let (spi, _) = connection(&[true, false, true, true]);
        let mut spi = spi.with_endianness(Endianness::LittleEndian);
        assert_eq!(spi.read_u8(4).unwrap(), 0b1101);
    }

    #[test]
    fn test_bit_count_bounded_by_width() {
        let (mut spi, log) = connection(&[]);
        assert!(matches!(
            spi.write_u8(0, 9),
            Err(BitBangError::BitCountOutOfRange {
                requested: 9,
                width: 8
            })
        ));
        assert!(matches!(
            spi.read_u16(17),
            Err(BitBangError::BitCountOutOfRange { .. })
        ));
        assert!(spi.write_bits(0, 65).is_err());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_missing_data_pins() {
        let log: Log = Rc::default();
        let pin = |line| RecordingPin {
            line,
            log: log.clone(),
        };
        let mut spi: TestConnection =
            SpiConnection::new(pin(Line::Clock), pin(Line::Select), None, None, NoDelay);
        assert!(matches!(spi.write_bit(true), Err(BitBangError::NoDataOutput)));
        assert!(matches!(spi.read_bit(), Err(BitBangError::NoDataInput)));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_select_guard_deselects_on_error() {
        let (mut spi, log) = connection(&[]);
        {
            let mut device = spi.select_slave().unwrap();
            assert!(device.write_u8(0, 9).is_err());
        }
        assert_eq!(
            *log.borrow(),
            vec![(Line::Select, false), (Line::Select, true)]
        );
    }

    #[test]
    fn test_spi_bus_transfer() {
        // Device answers 0x5A
        let answer = [false, true, false, true, true, false, true, false];
        let (mut spi, log) = connection(&answer);
        let mut read = [0u8; 1];
        SpiBus::transfer(&mut spi, &mut read, &[0xC3]).unwrap();
        assert_eq!(read, [0x5A]);
        assert_eq!(
            mosi_bits(&log),
            vec![true, true, false, false, false, false, true, true]
        );
        let entries = log.borrow();
        assert_eq!(entries.first(), Some(&(Line::Select, false)));
        assert_eq!(entries.last(), Some(&(Line::Select, true)));
    }

    #[test]
    fn test_spi_bus_transfer_without_data_input_touches_nothing() {
        let log: Log = Rc::default();
        let pin = |line| RecordingPin {
            line,
            log: log.clone(),
        };
        let mut spi: TestConnection =
            SpiConnection::new(pin(Line::Clock), pin(Line::Select), None, Some(pin(Line::Mosi)), NoDelay);

        let mut read = [0u8; 2];
        assert!(SpiBus::transfer(&mut spi, &mut read, &[0xA5, 0x5A]).is_err());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_spi_bus_length_mismatch() {
        let (mut spi, log) = connection(&[]);
        let mut read = [0u8; 2];
        assert!(matches!(
            SpiBus::transfer(&mut spi, &mut read, &[1]),
            Err(BusError::LengthMismatch { read: 2, write: 1 })
        ));
        assert!(log.borrow().is_empty());
    }

    proptest! {
        #[test]
        fn test_write_bits_order(value in any::<u16>(), bit_count in 0u32..=16) {
            let (mut spi, log) = connection(&[]);
            spi.write_u16(value, bit_count).unwrap();
            let bits = mosi_bits(&log);
            prop_assert_eq!(bits.len(), bit_count as usize);
            let mut rebuilt = 0u16;
            for bit in bits {
                rebuilt = rebuilt << 1 | u16::from(bit);
            }
            let mask = if bit_count == 16 { u16::MAX } else { (1u16 << bit_count) - 1 };
            prop_assert_eq!(rebuilt, value & mask);
        }
    }
}
