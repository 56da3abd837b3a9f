//! Bit-banged I2C master
//!
//! SDA is emulated as an open-drain line: the master pulls it low by
//! switching the pin to an output driving low, and releases it by switching
//! back to input so the pull-up raises it. SCL is driven push-pull, so
//! clock stretching by the slave is not supported.

use embedded_hal::delay::DelayNs;
use log::trace;
use raspio_hal::i2c::{check_address, I2cConfig};
use raspio_hal::{
    BidirectionalPin, BusError, GpioError, I2cBus, InputBinaryPin, OutputBinaryPin,
};

/// Software I2C master
#[derive(Debug)]
pub struct I2cBitBang<SDA, SCL, D> {
    sda: SDA,
    scl: SCL,
    delay: D,
    half_period_ns: u32,
}

impl<SDA, SCL, D> I2cBitBang<SDA, SCL, D>
where
    SDA: BidirectionalPin,
    SCL: OutputBinaryPin,
    D: DelayNs,
{
    pub fn new(sda: SDA, scl: SCL, delay: D, config: I2cConfig) -> Self {
        let frequency = config.frequency.max(1);
        Self {
            sda,
            scl,
            delay,
            half_period_ns: 500_000_000 / frequency,
        }
    }

    /// Give the pins back
    pub fn release(self) -> (SDA, SCL) {
        (self.sda, self.scl)
    }

    fn wait(&mut self) {
        self.delay.delay_ns(self.half_period_ns);
    }

    fn sda_release(&mut self) -> Result<(), GpioError> {
        self.sda.as_input()
    }

    fn sda_low(&mut self) -> Result<(), GpioError> {
        self.sda.as_output()?;
        self.sda.write(false)
    }

    fn sda_set(&mut self, high: bool) -> Result<(), GpioError> {
        if high {
            self.sda_release()
        } else {
            self.sda_low()
        }
    }

    /// Start or repeated start: SDA falls while SCL is high
    fn start(&mut self) -> Result<(), GpioError> {
        self.sda_release()?;
        self.scl.write(true)?;
        self.wait();
        self.sda_low()?;
        self.wait();
        self.scl.write(false)?;
        self.wait();
        Ok(())
    }

    /// Stop: SDA rises while SCL is high
    fn stop(&mut self) -> Result<(), GpioError> {
        self.sda_low()?;
        self.wait();
        self.scl.write(true)?;
        self.wait();
        self.sda_release()?;
        self.wait();
        Ok(())
    }

    fn write_bit(&mut self, bit: bool) -> Result<(), GpioError> {
        self.sda_set(bit)?;
        self.wait();
        self.scl.write(true)?;
        self.wait();
        self.scl.write(false)
    }

    fn read_bit(&mut self) -> Result<bool, GpioError> {
        self.sda_release()?;
        self.wait();
        self.scl.write(true)?;
        self.wait();
        let bit = self.sda.read()?;
        self.scl.write(false)?;
        Ok(bit)
    }

    /// Shift a byte out, returning whether the slave acknowledged it
    fn write_byte(&mut self, byte: u8) -> Result<bool, GpioError> {
        for i in (0..8).rev() {
            self.write_bit(byte >> i & 1 != 0)?;
        }
        Ok(!self.read_bit()?)
    }

    /// Shift a byte in, then acknowledge it or not
    fn read_byte(&mut self, ack: bool) -> Result<u8, GpioError> {
        let mut byte = 0u8;
        for _ in 0..8 {
            byte = byte << 1 | u8::from(self.read_bit()?);
        }
        self.write_bit(!ack)?;
        Ok(byte)
    }

    fn address(&mut self, address: u8, read: bool) -> Result<(), BusError> {
        self.start()?;
        if self.write_byte(address << 1 | u8::from(read))? {
            Ok(())
        } else {
            Err(BusError::Nack { address })
        }
    }

    fn transmit(&mut self, address: u8, data: &[u8]) -> Result<(), BusError> {
        self.address(address, false)?;
        for (sent, &byte) in data.iter().enumerate() {
            if !self.write_byte(byte)? {
                return Err(BusError::IncompleteData {
                    address,
                    remaining: data.len() - sent,
                });
            }
        }
        Ok(())
    }

    fn receive(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.address(address, true)?;
        let last = buf.len().saturating_sub(1);
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.read_byte(i < last)?;
        }
        Ok(())
    }

    /// Issue a stop whatever the outcome; the transfer error wins
    fn finish(&mut self, result: Result<(), BusError>) -> Result<(), BusError> {
        let stopped = self.stop();
        result?;
        stopped?;
        Ok(())
    }
}

impl<SDA, SCL, D> I2cBus for I2cBitBang<SDA, SCL, D>
where
    SDA: BidirectionalPin,
    SCL: OutputBinaryPin,
    D: DelayNs,
{
    fn write(&mut self, address: u8, data: &[u8]) -> Result<(), BusError> {
        check_address(address)?;
        trace!("i2c: write {} bytes to {address:#04x}", data.len());
        let result = self.transmit(address, data);
        self.finish(result)
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), BusError> {
        check_address(address)?;
        trace!("i2c: read {} bytes from {address:#04x}", buf.len());
        let result = self.receive(address, buf);
        self.finish(result)
    }

    fn write_read(
        &mut self,
        address: u8,
        write_data: &[u8],
        read_buf: &mut [u8],
    ) -> Result<(), BusError> {
        check_address(address)?;
        let result = self
            .transmit(address, write_data)
            .and_then(|()| self.receive(address, read_buf));
        self.finish(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::time::Duration;

    /// Two-wire bus with a scripted slave
    #[derive(Default)]
    struct Wire {
        scl: bool,
        master_driving: bool,
        master_level: bool,
        /// Bits the slave puts on SDA when the master samples it
        slave_bits: VecDeque<bool>,
        /// SDA level at every rising SCL edge
        sampled: Vec<bool>,
        starts: usize,
        stops: usize,
    }

    impl Wire {
        fn sda(&self) -> bool {
            !self.master_driving || self.master_level
        }

        fn update_sda(&mut self, change: impl FnOnce(&mut Self)) {
            let before = self.sda();
            change(self);
            let after = self.sda();
            if self.scl && before != after {
                if after {
                    self.stops += 1;
                } else {
                    self.starts += 1;
                }
            }
        }
    }

    type SharedWire = Rc<RefCell<Wire>>;

    struct Sda(SharedWire);

    impl OutputBinaryPin for Sda {
        fn write(&mut self, state: bool) -> Result<(), GpioError> {
            self.0.borrow_mut().update_sda(|w| w.master_level = state);
            Ok(())
        }
    }

    impl InputBinaryPin for Sda {
        fn read(&mut self) -> Result<bool, GpioError> {
            let mut wire = self.0.borrow_mut();
            let slave = wire.slave_bits.pop_front().unwrap_or(true);
            Ok(wire.sda() && slave)
        }

        fn wait(&mut self, _state: bool, _timeout: Option<Duration>) -> Result<(), GpioError> {
            Ok(())
        }
    }

    impl BidirectionalPin for Sda {
        fn as_input(&mut self) -> Result<(), GpioError> {
            self.0.borrow_mut().update_sda(|w| w.master_driving = false);
            Ok(())
        }

        fn as_output(&mut self) -> Result<(), GpioError> {
            self.0.borrow_mut().update_sda(|w| w.master_driving = true);
            Ok(())
        }
    }

    struct Scl(SharedWire);

    impl OutputBinaryPin for Scl {
        fn write(&mut self, state: bool) -> Result<(), GpioError> {
            let mut wire = self.0.borrow_mut();
            if state && !wire.scl {
                let level = wire.sda();
                wire.sampled.push(level);
            }
            wire.scl = state;
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn bus(slave_bits: &[bool]) -> (I2cBitBang<Sda, Scl, NoDelay>, SharedWire) {
        let wire = Rc::new(RefCell::new(Wire {
            scl: true,
            slave_bits: slave_bits.iter().copied().collect(),
            ..Wire::default()
        }));
        let bus = I2cBitBang::new(
            Sda(wire.clone()),
            Scl(wire.clone()),
            NoDelay,
            I2cConfig::STANDARD,
        );
        (bus, wire)
    }

    fn bits_of(byte: u8) -> Vec<bool> {
        (0..8).rev().map(|i| byte >> i & 1 != 0).collect()
    }

    /// Bytes clocked by the master, ignoring the acknowledge slots
    ///
    /// Only meaningful for a single start; the stop adds a trailing edge.
    fn frames(wire: &SharedWire) -> Vec<u8> {
        wire.borrow()
            .sampled
            .chunks_exact(9)
            .map(|frame| frame[..8].iter().fold(0u8, |b, &bit| b << 1 | u8::from(bit)))
            .collect()
    }

    #[test]
    fn test_half_period_from_frequency() {
        let (bus, _) = bus(&[]);
        assert_eq!(bus.half_period_ns, 5_000);
    }

    #[test]
    fn test_write_frames() {
        let (mut bus, wire) = bus(&[false, false, false]);
        I2cBus::write(&mut bus, 0x40, &[0xAA, 0x55]).unwrap();
        assert_eq!(frames(&wire), vec![0x80, 0xAA, 0x55]);
        let wire = wire.borrow();
        assert_eq!(wire.starts, 1);
        assert_eq!(wire.stops, 1);
    }

    #[test]
    fn test_address_nack() {
        let (mut bus, wire) = bus(&[]);
        assert!(matches!(
            I2cBus::write(&mut bus, 0x40, &[0x00]),
            Err(BusError::Nack { address: 0x40 })
        ));
        // Only the address went out and the bus was stopped
        assert_eq!(frames(&wire), vec![0x80]);
        assert_eq!(wire.borrow().stops, 1);
    }

    #[test]
    fn test_data_nack_reports_remaining() {
        let (mut bus, wire) = bus(&[false, false]);
        assert!(matches!(
            I2cBus::write(&mut bus, 0x20, &[1, 2, 3]),
            Err(BusError::IncompleteData {
                address: 0x20,
                remaining: 2
            })
        ));
        assert_eq!(wire.borrow().stops, 1);
    }

    #[test]
    fn test_read_acknowledges_all_but_last() {
        let mut slave = vec![false];
        slave.extend(bits_of(0xA5));
        slave.extend(bits_of(0x3C));
        let (mut bus, wire) = bus(&slave);

        let mut buf = [0u8; 2];
        I2cBus::read(&mut bus, 0x48, &mut buf).unwrap();
        assert_eq!(buf, [0xA5, 0x3C]);

        let wire = wire.borrow();
        // Address byte with the read bit set
        assert_eq!(frames_of(&wire.sampled[..9]), 0x91);
        // Master ACK after the first byte, NACK after the last
        assert!(!wire.sampled[17]);
        assert!(wire.sampled[26]);
        assert_eq!(wire.stops, 1);
    }

    fn frames_of(bits: &[bool]) -> u8 {
        bits[..8].iter().fold(0u8, |b, &bit| b << 1 | u8::from(bit))
    }

    #[test]
    fn test_write_read_uses_repeated_start() {
        let mut slave = vec![false, false, false];
        slave.extend(bits_of(0x58));
        let (mut bus, wire) = bus(&slave);

        let mut id = [0u8; 1];
        bus.write_read(0x76, &[0xD0], &mut id).unwrap();
        assert_eq!(id, [0x58]);

        let wire = wire.borrow();
        assert_eq!(wire.starts, 2);
        assert_eq!(wire.stops, 1);
        assert_eq!(frames_of(&wire.sampled[..9]), 0x76 << 1);
        // Edge 18 is the clock rising for the repeated start
        assert_eq!(frames_of(&wire.sampled[19..28]), 0x76 << 1 | 1);
    }

    #[test]
    fn test_invalid_address() {
        let (mut bus, wire) = bus(&[]);
        assert!(matches!(
            I2cBus::write(&mut bus, 0x80, &[]),
            Err(BusError::InvalidAddress(0x80))
        ));
        assert!(wire.borrow().sampled.is_empty());
    }
}
