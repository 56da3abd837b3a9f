//! BCM283x peripheral addresses and register layout
//!
//! Offsets are in bytes from the start of the mapped block.

/// Size of each mapped peripheral window
pub const BLOCK_SIZE: usize = 4096;

/// Peripheral base of BCM2708/BCM2835 (Raspberry Pi 1, Zero)
pub const BCM2708_PERIPHERALS_BASE: u64 = 0x2000_0000;
/// Peripheral base of BCM2709/BCM2836/BCM2837 (Raspberry Pi 2, 3)
pub const BCM2709_PERIPHERALS_BASE: u64 = 0x3F00_0000;
/// Peripheral base of BCM2711 (Raspberry Pi 4)
pub const BCM2711_PERIPHERALS_BASE: u64 = 0xFE00_0000;

/// GPIO block offset from the peripheral base
pub const GPIO_OFFSET: u64 = 0x20_0000;
/// BSC0 (I2C bus 0) offset from the peripheral base
pub const BSC0_OFFSET: u64 = 0x20_5000;
/// BSC1 (I2C bus 1) offset from the peripheral base
pub const BSC1_OFFSET: u64 = 0x80_4000;

/// GPIO register offsets and field values
pub mod gpio {
    /// Function select, 10 pins per word
    pub const GPFSEL0: usize = 0x00;
    /// Output set, 32 pins per word
    pub const GPSET0: usize = 0x1c;
    /// Output clear, 32 pins per word
    pub const GPCLR0: usize = 0x28;
    /// Pin level, 32 pins per word
    pub const GPLEV0: usize = 0x34;
    /// Pull-up/down control
    pub const GPPUD: usize = 0x94;
    /// Pull-up/down clock, 32 pins per word
    pub const GPPUDCLK0: usize = 0x98;

    pub const FSEL_INPUT: u32 = 0b000;
    pub const FSEL_OUTPUT: u32 = 0b001;
    pub const FSEL_ALT0: u32 = 0b100;
    pub const FSEL_MASK: u32 = 0b111;

    pub const PUD_OFF: u32 = 0;
    pub const PUD_DOWN: u32 = 1;
    pub const PUD_UP: u32 = 2;
}

/// Broadcom Serial Controller (I2C master) registers
pub mod bsc {
    /// Control
    pub const C: usize = 0x00;
    /// Status
    pub const S: usize = 0x04;
    /// Data length
    pub const DLEN: usize = 0x08;
    /// Slave address
    pub const A: usize = 0x0c;
    /// Data FIFO
    pub const FIFO: usize = 0x10;
    /// Clock divider
    pub const DIV: usize = 0x14;
    /// Data delay
    pub const DEL: usize = 0x18;
    /// Clock stretch timeout
    pub const CLKT: usize = 0x1c;

    pub const C_I2CEN: u32 = 0x0000_8000;
    pub const C_INTR: u32 = 0x0000_0400;
    pub const C_INTT: u32 = 0x0000_0200;
    pub const C_INTD: u32 = 0x0000_0100;
    pub const C_ST: u32 = 0x0000_0080;
    pub const C_CLEAR_1: u32 = 0x0000_0020;
    pub const C_READ: u32 = 0x0000_0001;

    pub const S_CLKT: u32 = 0x0000_0200;
    pub const S_ERR: u32 = 0x0000_0100;
    pub const S_RXF: u32 = 0x0000_0080;
    pub const S_TXE: u32 = 0x0000_0040;
    pub const S_RXD: u32 = 0x0000_0020;
    pub const S_TXD: u32 = 0x0000_0010;
    pub const S_RXR: u32 = 0x0000_0008;
    pub const S_TXW: u32 = 0x0000_0004;
    pub const S_DONE: u32 = 0x0000_0002;
    pub const S_TA: u32 = 0x0000_0001;

    /// Depth of the TX and RX FIFOs
    pub const FIFO_SIZE: usize = 16;

    /// Core clock feeding the divider
    pub const CORE_CLOCK_HZ: u64 = 250_000_000;
    /// Divider for 100 kHz
    pub const DEFAULT_CLOCK_DIVIDER: u32 = 2500;
}

/// Function-select word offset and bit shift of a pin
pub const fn fsel_location(pin: u8) -> (usize, u32) {
    let word = (pin / 10) as usize;
    let shift = (pin % 10) as u32 * 3;
    (gpio::GPFSEL0 + 4 * word, shift)
}

/// Word offset and bit mask of a pin in a 32-pins-per-word register bank
pub const fn bank_location(base: usize, pin: u8) -> (usize, u32) {
    (base + 4 * (pin / 32) as usize, 1u32 << (pin % 32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fsel_location() {
        assert_eq!(fsel_location(0), (0x00, 0));
        assert_eq!(fsel_location(9), (0x00, 27));
        assert_eq!(fsel_location(17), (0x04, 21));
        assert_eq!(fsel_location(53), (0x14, 9));
    }

    #[test]
    fn test_bank_location() {
        assert_eq!(bank_location(gpio::GPSET0, 4), (0x1c, 1 << 4));
        assert_eq!(bank_location(gpio::GPCLR0, 35), (0x2c, 1 << 3));
        assert_eq!(bank_location(gpio::GPLEV0, 31), (0x34, 1 << 31));
    }

    proptest! {
        #[test]
        fn prop_fsel_fields_do_not_overlap(a in 0u8..64, b in 0u8..64) {
            let (offset, shift) = fsel_location(a);
            prop_assert!(offset < gpio::GPSET0);
            prop_assert!(shift <= 27);
            if a != b {
                let (other_offset, other_shift) = fsel_location(b);
                prop_assert!(offset != other_offset || shift != other_shift);
            }
        }

        #[test]
        fn prop_bank_location_covers_both_words(pin in 0u8..64) {
            let (offset, mask) = bank_location(gpio::GPLEV0, pin);
            prop_assert_eq!(offset, gpio::GPLEV0 + if pin < 32 { 0 } else { 4 });
            prop_assert_eq!(mask.count_ones(), 1);
            prop_assert_eq!(mask.trailing_zeros(), u32::from(pin % 32));
        }
    }
}
