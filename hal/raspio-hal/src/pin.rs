//! Pin identifiers
//!
//! A [`ProcessorPin`] names a GPIO line of the SoC. A [`ConnectorPin`] names
//! a position on one of the board headers. The two are linked by a
//! [`Pinout`], which depends on the board revision.

use core::fmt;
use core::str::FromStr;

use crate::error::GpioError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of GPIO lines addressable by a [`ProcessorPins`] mask
pub const PROCESSOR_PIN_COUNT: u8 = 64;

/// A GPIO line of the processor (0-63)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct ProcessorPin(u8);

impl ProcessorPin {
    /// Create a processor pin
    ///
    /// Returns `None` for lines outside 0-63.
    pub const fn new(line: u8) -> Option<Self> {
        if line < PROCESSOR_PIN_COUNT {
            Some(Self(line))
        } else {
            None
        }
    }

    /// GPIO line number
    pub const fn number(self) -> u8 {
        self.0
    }

    /// Single-pin mask
    pub const fn mask(self) -> ProcessorPins {
        ProcessorPins(1u64 << self.0)
    }

    pub const P0: Self = Self(0);
    pub const P1: Self = Self(1);
    pub const P2: Self = Self(2);
    pub const P3: Self = Self(3);
    pub const P4: Self = Self(4);
    pub const P5: Self = Self(5);
    pub const P6: Self = Self(6);
    pub const P7: Self = Self(7);
    pub const P8: Self = Self(8);
    pub const P9: Self = Self(9);
    pub const P10: Self = Self(10);
    pub const P11: Self = Self(11);
    pub const P12: Self = Self(12);
    pub const P13: Self = Self(13);
    pub const P14: Self = Self(14);
    pub const P15: Self = Self(15);
    pub const P16: Self = Self(16);
    pub const P17: Self = Self(17);
    pub const P18: Self = Self(18);
    pub const P19: Self = Self(19);
    pub const P20: Self = Self(20);
    pub const P21: Self = Self(21);
    pub const P22: Self = Self(22);
    pub const P23: Self = Self(23);
    pub const P24: Self = Self(24);
    pub const P25: Self = Self(25);
    pub const P26: Self = Self(26);
    pub const P27: Self = Self(27);
    pub const P28: Self = Self(28);
    pub const P29: Self = Self(29);
    pub const P30: Self = Self(30);
    pub const P31: Self = Self(31);
}

impl TryFrom<u8> for ProcessorPin {
    type Error = GpioError;

    fn try_from(line: u8) -> Result<Self, Self::Error> {
        Self::new(line).ok_or(GpioError::InvalidPin(line))
    }
}

impl From<ProcessorPin> for u8 {
    fn from(pin: ProcessorPin) -> Self {
        pin.0
    }
}

impl fmt::Display for ProcessorPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

/// A set of processor pins, one bit per line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ProcessorPins(u64);

impl ProcessorPins {
    /// Empty set
    pub const NONE: Self = Self(0);

    /// Build a set from its raw bit representation
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bit representation
    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, pin: ProcessorPin) -> bool {
        self.0 & (1u64 << pin.0) != 0
    }

    pub fn insert(&mut self, pin: ProcessorPin) {
        self.0 |= 1u64 << pin.0;
    }

    pub fn remove(&mut self, pin: ProcessorPin) {
        self.0 &= !(1u64 << pin.0);
    }

    /// Bits of the given 32-pin register bank (0 for pins 0-31, 1 for 32-63)
    pub const fn bank(self, bank: usize) -> u32 {
        (self.0 >> (32 * bank)) as u32
    }

    /// Iterate the pins in ascending order
    pub fn iter(self) -> impl Iterator<Item = ProcessorPin> {
        (0..PROCESSOR_PIN_COUNT)
            .filter(move |line| self.0 & (1u64 << line) != 0)
            .map(ProcessorPin)
    }
}

impl core::ops::BitAnd for ProcessorPins {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl core::ops::BitOr for ProcessorPins {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitXor for ProcessorPins {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl core::ops::Not for ProcessorPins {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl FromIterator<ProcessorPin> for ProcessorPins {
    fn from_iter<I: IntoIterator<Item = ProcessorPin>>(iter: I) -> Self {
        let mut pins = Self::NONE;
        for pin in iter {
            pins.insert(pin);
        }
        pins
    }
}

/// Board header carrying connector pins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Header {
    /// Main GPIO header (26 pins on Rev1/Rev2, 40 pins on Plus boards)
    P1,
    /// Auxiliary header present on Rev2 boards only
    P5,
}

/// A position on a board header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectorPin {
    header: Header,
    position: u8,
}

impl ConnectorPin {
    /// Pin on the main header
    pub const fn p1(position: u8) -> Self {
        Self {
            header: Header::P1,
            position,
        }
    }

    /// Pin on the auxiliary header
    pub const fn p5(position: u8) -> Self {
        Self {
            header: Header::P5,
            position,
        }
    }

    pub const fn header(self) -> Header {
        self.header
    }

    pub const fn position(self) -> u8 {
        self.position
    }

    /// Resolve to the processor pin for the given pinout
    pub fn to_processor(self, pinout: Pinout) -> Result<ProcessorPin, GpioError> {
        pinout
            .table()
            .iter()
            .find(|(connector, _)| *connector == self)
            .map(|&(_, processor)| processor)
            .ok_or(GpioError::UnmappedConnectorPin { pin: self, pinout })
    }

    /// Find the connector pin wired to a processor pin for the given pinout
    pub fn from_processor(pin: ProcessorPin, pinout: Pinout) -> Result<Self, GpioError> {
        pinout
            .table()
            .iter()
            .find(|(_, processor)| *processor == pin)
            .map(|&(connector, _)| connector)
            .ok_or(GpioError::UnmappedProcessorPin { pin, pinout })
    }
}

impl fmt::Display for ConnectorPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}-{:02}", self.header, self.position)
    }
}

impl FromStr for ConnectorPin {
    type Err = GpioError;

    /// Parse `"P1-11"`, `"P1-03"` or `"P5-04"` (case-insensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GpioError::InvalidConnectorPin(s.to_string());
        let upper = s.trim().to_ascii_uppercase();
        let (header, position) = upper.split_once('-').ok_or_else(invalid)?;
        let position: u8 = position.parse().map_err(|_| invalid())?;
        match header {
            "P1" if (1..=40).contains(&position) => Ok(Self::p1(position)),
            "P5" if (1..=8).contains(&position) => Ok(Self::p5(position)),
            _ => Err(invalid()),
        }
    }
}

/// Board connector pinout revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Pinout {
    /// Model B revision 1 (26-pin P1)
    Rev1,
    /// Model A/B revision 2 (26-pin P1 and 8-pin P5)
    #[default]
    Rev2,
    /// A+/B+/2/3/Zero boards (40-pin P1)
    Plus,
}

const fn map(position: u8, line: u8) -> (ConnectorPin, ProcessorPin) {
    (ConnectorPin::p1(position), ProcessorPin(line))
}

const fn map_p5(position: u8, line: u8) -> (ConnectorPin, ProcessorPin) {
    (ConnectorPin::p5(position), ProcessorPin(line))
}

const REV1: &[(ConnectorPin, ProcessorPin)] = &[
    map(3, 0),
    map(5, 1),
    map(7, 4),
    map(8, 14),
    map(10, 15),
    map(11, 17),
    map(12, 18),
    map(13, 21),
    map(15, 22),
    map(16, 23),
    map(18, 24),
    map(19, 10),
    map(21, 9),
    map(22, 25),
    map(23, 11),
    map(24, 8),
    map(26, 7),
];

const REV2: &[(ConnectorPin, ProcessorPin)] = &[
    map(3, 2),
    map(5, 3),
    map(7, 4),
    map(8, 14),
    map(10, 15),
    map(11, 17),
    map(12, 18),
    map(13, 27),
    map(15, 22),
    map(16, 23),
    map(18, 24),
    map(19, 10),
    map(21, 9),
    map(22, 25),
    map(23, 11),
    map(24, 8),
    map(26, 7),
    map_p5(3, 28),
    map_p5(4, 29),
    map_p5(5, 30),
    map_p5(6, 31),
];

const PLUS: &[(ConnectorPin, ProcessorPin)] = &[
    map(3, 2),
    map(5, 3),
    map(7, 4),
    map(8, 14),
    map(10, 15),
    map(11, 17),
    map(12, 18),
    map(13, 27),
    map(15, 22),
    map(16, 23),
    map(18, 24),
    map(19, 10),
    map(21, 9),
    map(22, 25),
    map(23, 11),
    map(24, 8),
    map(26, 7),
    map(27, 0),
    map(28, 1),
    map(29, 5),
    map(31, 6),
    map(32, 12),
    map(33, 13),
    map(35, 19),
    map(36, 16),
    map(37, 26),
    map(38, 20),
    map(40, 21),
];

impl Pinout {
    /// Connector to processor mapping of this revision
    pub fn table(self) -> &'static [(ConnectorPin, ProcessorPin)] {
        match self {
            Pinout::Rev1 => REV1,
            Pinout::Rev2 => REV2,
            Pinout::Plus => PLUS,
        }
    }
}

impl FromStr for Pinout {
    type Err = GpioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rev1" => Ok(Pinout::Rev1),
            "rev2" => Ok(Pinout::Rev2),
            "plus" => Ok(Pinout::Plus),
            _ => Err(GpioError::InvalidPinout(s.to_string())),
        }
    }
}
