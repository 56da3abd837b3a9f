//! Board identification from `/proc/cpuinfo`
//!
//! The `Hardware` line names the processor on older kernels; the
//! `Revision` code identifies the board. New-style revision codes (bit 23
//! set) also encode the processor, which newer kernels no longer report in
//! `Hardware`.

use std::fmt;
use std::fs;

use raspio_hal::{GpioError, Pinout};

use crate::registers::{
    BCM2708_PERIPHERALS_BASE, BCM2709_PERIPHERALS_BASE, BCM2711_PERIPHERALS_BASE,
};

pub const CPUINFO_PATH: &str = "/proc/cpuinfo";

/// Processor family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Processor {
    /// BCM2708 / BCM2835
    Bcm2708,
    /// BCM2709 / BCM2836 / BCM2837
    Bcm2709,
    /// BCM2711
    Bcm2711,
    Unknown,
}

impl Processor {
    /// Physical base address of the peripheral window
    pub const fn peripheral_base(self) -> Option<u64> {
        match self {
            Processor::Bcm2708 => Some(BCM2708_PERIPHERALS_BASE),
            Processor::Bcm2709 => Some(BCM2709_PERIPHERALS_BASE),
            Processor::Bcm2711 => Some(BCM2711_PERIPHERALS_BASE),
            Processor::Unknown => None,
        }
    }

    fn from_hardware(name: &str) -> Self {
        match name {
            "BCM2708" | "BCM2835" => Processor::Bcm2708,
            "BCM2709" | "BCM2836" | "BCM2837" => Processor::Bcm2709,
            "BCM2711" => Processor::Bcm2711,
            _ => Processor::Unknown,
        }
    }
}

/// Identified board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pub processor: Processor,
    /// Raw revision code, overvoltage flag removed
    pub revision: Option<u32>,
    /// Human-readable model name
    pub model: &'static str,
}

impl Board {
    /// Identify the board this process runs on
    pub fn detect() -> Result<Self, GpioError> {
        let text = fs::read_to_string(CPUINFO_PATH).map_err(|e| GpioError::file(CPUINFO_PATH, e))?;
        Ok(Self::parse(&text))
    }

    /// Identify a board from the contents of `/proc/cpuinfo`
    pub fn parse(cpuinfo: &str) -> Self {
        let mut hardware = None;
        let mut revision = None;
        for line in cpuinfo.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            match key.trim() {
                "Hardware" => hardware = Some(value.trim()),
                "Revision" => revision = u32::from_str_radix(value.trim(), 16).ok(),
                _ => {}
            }
        }

        let revision = revision.map(|code| {
            if is_new_style(code) {
                code
            } else {
                code & 0x00ff_ffff
            }
        });

        let mut processor = hardware.map_or(Processor::Unknown, Processor::from_hardware);
        if let Some(code) = revision.filter(|&code| is_new_style(code)) {
            processor = match (code >> 12) & 0xf {
                0 => Processor::Bcm2708,
                1 | 2 => Processor::Bcm2709,
                3 => Processor::Bcm2711,
                _ => processor,
            };
        }

        Self {
            processor,
            revision,
            model: revision.map_or("unknown", model_name),
        }
    }

    /// Check if this looks like a Raspberry Pi
    pub fn is_raspberry_pi(&self) -> bool {
        self.processor != Processor::Unknown && self.revision.is_some()
    }

    /// Connector layout of this board
    ///
    /// Unknown boards get the 40-pin layout shared by every board since the
    /// B+.
    pub fn pinout(&self) -> Pinout {
        match self.revision {
            Some(code) if is_new_style(code) => Pinout::Plus,
            Some(0x0002 | 0x0003) => Pinout::Rev1,
            Some(0x0004..=0x000f) => Pinout::Rev2,
            _ => Pinout::Plus,
        }
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}", self.model, self.processor)?;
        if let Some(code) = self.revision {
            write!(f, ", revision {code:04x}")?;
        }
        write!(f, ", {:?} pinout)", self.pinout())
    }
}

const fn is_new_style(code: u32) -> bool {
    code & (1 << 23) != 0
}

fn model_name(code: u32) -> &'static str {
    if is_new_style(code) {
        return match (code >> 4) & 0xff {
            0x00 => "Raspberry Pi A",
            0x01 => "Raspberry Pi B",
            0x02 => "Raspberry Pi A+",
            0x03 => "Raspberry Pi B+",
            0x04 => "Raspberry Pi 2 B",
            0x06 => "Compute Module 1",
            0x08 => "Raspberry Pi 3 B",
            0x09 => "Raspberry Pi Zero",
            0x0a => "Compute Module 3",
            0x0c => "Raspberry Pi Zero W",
            0x0d => "Raspberry Pi 3 B+",
            0x0e => "Raspberry Pi 3 A+",
            0x10 => "Compute Module 3+",
            0x11 => "Raspberry Pi 4 B",
            0x12 => "Raspberry Pi Zero 2 W",
            0x13 => "Raspberry Pi 400",
            0x14 => "Compute Module 4",
            _ => "Raspberry Pi (unknown model)",
        };
    }
    match code {
        0x0002 | 0x0003 => "Raspberry Pi B rev 1",
        0x0004..=0x0006 | 0x000d..=0x000f => "Raspberry Pi B rev 2",
        0x0007..=0x0009 => "Raspberry Pi A",
        0x0010 | 0x0013 => "Raspberry Pi B+",
        0x0011 | 0x0014 => "Compute Module 1",
        0x0012 | 0x0015 => "Raspberry Pi A+",
        _ => "Raspberry Pi (unknown model)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PI1_REV2: &str = "\
processor	: 0
model name	: ARMv6-compatible processor rev 7 (v6l)
Hardware	: BCM2708
Revision	: 000e
Serial		: 00000000deadbeef
";

    const PI3_NEW_KERNEL: &str = "\
processor	: 3
BogoMIPS	: 38.40
Hardware	: BCM2835
Revision	: a02082
Model		: Raspberry Pi 3 Model B Rev 1.2
";

    #[test]
    fn test_old_style_revision() {
        let board = Board::parse(PI1_REV2);
        assert_eq!(board.processor, Processor::Bcm2708);
        assert_eq!(board.revision, Some(0x000e));
        assert_eq!(board.pinout(), Pinout::Rev2);
        assert!(board.is_raspberry_pi());
        assert_eq!(board.processor.peripheral_base(), Some(0x2000_0000));
    }

    #[test]
    fn test_new_style_revision_overrides_hardware() {
        let board = Board::parse(PI3_NEW_KERNEL);
        assert_eq!(board.processor, Processor::Bcm2709);
        assert_eq!(board.model, "Raspberry Pi 3 B");
        assert_eq!(board.pinout(), Pinout::Plus);
        assert_eq!(board.processor.peripheral_base(), Some(0x3F00_0000));
    }

    #[test]
    fn test_overvoltage_flag_is_ignored() {
        let board = Board::parse("Hardware : BCM2708\nRevision : 1000002\n");
        assert_eq!(board.revision, Some(0x0002));
        assert_eq!(board.pinout(), Pinout::Rev1);
    }

    #[test]
    fn test_third_party_board() {
        let board = Board::parse("processor : 0\nHardware : Allwinner sun8i Family\n");
        assert_eq!(board.processor, Processor::Unknown);
        assert!(!board.is_raspberry_pi());
        assert_eq!(board.processor.peripheral_base(), None);
    }
}
