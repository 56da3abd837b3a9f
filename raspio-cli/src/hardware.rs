//! Driver and pin resolution for the command line

use std::sync::Arc;

use clap::ValueEnum;
use log::{debug, info};
use raspio_core::MockDriver;
use raspio_hal::{ConnectorPin, DriverCapabilities, GpioDriver, GpioError, Pinout, ProcessorPin};
use raspio_hal_bcm::{open_driver, select_driver, Board, DriverKind};

use crate::config::MOCK_DRIVER;

/// Driver requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DriverChoice {
    /// Most capable driver available on this machine
    Auto,
    /// Registers with kernel edge detection
    Bcm,
    /// Registers only
    Memory,
    /// GPIO pseudo-filesystem
    Sysfs,
    /// In-memory pins, no hardware
    Mock,
}

impl DriverChoice {
    /// Choice named by a configuration file
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case(MOCK_DRIVER) {
            return Some(DriverChoice::Mock);
        }
        name.parse::<DriverKind>().ok().map(DriverChoice::from)
    }

    /// Open the chosen driver, checking that it offers `required`
    pub fn open(self, required: DriverCapabilities) -> Result<Arc<dyn GpioDriver>, GpioError> {
        let driver: Arc<dyn GpioDriver> = match self {
            DriverChoice::Auto => return select_driver(required),
            DriverChoice::Mock => Arc::new(MockDriver::new()),
            DriverChoice::Bcm => open_driver(DriverKind::Bcm)?,
            DriverChoice::Memory => open_driver(DriverKind::Memory)?,
            DriverChoice::Sysfs => open_driver(DriverKind::Sysfs)?,
        };
        if !driver.capabilities().contains(required) {
            return Err(GpioError::NoSuitableDriver(format!(
                "{} driver lacks {required}",
                driver.name()
            )));
        }
        debug!("using {} driver ({})", driver.name(), driver.capabilities());
        Ok(driver)
    }
}

impl From<DriverKind> for DriverChoice {
    fn from(kind: DriverKind) -> Self {
        match kind {
            DriverKind::Bcm => DriverChoice::Bcm,
            DriverKind::Memory => DriverChoice::Memory,
            DriverKind::Sysfs => DriverChoice::Sysfs,
        }
    }
}

/// Pinout of the board this runs on, Rev2 when it is not a Raspberry Pi
pub fn board_pinout() -> Pinout {
    match Board::detect() {
        Ok(board) if board.is_raspberry_pi() => {
            debug!("detected {board}");
            board.pinout()
        }
        Ok(_) => {
            info!("not a Raspberry Pi, assuming the {:?} pinout", Pinout::default());
            Pinout::default()
        }
        Err(e) => {
            info!("board detection failed ({e}), assuming the {:?} pinout", Pinout::default());
            Pinout::default()
        }
    }
}

/// Resolve `17`, `GPIO17` or `P1-11` to a processor pin
pub fn resolve_pin(text: &str, pinout: Pinout) -> Result<ProcessorPin, GpioError> {
    let trimmed = text.trim();
    let number = trimmed
        .get(..4)
        .filter(|prefix| prefix.eq_ignore_ascii_case("gpio"))
        .map_or(trimmed, |_| &trimmed[4..]);
    if let Ok(line) = number.parse::<u8>() {
        return ProcessorPin::try_from(line);
    }
    trimmed.parse::<ConnectorPin>()?.to_processor(pinout)
}
