//! Capability-based driver selection

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{debug, warn};
use raspio_hal::{DriverCapabilities, GpioDriver, GpioError};

use super::{BcmGpioDriver, MemoryGpioDriver, SysfsGpioDriver};
use crate::memory::MemoryMap;

/// Driver implementations known to [`select_driver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    Bcm,
    Memory,
    Sysfs,
}

impl DriverKind {
    /// Candidates in descending capability order
    pub const ALL: [DriverKind; 3] = [DriverKind::Bcm, DriverKind::Memory, DriverKind::Sysfs];

    pub const fn capabilities(self) -> DriverCapabilities {
        match self {
            DriverKind::Bcm => BcmGpioDriver::<MemoryMap>::CAPABILITIES,
            DriverKind::Memory => MemoryGpioDriver::<MemoryMap>::CAPABILITIES,
            DriverKind::Sysfs => SysfsGpioDriver::CAPABILITIES,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DriverKind::Bcm => "bcm",
            DriverKind::Memory => "memory",
            DriverKind::Sysfs => "sysfs",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DriverKind {
    type Err = GpioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DriverKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GpioError::NoSuitableDriver(format!("unknown driver '{s}'")))
    }
}

/// Open one specific driver
pub fn open_driver(kind: DriverKind) -> Result<Arc<dyn GpioDriver>, GpioError> {
    let driver: Arc<dyn GpioDriver> = match kind {
        DriverKind::Bcm => Arc::new(BcmGpioDriver::open()?),
        DriverKind::Memory => Arc::new(MemoryGpioDriver::open()?),
        DriverKind::Sysfs => Arc::new(SysfsGpioDriver::open()?),
    };
    Ok(driver)
}

/// Open the most capable driver that offers every `required` capability
///
/// Candidates that cannot be opened on this machine are skipped.
pub fn select_driver(required: DriverCapabilities) -> Result<Arc<dyn GpioDriver>, GpioError> {
    select_from(&DriverKind::ALL, required, open_driver)
}

fn select_from<F>(
    candidates: &[DriverKind],
    required: DriverCapabilities,
    mut open: F,
) -> Result<Arc<dyn GpioDriver>, GpioError>
where
    F: FnMut(DriverKind) -> Result<Arc<dyn GpioDriver>, GpioError>,
{
    for &kind in candidates {
        if !kind.capabilities().contains(required) {
            continue;
        }
        match open(kind) {
            Ok(driver) => {
                debug!("selected {kind} driver ({})", kind.capabilities());
                return Ok(driver);
            }
            Err(e) => warn!("{kind} driver unavailable: {e}"),
        }
    }
    Err(GpioError::NoSuitableDriver(required.to_string()))
}
