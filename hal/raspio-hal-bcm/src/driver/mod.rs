//! Pin allocation drivers
//!
//! Three implementations of [`raspio_hal::GpioDriver`], from most to least
//! capable:
//!
//! | Driver | Registers | Edge detection | Resistors | Other boards |
//! |--------|-----------|----------------|-----------|--------------|
//! | [`BcmGpioDriver`] | yes | epoll | yes | no |
//! | [`MemoryGpioDriver`] | yes | busy-wait | yes | no |
//! | [`SysfsGpioDriver`] | no | busy-wait | no | yes |

mod bcm;
mod memory;
mod select;
mod sysfs;

use std::thread;
use std::time::{Duration, Instant};

use raspio_hal::gpio::effective_timeout;
use raspio_hal::{GpioError, ProcessorPin};

pub use bcm::BcmGpioDriver;
pub use memory::{map_gpio_block, MemoryGpioDriver};
pub use select::{open_driver, select_driver, DriverKind};
pub use sysfs::SysfsGpioDriver;

/// Poll `read` until it reports `state` or the timeout expires
pub(crate) fn busy_wait(
    pin: ProcessorPin,
    state: bool,
    timeout: Option<Duration>,
    mut read: impl FnMut() -> Result<bool, GpioError>,
) -> Result<(), GpioError> {
    let timeout = effective_timeout(timeout);
    let deadline = Instant::now() + timeout;
    loop {
        if read()? == state {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(GpioError::Timeout {
                pin,
                expected: state,
                timeout,
            });
        }
        thread::yield_now();
    }
}
