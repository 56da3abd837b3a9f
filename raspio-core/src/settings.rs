//! Connection settings

use std::time::Duration;

use raspio_hal::Pinout;

use crate::timer::TimerKind;

/// Default interval between two input polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default half period of [`GpioConnection::blink`](crate::GpioConnection::blink)
pub const DEFAULT_BLINK_DURATION: Duration = Duration::from_millis(250);

/// Behavior of a [`GpioConnection`](crate::GpioConnection)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioConnectionSettings {
    /// Interval between two polls of the input pins
    pub poll_interval: Duration,
    /// Blink duration used when none is given
    pub blink_duration: Duration,
    /// Open the connection as soon as it is created
    pub opened: bool,
    /// Connector layout used to resolve connector pins
    pub pinout: Pinout,
    /// Timer driving the poll cycle
    pub timer: TimerKind,
}

impl Default for GpioConnectionSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            blink_duration: DEFAULT_BLINK_DURATION,
            opened: true,
            pinout: Pinout::default(),
            timer: TimerKind::Standard,
        }
    }
}
