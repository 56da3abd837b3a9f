//! Configuration type definitions
//!
//! Pins are referenced either by processor line number or by connector
//! position, so a file can be written against the board's silkscreen:
//!
//! ```toml
//! pinout = "plus"
//! poll_interval_ms = 20
//!
//! [[pins]]
//! pin = "P1-11"
//! name = "button"
//! role = "switch"
//! resistor = "pullup"
//! reversed = true
//!
//! [[pins]]
//! pin = 18
//! name = "led"
//! role = "output"
//! ```

use std::time::Duration;

use heapless::{String, Vec};
use raspio_hal::{ConnectorPin, GpioError, PinResistor, Pinout, ProcessorPin};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::configuration::PinConfiguration;
use crate::settings::{GpioConnectionSettings, DEFAULT_BLINK_DURATION, DEFAULT_POLL_INTERVAL};
use crate::timer::TimerKind;

/// Maximum pin name length
pub const MAX_NAME_LEN: usize = 16;

/// Maximum connector pin reference length (`"P1-40"`)
pub const MAX_PIN_REF_LEN: usize = 8;

/// Maximum driver name length
pub const MAX_DRIVER_LEN: usize = 16;

/// Maximum pins per connection
pub const MAX_PINS: usize = 32;

/// Pin reference
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum PinRef {
    /// Processor line number
    Processor(u8),
    /// Connector position such as `"P1-11"`
    Connector(String<MAX_PIN_REF_LEN>),
}

impl PinRef {
    /// Processor pin designated on `pinout`
    pub fn resolve(&self, pinout: Pinout) -> Result<ProcessorPin, GpioError> {
        match self {
            PinRef::Processor(line) => ProcessorPin::try_from(*line),
            PinRef::Connector(name) => name.parse::<ConnectorPin>()?.to_processor(pinout),
        }
    }
}

/// Pin role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PinRole {
    Output,
    Input,
    /// Input toggling a latched value on each activation
    Switch,
}

/// Pin description
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PinConfig {
    pub pin: PinRef,
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: Option<String<MAX_NAME_LEN>>,
    pub role: PinRole,
    /// Logical value is the inverse of the level
    #[cfg_attr(feature = "serde", serde(default))]
    pub reversed: bool,
    /// Pull resistor (inputs only)
    #[cfg_attr(feature = "serde", serde(default))]
    pub resistor: PinResistor,
    /// Initial value (outputs and switches)
    #[cfg_attr(feature = "serde", serde(default))]
    pub enabled: bool,
}

impl PinConfig {
    pub fn to_configuration(&self, pinout: Pinout) -> Result<PinConfiguration, GpioError> {
        let pin = self.pin.resolve(pinout)?;
        let mut configuration = match self.role {
            PinRole::Output => PinConfiguration::output(pin),
            PinRole::Input => PinConfiguration::input(pin),
            PinRole::Switch => PinConfiguration::switch_input(pin),
        }
        .reversed(self.reversed)
        .with_resistor(self.resistor)
        .enabled(self.enabled);
        if let Some(name) = &self.name {
            configuration = configuration.named(name.as_str());
        }
        Ok(configuration)
    }
}

/// Connection description
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ConnectionConfig {
    /// Driver name; picked from capabilities when absent
    pub driver: Option<String<MAX_DRIVER_LEN>>,
    pub pinout: Pinout,
    pub poll_interval_ms: u32,
    pub blink_duration_ms: u32,
    pub timer: TimerKind,
    pub pins: Vec<PinConfig, MAX_PINS>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            driver: None,
            pinout: Pinout::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u32,
            blink_duration_ms: DEFAULT_BLINK_DURATION.as_millis() as u32,
            timer: TimerKind::default(),
            pins: Vec::new(),
        }
    }
}

impl ConnectionConfig {
    pub fn settings(&self) -> GpioConnectionSettings {
        GpioConnectionSettings {
            poll_interval: Duration::from_millis(u64::from(self.poll_interval_ms)),
            blink_duration: Duration::from_millis(u64::from(self.blink_duration_ms)),
            pinout: self.pinout,
            timer: self.timer,
            ..GpioConnectionSettings::default()
        }
    }

    /// Pin configurations resolved against the configured pinout
    pub fn configurations(&self) -> Result<std::vec::Vec<PinConfiguration>, GpioError> {
        self.pins
            .iter()
            .map(|pin| pin.to_configuration(self.pinout))
            .collect()
    }
}
