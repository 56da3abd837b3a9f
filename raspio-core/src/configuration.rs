//! Pin configurations
//!
//! A configuration describes what a pin is used for inside a connection:
//! its role (output, input or switch input), an optional unique name, a
//! polarity reversal flag and an optional change callback. Configurations
//! do not depend on any driver.
//!
//! ```rust,ignore
//! let led = PinConfiguration::output(ProcessorPin::P18).named("led");
//! let button = PinConfiguration::switch_input(ProcessorPin::P17)
//!     .with_resistor(PinResistor::PullUp)
//!     .reversed(true)
//!     .on_change(|pressed| println!("button: {pressed}"));
//! ```

use std::fmt;
use std::sync::Arc;

use raspio_hal::{PinDirection, PinResistor, ProcessorPin};

/// Callback invoked with the new logical value of a pin
pub type PinCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Attributes shared by every pin role
#[derive(Clone)]
pub struct PinCommon {
    pub pin: ProcessorPin,
    pub name: Option<String>,
    /// Logical value is the inverse of the electrical level
    pub reversed: bool,
    pub on_change: Option<PinCallback>,
}

impl PinCommon {
    pub fn new(pin: ProcessorPin) -> Self {
        Self {
            pin,
            name: None,
            reversed: false,
            on_change: None,
        }
    }
}

impl fmt::Debug for PinCommon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinCommon")
            .field("pin", &self.pin)
            .field("name", &self.name)
            .field("reversed", &self.reversed)
            .field("on_change", &self.on_change.is_some())
            .finish()
    }
}

/// Output pin
#[derive(Debug, Clone)]
pub struct OutputPinConfiguration {
    pub common: PinCommon,
    /// Logical value written when the pin is allocated
    pub enabled: bool,
}

/// Input pin reporting its level
#[derive(Debug, Clone)]
pub struct InputPinConfiguration {
    pub common: PinCommon,
    pub resistor: PinResistor,
}

/// Input pin whose active transitions toggle a latched value
#[derive(Debug, Clone)]
pub struct SwitchInputPinConfiguration {
    pub input: InputPinConfiguration,
    /// Initial latched value
    pub enabled: bool,
}

/// Role of a pin inside a connection
#[derive(Debug, Clone)]
pub enum PinConfiguration {
    Output(OutputPinConfiguration),
    Input(InputPinConfiguration),
    SwitchInput(SwitchInputPinConfiguration),
}

impl PinConfiguration {
    pub fn output(pin: ProcessorPin) -> Self {
        PinConfiguration::Output(OutputPinConfiguration {
            common: PinCommon::new(pin),
            enabled: false,
        })
    }

    pub fn input(pin: ProcessorPin) -> Self {
        PinConfiguration::Input(InputPinConfiguration {
            common: PinCommon::new(pin),
            resistor: PinResistor::None,
        })
    }

    pub fn switch_input(pin: ProcessorPin) -> Self {
        PinConfiguration::SwitchInput(SwitchInputPinConfiguration {
            input: InputPinConfiguration {
                common: PinCommon::new(pin),
                resistor: PinResistor::None,
            },
            enabled: false,
        })
    }

    pub fn common(&self) -> &PinCommon {
        match self {
            PinConfiguration::Output(output) => &output.common,
            PinConfiguration::Input(input) => &input.common,
            PinConfiguration::SwitchInput(switch) => &switch.input.common,
        }
    }

    fn common_mut(&mut self) -> &mut PinCommon {
        match self {
            PinConfiguration::Output(output) => &mut output.common,
            PinConfiguration::Input(input) => &mut input.common,
            PinConfiguration::SwitchInput(switch) => &mut switch.input.common,
        }
    }

    pub fn pin(&self) -> ProcessorPin {
        self.common().pin
    }

    pub fn name(&self) -> Option<&str> {
        self.common().name.as_deref()
    }

    pub fn is_reversed(&self) -> bool {
        self.common().reversed
    }

    pub fn callback(&self) -> Option<&PinCallback> {
        self.common().on_change.as_ref()
    }

    pub fn direction(&self) -> PinDirection {
        match self {
            PinConfiguration::Output(_) => PinDirection::Output,
            PinConfiguration::Input(_) | PinConfiguration::SwitchInput(_) => PinDirection::Input,
        }
    }

    /// Pull resistor requested for inputs
    pub fn resistor(&self) -> Option<PinResistor> {
        match self {
            PinConfiguration::Output(_) => None,
            PinConfiguration::Input(input) => Some(input.resistor),
            PinConfiguration::SwitchInput(switch) => Some(switch.input.resistor),
        }
    }

    /// Logical value held before any read or write happened
    pub fn initial_value(&self) -> bool {
        match self {
            PinConfiguration::Output(output) => output.enabled,
            PinConfiguration::Input(_) => false,
            PinConfiguration::SwitchInput(switch) => switch.enabled,
        }
    }

    /// Logical value for an electrical level
    pub fn effective_value(&self, raw: bool) -> bool {
        raw != self.is_reversed()
    }

    /// Electrical level for a logical value
    pub fn raw_value(&self, value: bool) -> bool {
        value != self.is_reversed()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.common_mut().name = Some(name.into());
        self
    }

    pub fn reversed(mut self, reversed: bool) -> Self {
        self.common_mut().reversed = reversed;
        self
    }

    pub fn on_change(mut self, callback: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.common_mut().on_change = Some(Arc::new(callback));
        self
    }

    /// Initial logical value of outputs and switch inputs
    ///
    /// Plain inputs take their value from the pin and ignore this.
    pub fn enabled(mut self, enabled: bool) -> Self {
        match &mut self {
            PinConfiguration::Output(output) => output.enabled = enabled,
            PinConfiguration::SwitchInput(switch) => switch.enabled = enabled,
            PinConfiguration::Input(_) => {}
        }
        self
    }

    /// Pull resistor of inputs; outputs ignore this
    pub fn with_resistor(mut self, resistor: PinResistor) -> Self {
        match &mut self {
            PinConfiguration::Input(input) => input.resistor = resistor,
            PinConfiguration::SwitchInput(switch) => switch.input.resistor = resistor,
            PinConfiguration::Output(_) => {}
        }
        self
    }
}

impl From<OutputPinConfiguration> for PinConfiguration {
    fn from(configuration: OutputPinConfiguration) -> Self {
        PinConfiguration::Output(configuration)
    }
}

impl From<InputPinConfiguration> for PinConfiguration {
    fn from(configuration: InputPinConfiguration) -> Self {
        PinConfiguration::Input(configuration)
    }
}

impl From<SwitchInputPinConfiguration> for PinConfiguration {
    fn from(configuration: SwitchInputPinConfiguration) -> Self {
        PinConfiguration::SwitchInput(configuration)
    }
}

impl fmt::Display for PinConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self {
            PinConfiguration::Output(_) => "output",
            PinConfiguration::Input(_) => "input",
            PinConfiguration::SwitchInput(_) => "switch",
        };
        match self.name() {
            Some(name) => write!(f, "{name} ({role} {})", self.pin())?,
            None => write!(f, "{role} {}", self.pin())?,
        }
        if self.is_reversed() {
            f.write_str(", reversed")?;
        }
        Ok(())
    }
}
