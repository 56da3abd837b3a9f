//! Subcommand implementations

use std::path::Path;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use clap::ValueEnum;
use log::{info, warn};
use raspio_core::{
    GpioConnection, GpioConnectionSettings, GpioInputBinaryPin, GpioInputOutputBinaryPin,
    GpioOutputBinaryPin, PinChange, PinConfiguration, StdDelay,
};
use raspio_drivers::{Dht, DhtModel};
use raspio_hal::{
    DriverCapabilities, InputBinaryPin, OutputBinaryPin, PinResistor, Pinout, SystemClock,
};
use raspio_hal_bcm::{Board, DriverKind};

use crate::config;
use crate::hardware::{board_pinout, resolve_pin, DriverChoice};

/// Options shared by every subcommand
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub driver: DriverChoice,
    pub pinout: Option<Pinout>,
}

impl Context {
    fn pinout(&self) -> Pinout {
        self.pinout.unwrap_or_else(board_pinout)
    }
}

/// Pull resistor requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ResistorArg {
    #[default]
    None,
    PullUp,
    PullDown,
}

impl From<ResistorArg> for PinResistor {
    fn from(arg: ResistorArg) -> Self {
        match arg {
            ResistorArg::None => PinResistor::None,
            ResistorArg::PullUp => PinResistor::PullUp,
            ResistorArg::PullDown => PinResistor::PullDown,
        }
    }
}

/// DHT variant requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ModelArg {
    Dht11,
    #[default]
    Dht22,
}

impl From<ModelArg> for DhtModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Dht11 => DhtModel::Dht11,
            ModelArg::Dht22 => DhtModel::Dht22,
        }
    }
}

/// Parse `0`/`1`, `low`/`high`, `off`/`on` or `false`/`true`
pub fn parse_level(text: &str) -> Result<bool, String> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "high" | "on" | "true" => Ok(true),
        "0" | "low" | "off" | "false" => Ok(false),
        other => Err(format!("'{other}' is not a pin level (use 0 or 1)")),
    }
}

pub fn info(ctx: Context) -> Result<()> {
    match Board::detect() {
        Ok(board) if board.is_raspberry_pi() => println!("Board: {board}"),
        Ok(_) => println!("Board: not a Raspberry Pi"),
        Err(e) => println!("Board: unknown ({e})"),
    }

    let pinout = ctx.pinout();
    println!("Pinout: {pinout:?}");

    println!("Drivers:");
    for kind in DriverKind::ALL {
        println!("  {:<8} {}", kind.name(), kind.capabilities());
    }

    println!("Header:");
    let mut table = pinout.table().to_vec();
    table.sort();
    for (connector, processor) in table {
        println!("  {connector}  {processor}");
    }
    Ok(())
}

pub fn read(ctx: Context, pin: &str, resistor: ResistorArg) -> Result<()> {
    let pin = resolve_pin(pin, ctx.pinout())?;
    let required = if resistor == ResistorArg::None {
        DriverCapabilities::NONE
    } else {
        DriverCapabilities::CAN_SET_PIN_RESISTOR
    };
    let driver = ctx.driver.open(required)?;
    let mut input = GpioInputBinaryPin::new(driver, pin, resistor.into())?;
    let level = InputBinaryPin::read(&mut input).with_context(|| format!("reading {pin}"))?;
    println!("{}", u8::from(level));
    Ok(())
}

pub fn write(ctx: Context, pin: &str, level: bool, hold: Option<Duration>) -> Result<()> {
    let pin = resolve_pin(pin, ctx.pinout())?;
    let driver = ctx.driver.open(DriverCapabilities::NONE)?;
    let mut output = GpioOutputBinaryPin::new(driver, pin)?;
    OutputBinaryPin::write(&mut output, level).with_context(|| format!("writing {pin}"))?;

    match hold {
        Some(hold) => {
            thread::sleep(hold);
            output.release()?;
        }
        // Releasing turns the pin back into an input; keep it driven instead
        None => std::mem::forget(output),
    }
    Ok(())
}

pub fn blink(ctx: Context, pin: &str, duration: Duration, count: u32) -> Result<()> {
    let pinout = ctx.pinout();
    let pin = resolve_pin(pin, pinout)?;
    let driver = ctx.driver.open(DriverCapabilities::NONE)?;
    let settings = GpioConnectionSettings {
        pinout,
        ..GpioConnectionSettings::default()
    };
    let connection = GpioConnection::new(driver, settings, [PinConfiguration::output(pin)])?;

    for i in 0..count {
        connection.blink(pin, duration)?;
        if i + 1 < count {
            thread::sleep(duration);
        }
    }
    connection.close()?;
    Ok(())
}

fn describe(change: &PinChange) -> String {
    match &change.name {
        Some(name) => format!("{name} ({})", change.pin),
        None => change.pin.to_string(),
    }
}

pub fn watch(ctx: Context, path: &Path, seconds: Option<u64>) -> Result<()> {
    let config = config::load(path)?;
    let choice = match (ctx.driver, config.driver.as_deref()) {
        (DriverChoice::Auto, Some(name)) => DriverChoice::from_name(name).unwrap_or(ctx.driver),
        (choice, _) => choice,
    };
    let mut settings = config.settings();
    if let Some(pinout) = ctx.pinout {
        settings.pinout = pinout;
    }
    let pins = config.configurations()?;

    let driver = choice.open(DriverCapabilities::NONE)?;
    let connection = GpioConnection::new(driver, settings, pins)?;
    let events = connection.events();

    for configuration in connection.pins() {
        let value = connection.get(&configuration)?;
        println!("{configuration} = {}", u8::from(value));
    }
    info!(
        "watching {} pin(s) every {:?}",
        connection.len(),
        connection.settings().poll_interval
    );

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    loop {
        let change = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match events.recv_timeout(remaining) {
                    Ok(change) => change,
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => {
                        warn!("connection stopped reporting changes");
                        break;
                    }
                }
            }
            None => match events.recv() {
                Ok(change) => change,
                Err(_) => break,
            },
        };
        println!("{} = {}", describe(&change), u8::from(change.value));
    }

    connection.close()?;
    Ok(())
}

pub fn dht(ctx: Context, pin: &str, model: ModelArg) -> Result<()> {
    let pin = resolve_pin(pin, ctx.pinout())?;
    let driver = ctx
        .driver
        .open(DriverCapabilities::CAN_CHANGE_PIN_DIRECTION_RAPIDLY)?;
    let line = GpioInputOutputBinaryPin::new(driver, pin, PinResistor::None)?;
    let mut sensor = Dht::new(line, SystemClock::new(), StdDelay::new(), model.into());

    let reading = sensor
        .read()
        .with_context(|| format!("reading {:?} on {pin}", sensor.model()))?;
    println!(
        "{:.1} %RH  {:.1} °C  ({} attempt(s))",
        reading.relative_humidity(),
        reading.temperature_c(),
        reading.attempts
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn mock() -> Context {
        Context {
            driver: DriverChoice::Mock,
            pinout: Some(Pinout::Plus),
        }
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("1"), Ok(true));
        assert_eq!(parse_level("High"), Ok(true));
        assert_eq!(parse_level("off"), Ok(false));
        assert!(parse_level("2").is_err());
    }

    #[test]
    fn test_read_and_write_on_mock() {
        read(mock(), "P1-11", ResistorArg::PullUp).unwrap();
        write(mock(), "18", true, Some(Duration::ZERO)).unwrap();
    }

    #[test]
    fn test_blink_on_mock() {
        blink(mock(), "GPIO18", Duration::from_millis(1), 2).unwrap();
    }

    #[test]
    fn test_watch_stops_after_deadline() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "driver = \"mock\"\n[[pins]]\npin = 17\nrole = \"input\"").unwrap();

        let ctx = Context {
            driver: DriverChoice::Auto,
            pinout: Some(Pinout::Plus),
        };
        let started = Instant::now();
        watch(ctx, file.path(), Some(0)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_pin_is_reported() {
        let err = read(mock(), "P1-01", ResistorArg::None).unwrap_err();
        assert!(err.to_string().contains("P1-01"));
    }
}
