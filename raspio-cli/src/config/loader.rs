//! TOML loading and validation

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use raspio_core::config::ConnectionConfig;
use raspio_hal::GpioError;
use raspio_hal_bcm::DriverKind;
use thiserror::Error;

/// Driver name accepted in addition to the hardware drivers
pub const MOCK_DRIVER: &str = "mock";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid configuration in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("pin #{index}: {source}")]
    Pin { index: usize, source: GpioError },

    #[error("unknown driver '{0}'")]
    UnknownDriver(String),

    #[error("no pins configured")]
    NoPins,
}

/// Parse configuration text without validating it
pub fn parse(text: &str) -> Result<ConnectionConfig, toml::de::Error> {
    toml::from_str(text)
}

/// Read, parse and validate a configuration file
pub fn load(path: impl AsRef<Path>) -> Result<ConnectionConfig, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    validate(&config)?;
    debug!(
        "loaded {} pin(s) from {} ({:?} pinout)",
        config.pins.len(),
        path.display(),
        config.pinout
    );
    Ok(config)
}

/// Check what the type system cannot: driver names and pin references
pub fn validate(config: &ConnectionConfig) -> Result<(), ConfigError> {
    if let Some(driver) = &config.driver {
        let name = driver.as_str();
        if !name.eq_ignore_ascii_case(MOCK_DRIVER) && name.parse::<DriverKind>().is_err() {
            return Err(ConfigError::UnknownDriver(name.to_string()));
        }
    }
    if config.pins.is_empty() {
        return Err(ConfigError::NoPins);
    }
    for (index, pin) in config.pins.iter().enumerate() {
        pin.pin
            .resolve(config.pinout)
            .map_err(|source| ConfigError::Pin { index, source })?;
    }
    Ok(())
}
