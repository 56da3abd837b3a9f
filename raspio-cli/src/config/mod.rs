//! Connection configuration files

mod loader;

pub use loader::{load, ConfigError, MOCK_DRIVER};
