//! GPIO pseudo-filesystem access
//!
//! Thin wrappers over `/sys/class/gpio`: `export`, `unexport` and the
//! per-pin `direction`, `value` and `edge` files.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use raspio_hal::{GpioError, PinDetectedEdges, PinDirection, ProcessorPin};

/// Default mount point of the GPIO class
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// How long to wait for an exported pin directory to appear
const EXPORT_TIMEOUT: Duration = Duration::from_millis(100);

/// Pseudo-filesystem rooted at a GPIO class directory
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new(SYSFS_GPIO_ROOT)
    }
}

impl SysfsGpio {
    /// # Arguments
    /// * `root` - Path of the GPIO class directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pin_dir(&self, pin: ProcessorPin) -> PathBuf {
        self.root.join(format!("gpio{}", pin.number()))
    }

    pub fn value_path(&self, pin: ProcessorPin) -> PathBuf {
        self.pin_dir(pin).join("value")
    }

    /// Export a pin unless it already is
    ///
    /// The kernel creates the pin directory asynchronously, so this polls
    /// for it briefly after writing `export`.
    pub fn export(&self, pin: ProcessorPin) -> Result<(), GpioError> {
        let dir = self.pin_dir(pin);
        if dir.exists() {
            return Ok(());
        }

        write_file(&self.root.join("export"), &pin.number().to_string())?;
        debug!("exported {pin}");

        let deadline = Instant::now() + EXPORT_TIMEOUT;
        while !dir.exists() {
            if Instant::now() >= deadline {
                return Err(GpioError::file(
                    dir,
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ));
            }
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }

    pub fn unexport(&self, pin: ProcessorPin) -> Result<(), GpioError> {
        if !self.pin_dir(pin).exists() {
            return Ok(());
        }
        write_file(&self.root.join("unexport"), &pin.number().to_string())?;
        debug!("unexported {pin}");
        Ok(())
    }

    pub fn set_direction(&self, pin: ProcessorPin, direction: PinDirection) -> Result<(), GpioError> {
        let value = match direction {
            PinDirection::Input => "in",
            PinDirection::Output => "out",
        };
        write_file(&self.pin_dir(pin).join("direction"), value)
    }

    pub fn set_edges(&self, pin: ProcessorPin, edges: PinDetectedEdges) -> Result<(), GpioError> {
        write_file(&self.pin_dir(pin).join("edge"), edges.as_sysfs_str())
    }

    pub fn write_value(&self, pin: ProcessorPin, value: bool) -> Result<(), GpioError> {
        write_file(&self.value_path(pin), if value { "1" } else { "0" })
    }

    pub fn read_value(&self, pin: ProcessorPin) -> Result<bool, GpioError> {
        let path = self.value_path(pin);
        let text = fs::read_to_string(&path).map_err(|e| GpioError::file(&path, e))?;
        Ok(text.trim() == "1")
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), GpioError> {
    fs::write(path, contents).map_err(|e| GpioError::file(path, e))
}
