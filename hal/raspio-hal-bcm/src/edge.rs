//! Edge detection through the pseudo-filesystem and epoll
//!
//! An exported input with `edge=both` raises a priority event on its
//! `value` file at every transition. [`EdgeWatch`] keeps that file open and
//! blocks in `epoll_wait` until the next event or a timeout.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::time::Duration;

use log::{debug, warn};
use raspio_hal::{GpioError, PinDetectedEdges, PinDirection, ProcessorPin};

use crate::sysfs::SysfsGpio;

/// Open edge event source for one pin
#[derive(Debug)]
pub struct EdgeWatch {
    pin: ProcessorPin,
    value: File,
    epoll: OwnedFd,
}

impl EdgeWatch {
    /// Export `pin` as an input detecting both edges and register it with
    /// a fresh epoll instance
    ///
    /// The pin is unexported again when any later step fails.
    pub fn open(sysfs: &SysfsGpio, pin: ProcessorPin) -> Result<Self, GpioError> {
        sysfs.export(pin)?;
        Self::register(sysfs, pin).inspect_err(|_| {
            if let Err(e) = sysfs.unexport(pin) {
                warn!("unexporting {pin} after failed edge setup: {e}");
            }
        })
    }

    fn register(sysfs: &SysfsGpio, pin: ProcessorPin) -> Result<Self, GpioError> {
        sysfs.set_direction(pin, PinDirection::Input)?;
        sysfs.set_edges(pin, PinDetectedEdges::Both)?;

        let path = sysfs.value_path(pin);
        let value = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)
            .map_err(|e| GpioError::file(&path, e))?;

        // SAFETY: epoll_create1 has no memory preconditions; the result is
        // checked before being wrapped.
        let raw = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if raw < 0 {
            return Err(GpioError::last_os_error("epoll_create1"));
        }
        // SAFETY: raw is a freshly created descriptor owned by nobody else.
        let epoll = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut event = libc::epoll_event {
            events: (libc::EPOLLIN | libc::EPOLLET | libc::EPOLLPRI) as u32,
            u64: u64::from(pin.number()),
        };
        // SAFETY: both descriptors are open and `event` outlives the call.
        let rc = unsafe {
            libc::epoll_ctl(
                epoll.as_raw_fd(),
                libc::EPOLL_CTL_ADD,
                value.as_raw_fd(),
                &mut event,
            )
        };
        if rc < 0 {
            return Err(GpioError::last_os_error("epoll_ctl"));
        }

        let watch = Self { pin, value, epoll };
        // The first wait would otherwise return the initial pending event
        watch.drain();
        debug!("watching edges of {pin}");
        Ok(watch)
    }

    pub fn pin(&self) -> ProcessorPin {
        self.pin
    }

    /// Block until an edge is reported or `timeout` passes
    ///
    /// Returns `true` when woken by an edge.
    pub fn wait(&self, timeout: Duration) -> Result<bool, GpioError> {
        let millis = timeout.as_millis().clamp(1, i32::MAX as u128) as i32;
        let mut event = libc::epoll_event { events: 0, u64: 0 };

        // SAFETY: `event` is a valid buffer for one entry.
        let n = unsafe { libc::epoll_wait(self.epoll.as_raw_fd(), &mut event, 1, millis) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(GpioError::Os {
                call: "epoll_wait",
                source: err,
            });
        }
        if n > 0 {
            self.drain();
        }
        Ok(n > 0)
    }

    /// Rewind and read the value file to acknowledge the event
    fn drain(&self) {
        let mut buf = [0u8; 8];
        let mut file = &self.value;
        if file.seek(SeekFrom::Start(0)).is_ok() {
            let _ = file.read(&mut buf);
        }
    }
}
