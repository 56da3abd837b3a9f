//! Memory-mapped register access
//!
//! [`MemoryMap`] owns a window of physical memory mapped through a device
//! file and unmaps it when dropped. [`Registers`] layers the access
//! discipline the peripherals need on top of any [`RegisterBackend`]:
//! every read and every write is issued twice, so a stale value latched by
//! the bus bridge never reaches the caller and a dropped write is retried.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use log::{debug, warn};
use raspio_hal::GpioError;

/// Full physical memory device
pub const MEM_PATH: &str = "/dev/mem";
/// GPIO-only memory device, usable without root
pub const GPIOMEM_PATH: &str = "/dev/gpiomem";

/// Page protection of a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryProtection(libc::c_int);

impl MemoryProtection {
    pub const READ: Self = Self(libc::PROT_READ);
    pub const WRITE: Self = Self(libc::PROT_WRITE);
    pub const READ_WRITE: Self = Self(libc::PROT_READ | libc::PROT_WRITE);
}

/// Mapping flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryFlags(libc::c_int);

impl MemoryFlags {
    pub const SHARED: Self = Self(libc::MAP_SHARED);
    pub const PRIVATE: Self = Self(libc::MAP_PRIVATE);
}

/// Word-addressed 32-bit register storage
///
/// Implemented by [`MemoryMap`] for real hardware and by test doubles.
pub trait RegisterBackend: Send + Sync {
    /// Read the word at byte `offset`
    fn read_word(&self, offset: usize) -> u32;

    /// Write the word at byte `offset`
    fn write_word(&self, offset: usize, value: u32);
}

impl<B: RegisterBackend + ?Sized> RegisterBackend for Arc<B> {
    fn read_word(&self, offset: usize) -> u32 {
        (**self).read_word(offset)
    }

    fn write_word(&self, offset: usize, value: u32) {
        (**self).write_word(offset, value)
    }
}

/// A mapped physical memory window
///
/// The mapping is released on drop; [`MemoryMap::close`] does the same but
/// reports failures.
#[derive(Debug)]
pub struct MemoryMap {
    ptr: NonNull<u32>,
    size: usize,
}

// SAFETY: the mapping is owned exclusively and only accessed through
// volatile word reads and writes, which the hardware serializes.
unsafe impl Send for MemoryMap {}
// SAFETY: see above; no method hands out references into the mapping.
unsafe impl Sync for MemoryMap {}

impl MemoryMap {
    /// Map `size` bytes of `fd` starting at `offset`
    ///
    /// # Arguments
    /// * `address` - Placement hint, usually 0
    /// * `size` - Length of the window in bytes
    /// * `protection` - Page protection
    /// * `flags` - Mapping flags
    /// * `fd` - Open memory device
    /// * `offset` - Physical address to map
    pub fn create(
        address: usize,
        size: usize,
        protection: MemoryProtection,
        flags: MemoryFlags,
        fd: RawFd,
        offset: u64,
    ) -> Result<Self, GpioError> {
        let map_failed = |source| GpioError::MapFailed {
            address: offset,
            size,
            source,
        };
        let file_offset = libc::off_t::try_from(offset)
            .map_err(|_| map_failed(io::Error::from(io::ErrorKind::InvalidInput)))?;

        // SAFETY: mmap does not touch existing memory; the result is
        // checked before use.
        let ptr = unsafe {
            libc::mmap(
                address as *mut libc::c_void,
                size,
                protection.0,
                flags.0,
                fd,
                file_offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(map_failed(io::Error::last_os_error()));
        }
        let ptr = NonNull::new(ptr.cast::<u32>())
            .ok_or_else(|| map_failed(io::Error::from(io::ErrorKind::AddrNotAvailable)))?;

        debug!("mapped {size} bytes at {offset:#010x}");
        Ok(Self { ptr, size })
    }

    /// Open a memory device and map one block of it
    pub fn open_device(path: impl AsRef<Path>, offset: u64, size: usize) -> Result<Self, GpioError> {
        let path = path.as_ref();
        let file = open_memory_device(path)?;
        Self::create(
            0,
            size,
            MemoryProtection::READ_WRITE,
            MemoryFlags::SHARED,
            file.as_raw_fd(),
            offset,
        )
        // The mapping stays valid after the descriptor is closed
    }

    /// Length of the window in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Unmap the window, reporting failure
    pub fn close(self) -> Result<(), GpioError> {
        let result = self.unmap();
        std::mem::forget(self);
        result
    }

    fn unmap(&self) -> Result<(), GpioError> {
        // SAFETY: ptr and size describe a mapping created by `create` that
        // has not been unmapped yet.
        let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.size) };
        if rc == 0 {
            Ok(())
        } else {
            Err(GpioError::UnmapFailed {
                size: self.size,
                source: io::Error::last_os_error(),
            })
        }
    }

    fn word_ptr(&self, offset: usize) -> *mut u32 {
        assert!(
            offset % 4 == 0 && offset + 4 <= self.size,
            "register offset {offset:#x} outside the {}-byte window",
            self.size
        );
        // SAFETY: offset was bounds-checked against the mapping above.
        unsafe { self.ptr.as_ptr().add(offset / 4) }
    }
}

impl RegisterBackend for MemoryMap {
    fn read_word(&self, offset: usize) -> u32 {
        // SAFETY: word_ptr returns an aligned pointer inside the mapping.
        unsafe { ptr::read_volatile(self.word_ptr(offset)) }
    }

    fn write_word(&self, offset: usize, value: u32) {
        // SAFETY: word_ptr returns an aligned pointer inside the mapping.
        unsafe { ptr::write_volatile(self.word_ptr(offset), value) }
    }
}

impl Drop for MemoryMap {
    fn drop(&mut self) {
        if let Err(e) = self.unmap() {
            warn!("{e}");
        }
    }
}

fn open_memory_device(path: &Path) -> Result<File, GpioError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_SYNC | libc::O_CLOEXEC)
        .open(path)
        .map_err(|e| GpioError::file(path, e))
}

/// Register block accessed with duplicated reads and writes
#[derive(Debug)]
pub struct Registers<B> {
    backend: B,
}

impl<B: RegisterBackend> Registers<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Read a register
    ///
    /// The read is issued twice and the first value is returned.
    pub fn read(&self, offset: usize) -> u32 {
        let value = self.backend.read_word(offset);
        let _ = self.backend.read_word(offset);
        value
    }

    /// Write a register, twice
    pub fn write(&self, offset: usize, value: u32) {
        self.backend.write_word(offset, value);
        self.backend.write_word(offset, value);
    }

    /// Replace the bits selected by `mask` with those of `value`
    pub fn write_masked(&self, offset: usize, value: u32, mask: u32) {
        let current = self.read(offset);
        self.write(offset, (current & !mask) | (value & mask));
    }

    /// Single read, for FIFO registers where every access pops data
    pub fn read_fifo(&self, offset: usize) -> u32 {
        self.backend.read_word(offset)
    }

    /// Single write, for FIFO registers where every access pushes data
    pub fn write_fifo(&self, offset: usize, value: u32) {
        self.backend.write_word(offset, value)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}
