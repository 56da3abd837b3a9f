//! SPI through the `spidev` character device

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use log::debug;
use raspio_hal::spi::{check_transfer_lengths, Mode, SpiConfig};
use raspio_hal::{BusError, SpiBus};

const SPI_IOC_MAGIC: u32 = b'k' as u32;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

const fn ioc(direction: u32, nr: u32, size: u32) -> u32 {
    (direction << 30) | (size << 16) | (SPI_IOC_MAGIC << 8) | nr
}

pub const SPI_IOC_RD_MODE: u32 = ioc(IOC_READ, 1, 1);
pub const SPI_IOC_WR_MODE: u32 = ioc(IOC_WRITE, 1, 1);
pub const SPI_IOC_RD_BITS_PER_WORD: u32 = ioc(IOC_READ, 3, 1);
pub const SPI_IOC_WR_BITS_PER_WORD: u32 = ioc(IOC_WRITE, 3, 1);
pub const SPI_IOC_RD_MAX_SPEED_HZ: u32 = ioc(IOC_READ, 4, 4);
pub const SPI_IOC_WR_MAX_SPEED_HZ: u32 = ioc(IOC_WRITE, 4, 4);

/// Request submitting `count` transfer descriptors
pub const fn spi_ioc_message(count: u32) -> u32 {
    ioc(IOC_WRITE, 0, count * std::mem::size_of::<SpiIocTransfer>() as u32)
}

/// Kernel `struct spi_ioc_transfer`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SpiIocTransfer {
    pub tx_buf: u64,
    pub rx_buf: u64,
    pub len: u32,
    pub speed_hz: u32,
    pub delay_usecs: u16,
    pub bits_per_word: u8,
    pub cs_change: u8,
    pub tx_nbits: u8,
    pub rx_nbits: u8,
    pub word_delay_usecs: u8,
    pub pad: u8,
}

/// Path of the device for a bus and chip select
pub fn device_path(bus: u8, chip_select: u8) -> PathBuf {
    PathBuf::from(format!("/dev/spidev{bus}.{chip_select}"))
}

/// SPI master backed by `/dev/spidevX.Y`
#[derive(Debug)]
pub struct SpiDevice {
    file: File,
    speed_hz: u32,
    bits_per_word: u8,
}

impl SpiDevice {
    /// Open the device and apply `config`
    pub fn open(path: impl AsRef<Path>, config: SpiConfig) -> Result<Self, BusError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| BusError::Io {
                operation: "open spidev",
                source,
            })?;

        let mut device = Self {
            file,
            speed_hz: config.frequency,
            bits_per_word: config.bits_per_word,
        };
        device.set_mode(config.mode)?;
        device.set_bits_per_word(config.bits_per_word)?;
        device.set_max_speed(config.frequency)?;
        debug!("opened {} ({config:?})", path.display());
        Ok(device)
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), BusError> {
        let value = mode.bits();
        self.ioctl("SPI_IOC_WR_MODE", SPI_IOC_WR_MODE, &value as *const u8 as *mut libc::c_void)
    }

    pub fn mode(&self) -> Result<u8, BusError> {
        let mut value = 0u8;
        self.ioctl("SPI_IOC_RD_MODE", SPI_IOC_RD_MODE, &mut value as *mut u8 as *mut libc::c_void)?;
        Ok(value)
    }

    pub fn set_bits_per_word(&mut self, bits: u8) -> Result<(), BusError> {
        self.ioctl(
            "SPI_IOC_WR_BITS_PER_WORD",
            SPI_IOC_WR_BITS_PER_WORD,
            &bits as *const u8 as *mut libc::c_void,
        )?;
        self.bits_per_word = bits;
        Ok(())
    }

    pub fn bits_per_word(&self) -> Result<u8, BusError> {
        let mut value = 0u8;
        self.ioctl(
            "SPI_IOC_RD_BITS_PER_WORD",
            SPI_IOC_RD_BITS_PER_WORD,
            &mut value as *mut u8 as *mut libc::c_void,
        )?;
        Ok(value)
    }

    pub fn set_max_speed(&mut self, speed_hz: u32) -> Result<(), BusError> {
        self.ioctl(
            "SPI_IOC_WR_MAX_SPEED_HZ",
            SPI_IOC_WR_MAX_SPEED_HZ,
            &speed_hz as *const u32 as *mut libc::c_void,
        )?;
        self.speed_hz = speed_hz;
        Ok(())
    }

    pub fn max_speed(&self) -> Result<u32, BusError> {
        let mut value = 0u32;
        self.ioctl(
            "SPI_IOC_RD_MAX_SPEED_HZ",
            SPI_IOC_RD_MAX_SPEED_HZ,
            &mut value as *mut u32 as *mut libc::c_void,
        )?;
        Ok(value)
    }

    fn submit(&self, transfer: &SpiIocTransfer) -> Result<(), BusError> {
        self.ioctl(
            "SPI_IOC_MESSAGE",
            spi_ioc_message(1),
            transfer as *const SpiIocTransfer as *mut libc::c_void,
        )
    }

    fn describe(&self, len: usize) -> SpiIocTransfer {
        SpiIocTransfer {
            len: len as u32,
            speed_hz: self.speed_hz,
            bits_per_word: self.bits_per_word,
            ..SpiIocTransfer::default()
        }
    }

    fn ioctl(
        &self,
        operation: &'static str,
        request: u32,
        arg: *mut libc::c_void,
    ) -> Result<(), BusError> {
        // SAFETY: every caller passes a pointer to a live value of the type
        // the request expects.
        let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, arg) };
        if rc < 0 {
            Err(BusError::Io {
                operation,
                source: io::Error::last_os_error(),
            })
        } else {
            Ok(())
        }
    }
}

impl SpiBus for SpiDevice {
    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), BusError> {
        check_transfer_lengths(read, write)?;
        let transfer = SpiIocTransfer {
            tx_buf: write.as_ptr() as u64,
            rx_buf: read.as_mut_ptr() as u64,
            ..self.describe(write.len())
        };
        self.submit(&transfer)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), BusError> {
        let transfer = SpiIocTransfer {
            tx_buf: data.as_ptr() as u64,
            ..self.describe(data.len())
        };
        self.submit(&transfer)
    }
}
