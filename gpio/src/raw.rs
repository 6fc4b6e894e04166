//! Memory-mapped GPIO register window.

use crate::{GpioError, GpioResult, RegisterBank};
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;

/// The GPIO controller's registers, mapped from `/dev/gpiomem` or `/dev/mem`.
///
/// The mapping is released when the bank is dropped.
pub struct MmapRegisterBank {
    mmap: MmapRaw,
    path: String,
}

impl MmapRegisterBank {
    /// Physical base of the GPIO controller on the BCM2835 (Pi 1, Zero).
    pub const BCM2835_BASE: u64 = 0x20200000;
    /// Physical base on the BCM2836/BCM2837 (Pi 2, Pi 3).
    pub const BCM2837_BASE: u64 = 0x3F200000;
    /// Physical base on the BCM2711 (Pi 4).
    pub const BCM2711_BASE: u64 = 0xFE200000;

    /// One page; covers every register the line driver touches.
    pub const WINDOW_LEN: usize = 4096;

    /// Maps the register window from `path`, starting at `offset` bytes into the file.
    ///
    /// `/dev/gpiomem` exposes the GPIO block at offset 0, `/dev/mem` needs the physical base.
    pub fn map(path: &str, offset: u64) -> GpioResult<Self> {
        let map_error = |err: std::io::Error| GpioError::Map {
            path: path.to_string(),
            kind: err.kind(),
        };

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(map_error)?;

        let mmap = MmapOptions::new()
            .offset(offset)
            .len(Self::WINDOW_LEN)
            .map_raw(&file)
            .map_err(map_error)?;

        Ok(MmapRegisterBank {
            mmap,
            path: path.to_string(),
        })
    }

    pub fn new_gpiomem() -> GpioResult<Self> {
        Self::map("/dev/gpiomem", 0)
    }

    pub fn new_mem(base: u64) -> GpioResult<Self> {
        Self::map("/dev/mem", base)
    }
}

impl Debug for MmapRegisterBank {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MmapRegisterBank({}@{:?})", self.path, self.mmap.as_ptr().addr())
    }
}

impl RegisterBank for MmapRegisterBank {
    fn size(&self) -> usize {
        self.mmap.len()
    }

    fn read(&self, offset: usize) -> GpioResult<u32> {
        self.check_offset(offset)?;
        let register_ptr = unsafe { self.mmap.as_ptr().add(offset) } as *const u32;
        Ok(unsafe { register_ptr.read_volatile() })
    }

    fn write(&self, offset: usize, value: u32) -> GpioResult<()> {
        self.check_offset(offset)?;
        let register_ptr = unsafe { self.mmap.as_mut_ptr().add(offset) } as *mut u32;
        unsafe { register_ptr.write_volatile(value) };
        Ok(())
    }
}
