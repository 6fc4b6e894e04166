//! GPIO and HD44780 character LCD support for BCM283x boards.
//!
//! The crate is layered the same way the hardware is wired:
//! - [RegisterBank] is the raw GPIO register window, either memory-mapped ([raw::MmapRegisterBank])
//!   or simulated in memory ([sim::SimulatedBank]),
//! - [line::GpioLineDriver] turns pin numbers into function-select, set and clear register writes,
//! - [lcd::hd44780] speaks the controller's 4-bit protocol on top of those lines and shares the
//!   display between callers.

pub mod delay;
pub mod lcd;
pub mod line;
pub mod raw;
pub mod setup;
pub mod sim;

use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("unable to map GPIO registers from {path}: {kind}")]
    Map {
        path: String,
        kind: std::io::ErrorKind,
    },
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("pin {0} is not configured as an output")]
    NotOutput(usize),
    #[error("register offset {0:#x} is outside of the register window")]
    OutOfWindow(usize),
    #[error("payload of {len} bytes exceeds the message buffer capacity of {capacity} bytes")]
    OversizeInput { len: usize, capacity: usize },
    #[error("error: {0}")]
    Other(String),
}

pub type GpioResult<T> = Result<T, GpioError>;

/// A window of 32-bit GPIO registers, addressed by byte offset from the controller's base address.
///
/// Writes take effect immediately. Some registers are write-only (set/clear), so reading back
/// what was written is not guaranteed to return the same value.
pub trait RegisterBank: Debug + Send + Sync {
    /// Size of the window in bytes.
    fn size(&self) -> usize;

    /// Reads the register at the given byte offset.
    fn read(&self, offset: usize) -> GpioResult<u32>;

    /// Writes the register at the given byte offset.
    fn write(&self, offset: usize, value: u32) -> GpioResult<()>;

    /// Checks that `offset` addresses a whole, aligned register inside the window.
    fn check_offset(&self, offset: usize) -> GpioResult<()> {
        if offset % 4 != 0 || offset + 4 > self.size() {
            return Err(GpioError::OutOfWindow(offset));
        }
        Ok(())
    }
}

impl<T: RegisterBank + ?Sized> RegisterBank for Arc<T> {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn read(&self, offset: usize) -> GpioResult<u32> {
        (**self).read(offset)
    }

    fn write(&self, offset: usize, value: u32) -> GpioResult<()> {
        (**self).write(offset, value)
    }
}

impl<T: RegisterBank + ?Sized> RegisterBank for &T {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn read(&self, offset: usize) -> GpioResult<u32> {
        (**self).read(offset)
    }

    fn write(&self, offset: usize, value: u32) -> GpioResult<()> {
        (**self).write(offset, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversize_message_mentions_both_sizes() {
        let err = GpioError::OversizeInput { len: 90, capacity: 83 };
        assert_eq!(
            err.to_string(),
            "payload of 90 bytes exceeds the message buffer capacity of 83 bytes"
        );
    }
}
