//! Single GPIO lines on top of a [RegisterBank].
//!
//! Register layout of the BCM283x GPIO controller (byte offsets from its base):
//!
//! | Register | Offset |
//! |---|---|
//! | `GPFSEL0`–`GPFSEL5` | `0x00`–`0x14` |
//! | `GPSET0`, `GPSET1` | `0x1C`, `0x20` |
//! | `GPCLR0`, `GPCLR1` | `0x28`, `0x2C` |
//! | `GPLEV0`, `GPLEV1` | `0x34`, `0x38` |
//!
//! Each function-select register packs 10 pins, 3 bits each. Set, clear and level registers hold
//! one bit per pin, 32 pins per register.

use crate::{GpioError, GpioResult, RegisterBank};
use bitvec::vec::BitVec;
use log::trace;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::AtomicU8;

pub const GPFSEL0: usize = 0x00;
pub const GPSET0: usize = 0x1C;
pub const GPCLR0: usize = 0x28;
pub const GPLEV0: usize = 0x34;

/// Function-select value for a digital input.
pub const FUNCTION_INPUT: u32 = 0b000;
/// Function-select value for a digital output.
pub const FUNCTION_OUTPUT: u32 = 0b001;

pub struct GpioLineDriver<B: RegisterBank> {
    bank: B,
    outputs: BitVec<AtomicU8>,
}

impl<B: RegisterBank> GpioLineDriver<B> {
    /// Number of GPIO lines on the BCM2835.
    pub const PIN_COUNT: usize = 54;

    pub fn new(bank: B) -> Self {
        GpioLineDriver {
            bank,
            outputs: BitVec::repeat(false, Self::PIN_COUNT),
        }
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    fn check_pin(pin: usize) -> GpioResult<()> {
        if pin >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }
        Ok(())
    }

    /// Reads the 3-bit function-select field of the pin.
    pub fn function(&self, pin: usize) -> GpioResult<u32> {
        Self::check_pin(pin)?;
        let offset = GPFSEL0 + (pin / 10) * 4;
        let shift = (pin % 10) * 3;
        Ok((self.bank.read(offset)? >> shift) & 0b111)
    }

    /// Writes the 3-bit function-select field of the pin, leaving the other 9 pins untouched.
    pub fn set_function(&self, pin: usize, function: u32) -> GpioResult<()> {
        Self::check_pin(pin)?;
        if function > 0b111 {
            return Err(GpioError::InvalidArgument);
        }

        let offset = GPFSEL0 + (pin / 10) * 4;
        let shift = (pin % 10) * 3;

        let mut register_value = self.bank.read(offset)?;
        register_value &= !(0b111 << shift);
        register_value |= function << shift;
        self.bank.write(offset, register_value)?;

        self.outputs.set_aliased(pin, function == FUNCTION_OUTPUT);
        trace!("Set pin function: pin={} function={:03b}", pin, function);
        Ok(())
    }

    /// Makes the pin a digital output. Calling it again is harmless.
    pub fn configure_output(&self, pin: usize) -> GpioResult<()> {
        self.set_function(pin, FUNCTION_OUTPUT)
    }

    pub fn is_output(&self, pin: usize) -> bool {
        pin < Self::PIN_COUNT && self.outputs[pin]
    }

    /// Drives the pin high.
    pub fn set(&self, pin: usize) -> GpioResult<()> {
        self.write(pin, true)
    }

    /// Drives the pin low.
    pub fn clear(&self, pin: usize) -> GpioResult<()> {
        self.write(pin, false)
    }

    /// Drives the pin high or low through the GPSETn/GPCLRn registers.
    pub fn write(&self, pin: usize, high: bool) -> GpioResult<()> {
        Self::check_pin(pin)?;
        if !self.outputs[pin] {
            return Err(GpioError::NotOutput(pin));
        }

        let base = if high { GPSET0 } else { GPCLR0 };
        self.bank.write(base + (pin / 32) * 4, 1 << (pin % 32))
    }

    /// Reads the current level of the pin from GPLEVn.
    pub fn level(&self, pin: usize) -> GpioResult<bool> {
        Self::check_pin(pin)?;
        let register_value = self.bank.read(GPLEV0 + (pin / 32) * 4)?;
        Ok((register_value >> (pin % 32)) & 1 != 0)
    }
}

impl<B: RegisterBank> Debug for GpioLineDriver<B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpioLineDriver({:?})", self.bank)
    }
}
