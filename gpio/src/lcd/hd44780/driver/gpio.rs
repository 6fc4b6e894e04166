use crate::delay::Clock;
use crate::lcd::hd44780::driver::{CursorDirection, HD44780Driver};
use crate::lcd::hd44780::{timing, PinAssignment, Transaction};
use crate::line::GpioLineDriver;
use crate::{GpioError, GpioResult, RegisterBank};
use log::{debug, trace};
use std::fmt::{Debug, Formatter};
use std::time::Duration;

/// HD44780 driver bit-banging the 4-bit interface on GPIO lines.
///
/// The data lines are written one at a time; the controller only samples them on the falling edge
/// of EN, which comes after all four writes and the enable hold time.
pub struct GpioHD44780Driver<B: RegisterBank, C: Clock> {
    gpio: GpioLineDriver<B>,
    pins: PinAssignment,
    clock: C,
}

impl<B: RegisterBank, C: Clock> GpioHD44780Driver<B, C> {
    /// Validates the pin assignment and configures every pin as an output.
    pub fn new(gpio: GpioLineDriver<B>, pins: PinAssignment, clock: C) -> GpioResult<Self> {
        pins.validate(GpioLineDriver::<B>::PIN_COUNT)?;
        for pin in pins.all() {
            gpio.configure_output(pin)?;
        }
        debug!("HD44780 lines configured: {}", pins);

        Ok(GpioHD44780Driver { gpio, pins, clock })
    }

    pub fn pins(&self) -> &PinAssignment {
        &self.pins
    }

    pub fn gpio(&self) -> &GpioLineDriver<B> {
        &self.gpio
    }

    /// Puts the low 4 bits of `nibble` on DB4–DB7.
    pub fn send_nibble(&self, nibble: u8) -> GpioResult<()> {
        if nibble > 0b1111 {
            return Err(GpioError::InvalidArgument);
        }

        for (bit, &pin) in self.pins.data.iter().enumerate() {
            self.gpio.write(pin, nibble & (1 << bit) != 0)?;
        }
        Ok(())
    }

    /// Latches whatever is on the data lines into the controller.
    pub fn pulse_enable(&self) -> GpioResult<()> {
        self.gpio.set(self.pins.en)?;
        self.clock.sleep_at_least(timing::ENABLE_PULSE);
        self.gpio.clear(self.pins.en)?;
        self.clock.sleep_at_least(timing::ENABLE_PULSE);
        Ok(())
    }

    /// Sends one byte as two nibbles, high nibble first.
    pub fn transact(&mut self, transaction: Transaction) -> GpioResult<()> {
        let data = transaction.byte();
        let rs = transaction.register_select();
        trace!("Sending data: {:08b}, RS: {}", data, rs);

        self.gpio.write(self.pins.rs, rs)?;
        self.clock.sleep_at_least(timing::REGISTER_SELECT_SETUP);

        let high_nibble = (data >> 4) & 0x0F;
        let low_nibble = data & 0x0F;

        trace!("Writing HN: {:04b}", high_nibble);
        self.send_nibble(high_nibble)?;
        self.pulse_enable()?;

        trace!("Writing LN: {:04b}", low_nibble);
        self.send_nibble(low_nibble)?;
        self.pulse_enable()?;

        Ok(())
    }
}

impl<B: RegisterBank, C: Clock> Debug for GpioHD44780Driver<B, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpioHD44780Driver({:?}; {})", self.gpio, self.pins)
    }
}

impl<B: RegisterBank, C: Clock> HD44780Driver for GpioHD44780Driver<B, C> {
    /// Runs the power-on sequence.
    ///
    /// The controller may be in 8-bit mode, in 4-bit mode, or in 4-bit mode with half a byte
    /// already received. Latching `0011` three times puts it in 8-bit mode from any of these: in
    /// 4-bit mode the first one or two latches complete a byte, and an `0011xxxx` byte is itself an
    /// 8-bit function set. From 8-bit mode, a single `0010` switches to 4-bit, after which full
    /// instructions are sent as nibble pairs.
    fn init(&mut self) -> GpioResult<()> {
        debug!("Initializing HD44780...");
        self.clock.sleep_at_least(timing::POWER_ON);

        self.gpio.clear(self.pins.en)?;
        self.gpio.clear(self.pins.rs)?;

        // Interface reset: the same nibble latched three times.
        self.send_nibble(0b0011)?;
        self.pulse_enable()?;
        self.clock.sleep_at_least(timing::INTERFACE_RESET);
        self.pulse_enable()?;
        self.clock.sleep_at_least(timing::INTERFACE_RESET);
        self.pulse_enable()?;
        self.clock.sleep_at_least(timing::INTERFACE_RESET);

        // 4-bit interface, still an 8-bit instruction.
        self.send_nibble(0b0010)?;
        self.clock.sleep_at_least(timing::REGISTER_SELECT_SETUP);
        self.pulse_enable()?;

        self.function_set(false, true, false)?;
        self.set_entry_mode(CursorDirection::Right, false)?;
        self.set_display_control(true, false, false)?;
        self.clear_display()?;
        self.clock.sleep_at_least(timing::CLEAR);

        debug!("HD44780 initialized.");
        Ok(())
    }

    fn send_command(&mut self, command: u8) -> GpioResult<()> {
        self.transact(Transaction::Command(command))
    }

    fn send_data(&mut self, data: u8) -> GpioResult<()> {
        self.transact(Transaction::Data(data))
    }

    fn delay(&mut self, duration: Duration) {
        self.clock.sleep_at_least(duration);
    }
}
