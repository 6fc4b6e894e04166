use crate::lcd::hd44780::timing;
use crate::{GpioError, GpioResult};
use std::fmt::Debug;
use std::time::Duration;

mod gpio;

pub use gpio::*;

/// The HD44780 instruction set on top of a write-only transport.
///
/// Implementations provide [send_command](HD44780Driver::send_command),
/// [send_data](HD44780Driver::send_data) and [delay](HD44780Driver::delay); the instructions are
/// built here. Instructions with a long execution time wait for it before returning, so the next
/// transaction can follow immediately.
pub trait HD44780Driver: Debug {
    /// Brings the controller from an unknown state to 4-bit, 2-line mode with the display on,
    /// cursor off and auto-increment.
    fn init(&mut self) -> GpioResult<()>;

    /// Clears the display and sets the cursor to the home position.
    /// Waits for the controller to finish clearing.
    fn clear_display(&mut self) -> GpioResult<()> {
        self.send_command(0b00000001)?;
        self.delay(timing::CLEAR);
        Ok(())
    }

    /// Sets the cursor to the home position, with a settle time before and after.
    fn return_home(&mut self) -> GpioResult<()> {
        self.delay(timing::HOME);
        self.send_command(0b00000010)?;
        self.delay(timing::HOME);
        Ok(())
    }

    /// Sets the display to the specified entry mode.
    fn set_entry_mode(&mut self, cursor_direction: CursorDirection, shift: bool) -> GpioResult<()> {
        let mut command = 0b00000100;
        if cursor_direction == CursorDirection::Right {
            command |= 0b00000010;
        }
        if shift {
            command |= 0b00000001;
        }
        self.send_command(command)
    }

    /// Sets the display on/off, cursor on/off, and blinking on/off.
    fn set_display_control(
        &mut self,
        display_on: bool,
        cursor_on: bool,
        blink_on: bool,
    ) -> GpioResult<()> {
        let mut command = 0b00001000;
        if display_on {
            command |= 0b00000100;
        }
        if cursor_on {
            command |= 0b00000010;
        }
        if blink_on {
            command |= 0b00000001;
        }
        self.send_command(command)
    }

    /// Sets the function set.
    ///
    /// `data_length` selects the 8-bit interface, `font` the 5x10 font.
    fn function_set(&mut self, data_length: bool, two_lines: bool, font: bool) -> GpioResult<()> {
        let mut command = 0b00100000;
        if data_length {
            command |= 0b00010000;
        }
        if two_lines {
            command |= 0b00001000;
        }
        if font {
            command |= 0b00000100;
        }
        self.send_command(command)
    }

    /// Sets the DDRAM address, moving the cursor there.
    fn set_ddram_address(&mut self, address: u8) -> GpioResult<()> {
        if address > 0b01111111 {
            return Err(GpioError::InvalidArgument);
        }
        let command = 0b10000000 | address;
        self.send_command(command)
    }

    // Low-level commands

    /// Sends a command to the HD44780 controller.
    /// Sets the RS pin to 0 (command).
    fn send_command(&mut self, command: u8) -> GpioResult<()>;

    /// Sends data to the HD44780 controller.
    /// Sets the RS pin to 1 (data).
    fn send_data(&mut self, data: u8) -> GpioResult<()>;

    /// Blocks for at least `duration`.
    fn delay(&mut self, duration: Duration);
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    /// Moves the cursor to the left after writing data.
    Left,
    /// Moves the cursor to the right after writing data.
    Right,
}
