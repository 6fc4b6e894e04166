//! HD44780 LCD module.
//!
//! The controller is wired in 4-bit mode: RS, EN and DB4–DB7 are GPIO outputs, R/W is tied to
//! ground, so the display is write-only and there is no busy flag to poll. Every command is
//! followed by a fixed wait long enough for the slowest controller in the family, see [timing].
//!
//! - [driver] holds the command set ([driver::HD44780Driver]) and the GPIO implementation of the
//!   nibble/byte protocol and power-on sequence ([driver::GpioHD44780Driver]).
//! - [LcdDisplay] shares one initialized driver between callers and renders multi-line messages.

pub mod driver;
mod display;

pub use display::*;

use crate::{GpioError, GpioResult};
use std::fmt::{Display, Formatter};

/// Minimum delays of the protocol. All of them are lower bounds.
pub mod timing {
    use std::time::Duration;

    /// Power-on reset budget of the controller before the first write.
    pub const POWER_ON: Duration = Duration::from_millis(250);
    /// How long EN is held high, and low again, around each latch.
    pub const ENABLE_PULSE: Duration = Duration::from_micros(50);
    /// Setup time of RS before the first nibble of a transaction.
    pub const REGISTER_SELECT_SETUP: Duration = Duration::from_micros(50);
    /// Gap between the interface-reset latches.
    pub const INTERFACE_RESET: Duration = Duration::from_micros(250);
    /// Execution time of the clear display command.
    pub const CLEAR: Duration = Duration::from_millis(20);
    /// Settle time around the return home command.
    pub const HOME: Duration = Duration::from_millis(2);
}

/// GPIO numbers of the lines connected to the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinAssignment {
    /// Register select.
    pub rs: usize,
    /// Enable.
    pub en: usize,
    /// DB4, DB5, DB6, DB7.
    pub data: [usize; 4],
}

impl PinAssignment {
    pub fn all(&self) -> [usize; 6] {
        [
            self.rs,
            self.en,
            self.data[0],
            self.data[1],
            self.data[2],
            self.data[3],
        ]
    }

    /// Checks that every pin exists and no pin has two roles.
    pub fn validate(&self, pin_count: usize) -> GpioResult<()> {
        let pins = self.all();
        if pins.iter().any(|&pin| pin >= pin_count) {
            return Err(GpioError::InvalidArgument);
        }
        for (i, pin) in pins.iter().enumerate() {
            if pins[i + 1..].contains(pin) {
                return Err(GpioError::AlreadyInUse);
            }
        }
        Ok(())
    }
}

impl Default for PinAssignment {
    fn default() -> Self {
        PinAssignment {
            rs: 25,
            en: 24,
            data: [23, 17, 27, 22],
        }
    }
}

impl Display for PinAssignment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RS: {}, EN: {}, Data: {:?}", self.rs, self.en, self.data)
    }
}

/// One byte sent to the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Transaction {
    /// Sent with RS low.
    Command(u8),
    /// Sent with RS high, displayed as a glyph.
    Data(u8),
}

impl Transaction {
    pub fn byte(&self) -> u8 {
        match *self {
            Transaction::Command(byte) | Transaction::Data(byte) => byte,
        }
    }

    /// Level of the RS line for this transaction.
    pub fn register_select(&self) -> bool {
        matches!(self, Transaction::Data(_))
    }
}

/// Geometry of the display: columns per line and the DDRAM address each line starts at.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DisplayLayout {
    pub columns: u8,
    pub line_bases: &'static [u8],
}

impl DisplayLayout {
    pub const LCD_20X4: DisplayLayout = DisplayLayout {
        columns: 20,
        line_bases: &[0x00, 0x40, 0x14, 0x54],
    };

    pub const LCD_16X2: DisplayLayout = DisplayLayout {
        columns: 16,
        line_bases: &[0x00, 0x40],
    };

    pub fn lines(&self) -> usize {
        self.line_bases.len()
    }

    /// DDRAM address of the first column of `line`, if the display has that line.
    pub fn base(&self, line: usize) -> Option<u8> {
        self.line_bases.get(line).copied()
    }

    /// Largest message that can be shown at once: every column of every line plus the separators
    /// between lines.
    pub fn message_capacity(&self) -> usize {
        self.columns as usize * self.lines() + self.lines().saturating_sub(1)
    }
}

impl std::str::FromStr for DisplayLayout {
    type Err = GpioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "20x4" => Ok(Self::LCD_20X4),
            "16x2" => Ok(Self::LCD_16X2),
            _ => Err(GpioError::InvalidArgument),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pins_are_valid() {
        assert_eq!(PinAssignment::default().validate(54), Ok(()));
    }

    #[test]
    fn shared_pins_are_rejected() {
        let pins = PinAssignment {
            rs: 25,
            en: 24,
            data: [23, 17, 24, 22],
        };
        assert_eq!(pins.validate(54), Err(GpioError::AlreadyInUse));
    }

    #[test]
    fn missing_pins_are_rejected() {
        let pins = PinAssignment {
            rs: 54,
            ..PinAssignment::default()
        };
        assert_eq!(pins.validate(54), Err(GpioError::InvalidArgument));
    }

    #[test]
    fn capacities_match_the_geometry() {
        assert_eq!(DisplayLayout::LCD_20X4.message_capacity(), 83);
        assert_eq!(DisplayLayout::LCD_16X2.message_capacity(), 33);
    }

    #[test]
    fn layouts_parse_by_name() {
        assert_eq!("20x4".parse(), Ok(DisplayLayout::LCD_20X4));
        assert_eq!(" 16X2 ".parse(), Ok(DisplayLayout::LCD_16X2));
        assert!("40x2".parse::<DisplayLayout>().is_err());
    }

    #[test]
    fn register_select_is_high_for_data() {
        assert!(Transaction::Data(b'x').register_select());
        assert!(!Transaction::Command(0x01).register_select());
        assert_eq!(Transaction::Command(0x80).byte(), 0x80);
    }
}
