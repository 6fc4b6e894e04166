//! Wiring a display from board settings, plus the date and time text, shared by the binaries.
//!
//! Settings come from the environment:
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `HDLCD_PIN_RS` | RS line | `25` |
//! | `HDLCD_PIN_EN` | EN line | `24` |
//! | `HDLCD_PINS_DATA` | DB4–DB7, separated by `,`, `;` or spaces | `23,17,27,22` |
//! | `HDLCD_GPIO_DEVICE` | `gpiomem` or `mem` | `gpiomem` |
//! | `HDLCD_GPIO_BASE` | physical GPIO base for `mem`, decimal or `0x` hex | `0x20200000` |
//! | `HDLCD_LAYOUT` | `20x4` or `16x2` | `20x4` |
//! | `HDLCD_SIMULATE` | drive a simulated controller instead of the hardware | `false` |

use crate::delay::SystemClock;
use crate::lcd::hd44780::driver::GpioHD44780Driver;
use crate::lcd::hd44780::{DisplayLayout, LcdDisplay, PinAssignment};
use crate::line::GpioLineDriver;
use crate::raw::MmapRegisterBank;
use crate::sim::{Hd44780Model, InterfaceMode, SimulatedBank};
use crate::{GpioError, GpioResult, RegisterBank};
use log::{debug, info};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use time::OffsetDateTime;
use time::macros::format_description;

/// The display type both binaries run on.
pub type SharedDisplay = LcdDisplay<GpioHD44780Driver<Arc<dyn RegisterBank>, SystemClock>>;

/// Where the GPIO registers come from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GpioDevice {
    /// `/dev/gpiomem`, usable without root.
    GpioMem,
    /// `/dev/mem` at the given physical base.
    Mem { base: u64 },
    /// An in-memory bank with a modelled controller attached.
    Simulated,
}

impl Display for GpioDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GpioDevice::GpioMem => write!(f, "/dev/gpiomem"),
            GpioDevice::Mem { base } => write!(f, "/dev/mem@{:#x}", base),
            GpioDevice::Simulated => write!(f, "simulated"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LcdSettings {
    pub pins: PinAssignment,
    pub device: GpioDevice,
    pub layout: DisplayLayout,
}

impl Default for LcdSettings {
    fn default() -> Self {
        LcdSettings {
            pins: PinAssignment::default(),
            device: GpioDevice::GpioMem,
            layout: DisplayLayout::LCD_20X4,
        }
    }
}

impl LcdSettings {
    pub fn from_env() -> GpioResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the settings through `lookup`, falling back to the defaults for unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> GpioResult<Self> {
        let defaults = Self::default();
        let setting = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let rs = match setting("HDLCD_PIN_RS") {
            Some(value) => parse_number("HDLCD_PIN_RS", &value)?,
            None => defaults.pins.rs,
        };
        let en = match setting("HDLCD_PIN_EN") {
            Some(value) => parse_number("HDLCD_PIN_EN", &value)?,
            None => defaults.pins.en,
        };
        let data = match setting("HDLCD_PINS_DATA") {
            Some(value) => parse_pin_bus(&value)?,
            None => defaults.pins.data,
        };

        let simulate = match setting("HDLCD_SIMULATE") {
            Some(value) => parse_flag("HDLCD_SIMULATE", &value)?,
            None => false,
        };
        let device = if simulate {
            GpioDevice::Simulated
        } else {
            match setting("HDLCD_GPIO_DEVICE").as_deref().map(str::trim) {
                None | Some("gpiomem") => GpioDevice::GpioMem,
                Some("mem") => GpioDevice::Mem {
                    base: match setting("HDLCD_GPIO_BASE") {
                        Some(value) => parse_number("HDLCD_GPIO_BASE", &value)?,
                        None => MmapRegisterBank::BCM2835_BASE,
                    },
                },
                Some(other) => return Err(invalid("HDLCD_GPIO_DEVICE", other)),
            }
        };

        let layout = match setting("HDLCD_LAYOUT") {
            Some(value) => value
                .parse::<DisplayLayout>()
                .map_err(|_| invalid("HDLCD_LAYOUT", &value))?,
            None => defaults.layout,
        };

        let pins = PinAssignment { rs, en, data };
        pins.validate(GpioLineDriver::<SimulatedBank>::PIN_COUNT)?;

        Ok(LcdSettings {
            pins,
            device,
            layout,
        })
    }

    /// Maps the register window, configures the lines and initializes the controller.
    pub fn open(&self) -> GpioResult<SharedDisplay> {
        debug!("Initializing GPIO from {}...", self.device);
        let bank: Arc<dyn RegisterBank> = match self.device {
            GpioDevice::GpioMem => Arc::new(MmapRegisterBank::new_gpiomem()?),
            GpioDevice::Mem { base } => Arc::new(MmapRegisterBank::new_mem(base)?),
            GpioDevice::Simulated => Arc::new(SimulatedBank::with_controller(Hd44780Model::new(
                self.pins,
                InterfaceMode::EightBit,
            ))),
        };
        debug!("{:?} initialized.", bank);

        let driver = GpioHD44780Driver::new(GpioLineDriver::new(bank), self.pins, SystemClock)?;
        let display = LcdDisplay::start(driver, self.layout)?;
        info!("{:?} ready on {}.", display, self.device);
        Ok(display)
    }
}

impl Display for LcdSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} LCD @ {} via {}",
            self.layout.columns,
            self.layout.lines(),
            self.pins,
            self.device
        )
    }
}

/// Parses four pin numbers separated by commas, semicolons or spaces.
pub fn parse_pin_bus(pin_str: &str) -> GpioResult<[usize; 4]> {
    pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| parse_number::<usize>("HDLCD_PINS_DATA", s))
        .collect::<GpioResult<Vec<_>>>()?
        .try_into()
        .map_err(|_| GpioError::Other("invalid number of data pins".to_string()))
}

/// Parses a decimal or `0x`-prefixed hexadecimal number.
pub fn parse_number<T: TryFrom<u64>>(name: &str, value: &str) -> GpioResult<T> {
    let trimmed = value.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse(),
    };
    parsed
        .ok()
        .and_then(|number| T::try_from(number).ok())
        .ok_or_else(|| invalid(name, value))
}

/// `MM-DD-YYYY` and `hh:mm:ss AM` joined by `separator`, so they land on two display lines.
pub fn date_time_lines(at: OffsetDateTime, separator: u8) -> Result<String, time::error::Format> {
    let date = at.format(format_description!("[month]-[day]-[year]"))?;
    let time = at.format(format_description!(
        "[hour repr:12]:[minute]:[second] [period]"
    ))?;
    Ok(format!("{date}{}{time}", separator as char))
}

/// Local time, or UTC when the local offset cannot be determined.
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn parse_flag(name: &str, value: &str) -> GpioResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}

fn invalid(name: &str, value: &str) -> GpioError {
    GpioError::Other(format!("invalid value for {}: {:?}", name, value))
}
