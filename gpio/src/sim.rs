//! In-memory stand-in for the GPIO register window, with an optional model of an HD44780
//! controller listening on the lines.
//!
//! [SimulatedBank] behaves like the hardware where it matters for the line driver: writes to
//! `GPSETn`/`GPCLRn` change `GPLEVn`, the set/clear registers read back as zero and the level
//! registers ignore writes. Everything else is plain memory.
//!
//! [Hd44780Model] samples the lines after every level change and latches a nibble on each falling
//! edge of EN, the same way the real controller does, tracking its 8-bit/4-bit interface state.

use crate::delay::VirtualClock;
use crate::lcd::hd44780::{DisplayLayout, PinAssignment, Transaction};
use crate::line::{GPCLR0, GPLEV0, GPSET0};
use crate::{GpioResult, RegisterBank};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const GPSET1: usize = GPSET0 + 4;
const GPCLR1: usize = GPCLR0 + 4;
const GPLEV1: usize = GPLEV0 + 4;

pub struct SimulatedBank {
    state: Mutex<SimState>,
}

struct SimState {
    registers: [u32; SimulatedBank::WINDOW_LEN / 4],
    controller: Option<Hd44780Model>,
}

impl SimulatedBank {
    pub const WINDOW_LEN: usize = 0x100;

    pub fn new() -> Self {
        SimulatedBank {
            state: Mutex::new(SimState {
                registers: [0; Self::WINDOW_LEN / 4],
                controller: None,
            }),
        }
    }

    /// Creates a bank with a controller attached to the lines.
    pub fn with_controller(controller: Hd44780Model) -> Self {
        let bank = Self::new();
        bank.lock().controller = Some(controller);
        bank
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the attached controller, if there is one.
    pub fn controller<R>(&self, f: impl FnOnce(&Hd44780Model) -> R) -> Option<R> {
        self.lock().controller.as_ref().map(f)
    }

    pub fn controller_mut<R>(&self, f: impl FnOnce(&mut Hd44780Model) -> R) -> Option<R> {
        self.lock().controller.as_mut().map(f)
    }
}

impl Default for SimulatedBank {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for SimulatedBank {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimulatedBank")
    }
}

impl RegisterBank for SimulatedBank {
    fn size(&self) -> usize {
        Self::WINDOW_LEN
    }

    fn read(&self, offset: usize) -> GpioResult<u32> {
        self.check_offset(offset)?;
        Ok(match offset {
            GPSET0 | GPSET1 | GPCLR0 | GPCLR1 => 0,
            _ => self.lock().registers[offset / 4],
        })
    }

    fn write(&self, offset: usize, value: u32) -> GpioResult<()> {
        self.check_offset(offset)?;
        let mut state = self.lock();
        let level_index = |register: usize, first: usize| GPLEV0 / 4 + (register - first) / 4;

        match offset {
            GPSET0 | GPSET1 => state.registers[level_index(offset, GPSET0)] |= value,
            GPCLR0 | GPCLR1 => state.registers[level_index(offset, GPCLR0)] &= !value,
            GPLEV0 | GPLEV1 => return Ok(()),
            _ => {
                state.registers[offset / 4] = value;
                return Ok(());
            }
        }

        let levels = [state.registers[GPLEV0 / 4], state.registers[GPLEV1 / 4]];
        if let Some(controller) = state.controller.as_mut() {
            controller.observe(levels);
        }
        Ok(())
    }
}

/// Interface width the controller currently expects.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InterfaceMode {
    EightBit,
    FourBit,
}

/// One nibble latched by a falling edge of EN.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Latch {
    pub register_select: bool,
    pub nibble: u8,
}

/// Behavioural model of an HD44780 wired in 4-bit mode (DB0–DB3 tied low).
pub struct Hd44780Model {
    pins: PinAssignment,
    mode: InterfaceMode,
    pending: Option<u8>,
    enable: bool,
    clock: Option<Arc<VirtualClock>>,
    latches: Vec<Latch>,
    transactions: Vec<(Duration, Transaction)>,
    ddram: [u8; 128],
    address: u8,
    increment: bool,
    two_lines: bool,
    display_on: bool,
    cursor_on: bool,
    blink_on: bool,
}

impl Hd44780Model {
    pub fn new(pins: PinAssignment, mode: InterfaceMode) -> Self {
        Hd44780Model {
            pins,
            mode,
            pending: None,
            enable: false,
            clock: None,
            latches: Vec::new(),
            transactions: Vec::new(),
            ddram: [b' '; 128],
            address: 0,
            increment: true,
            two_lines: false,
            display_on: false,
            cursor_on: false,
            blink_on: false,
        }
    }

    /// Starts in 4-bit mode halfway through a byte, as after an interrupted transfer.
    pub fn with_pending_nibble(mut self, nibble: u8) -> Self {
        self.mode = InterfaceMode::FourBit;
        self.pending = Some(nibble & 0x0F);
        self
    }

    /// Timestamps every decoded transaction with the clock's current time.
    pub fn with_clock(mut self, clock: Arc<VirtualClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn mode(&self) -> InterfaceMode {
        self.mode
    }

    pub fn latches(&self) -> &[Latch] {
        &self.latches
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.transactions.iter().map(|&(_, t)| t).collect()
    }

    pub fn timed_transactions(&self) -> &[(Duration, Transaction)] {
        &self.transactions
    }

    /// Forgets everything latched so far, keeping the controller state.
    pub fn clear_log(&mut self) {
        self.latches.clear();
        self.transactions.clear();
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Whether the controller is in the state the initialization sequence leaves it in:
    /// 4-bit, 2 lines, display on, cursor and blink off, auto-increment, no half-received byte.
    pub fn is_ready(&self) -> bool {
        self.mode == InterfaceMode::FourBit
            && self.pending.is_none()
            && self.two_lines
            && self.display_on
            && !self.cursor_on
            && !self.blink_on
            && self.increment
    }

    /// The visible text of a display line.
    pub fn line(&self, layout: &DisplayLayout, line: usize) -> Option<String> {
        let base = layout.base(line)? as usize;
        let columns = layout.columns as usize;
        Some(self.ddram[base..base + columns].iter().map(|&b| b as char).collect())
    }

    fn observe(&mut self, levels: [u32; 2]) {
        let level = |pin: usize| (levels[pin / 32] >> (pin % 32)) & 1 != 0;

        let enable = level(self.pins.en);
        if self.enable && !enable {
            let nibble = self
                .pins
                .data
                .iter()
                .enumerate()
                .fold(0u8, |acc, (bit, &pin)| acc | (u8::from(level(pin)) << bit));
            self.latch(level(self.pins.rs), nibble);
        }
        self.enable = enable;
    }

    fn latch(&mut self, register_select: bool, nibble: u8) {
        self.latches.push(Latch { register_select, nibble });

        match self.mode {
            InterfaceMode::EightBit => self.execute(register_select, nibble << 4),
            InterfaceMode::FourBit => match self.pending.take() {
                None => self.pending = Some(nibble),
                Some(high) => self.execute(register_select, (high << 4) | nibble),
            },
        }
    }

    fn execute(&mut self, register_select: bool, byte: u8) {
        let timestamp = self.clock.as_ref().map_or(Duration::ZERO, |clock| clock.now());
        let transaction = if register_select {
            Transaction::Data(byte)
        } else {
            Transaction::Command(byte)
        };
        self.transactions.push((timestamp, transaction));

        if register_select {
            self.ddram[self.address as usize] = byte;
            self.advance();
            return;
        }

        match byte {
            0x01 => {
                self.ddram = [b' '; 128];
                self.address = 0;
                self.increment = true;
            }
            0x02..=0x03 => self.address = 0,
            0x04..=0x07 => self.increment = byte & 0b10 != 0,
            0x08..=0x0F => {
                self.display_on = byte & 0b100 != 0;
                self.cursor_on = byte & 0b10 != 0;
                self.blink_on = byte & 0b1 != 0;
            }
            0x10..=0x1F => {}
            0x20..=0x3F => {
                self.mode = if byte & 0x10 != 0 {
                    InterfaceMode::EightBit
                } else {
                    InterfaceMode::FourBit
                };
                self.two_lines = byte & 0x08 != 0;
            }
            0x40..=0x7F => {}
            _ => self.address = byte & 0x7F,
        }
    }

    fn advance(&mut self) {
        self.address = if self.increment {
            self.address.wrapping_add(1) & 0x7F
        } else {
            self.address.wrapping_sub(1) & 0x7F
        };
    }
}

impl Debug for Hd44780Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hd44780Model({:?}, {:?})", self.mode, self.pins)
    }
}
