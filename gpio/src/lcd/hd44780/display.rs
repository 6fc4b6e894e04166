use crate::lcd::hd44780::driver::HD44780Driver;
use crate::lcd::hd44780::DisplayLayout;
use crate::{GpioError, GpioResult};
use log::{debug, warn};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Capacity of the message buffer, enough for a full 20x4 screen with its separators.
pub const MAX_MESSAGE_LEN: usize = 83;

/// Byte that moves the cursor to the next line unless configured otherwise.
pub const DEFAULT_SEPARATOR: u8 = b'+';

/// What a render put on the screen.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RenderSummary {
    /// Data bytes sent.
    pub glyphs: usize,
    /// Lines addressed, counting the first one.
    pub lines: usize,
    /// Whether text after the last line was dropped.
    pub truncated: bool,
}

/// An initialized display shared between callers.
///
/// All access to the controller goes through one lock, held for the whole of each operation, so
/// a message is always sent as one uninterrupted run of transactions. The lock also guards the
/// message buffer, which keeps the last payload accepted by [LcdDisplay::submit].
///
/// Messages are split into lines on the separator byte (`+` by default). A NUL byte ends the
/// message. Lines past the last one of the [DisplayLayout] are dropped.
pub struct LcdDisplay<D: HD44780Driver> {
    state: Mutex<DisplayState<D>>,
    layout: DisplayLayout,
    separator: AtomicU8,
    clear_before_write: AtomicBool,
}

struct DisplayState<D> {
    driver: D,
    buffer: heapless::Vec<u8, MAX_MESSAGE_LEN>,
}

impl<D: HD44780Driver> LcdDisplay<D> {
    /// Wraps a driver whose controller is already initialized.
    pub fn new(driver: D, layout: DisplayLayout) -> GpioResult<Self> {
        if layout.lines() == 0 || layout.message_capacity() > MAX_MESSAGE_LEN {
            return Err(GpioError::InvalidArgument);
        }

        Ok(LcdDisplay {
            state: Mutex::new(DisplayState {
                driver,
                buffer: heapless::Vec::new(),
            }),
            layout,
            separator: AtomicU8::new(DEFAULT_SEPARATOR),
            clear_before_write: AtomicBool::new(false),
        })
    }

    /// Initializes the controller, then wraps the driver.
    ///
    /// Initialization runs before the display can be shared, so it needs no lock.
    pub fn start(mut driver: D, layout: DisplayLayout) -> GpioResult<Self> {
        driver.init()?;
        Self::new(driver, layout)
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState<D>> {
        // A caller that panicked mid-message leaves the controller usable; the next message
        // just starts from wherever the cursor was.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn layout(&self) -> &DisplayLayout {
        &self.layout
    }

    /// Largest payload [LcdDisplay::submit] accepts.
    pub fn capacity(&self) -> usize {
        self.layout.message_capacity()
    }

    pub fn separator(&self) -> u8 {
        self.separator.load(Ordering::Relaxed)
    }

    pub fn set_separator(&self, separator: u8) {
        self.separator.store(separator, Ordering::Relaxed);
    }

    pub fn clear_before_write(&self) -> bool {
        self.clear_before_write.load(Ordering::Relaxed)
    }

    pub fn set_clear_before_write(&self, clear: bool) {
        self.clear_before_write.store(clear, Ordering::Relaxed);
    }

    /// Clears the screen and waits for the controller to finish.
    pub fn clear(&self) -> GpioResult<()> {
        self.lock().driver.clear_display()
    }

    /// Renders `text` without storing it.
    pub fn write_message(&self, text: impl AsRef<[u8]>) -> GpioResult<RenderSummary> {
        let mut state = self.lock();
        self.render(&mut state.driver, text.as_ref(), self.clear_before_write())
    }

    /// Stores `payload` in the message buffer and renders it.
    ///
    /// Payloads longer than [LcdDisplay::capacity] are rejected before the buffer or the
    /// display is touched.
    pub fn submit(&self, payload: &[u8]) -> GpioResult<RenderSummary> {
        let capacity = self.capacity();
        if payload.len() > capacity {
            warn!("Rejected {}-byte message, capacity is {}", payload.len(), capacity);
            return Err(GpioError::OversizeInput {
                len: payload.len(),
                capacity,
            });
        }

        let mut state = self.lock();
        let DisplayState { driver, buffer } = &mut *state;
        buffer.clear();
        buffer
            .extend_from_slice(payload)
            .map_err(|_| GpioError::OversizeInput {
                len: payload.len(),
                capacity,
            })?;

        self.render(driver, &buffer[..], self.clear_before_write())
    }

    /// Sends a single data byte at the current cursor position.
    pub fn write_char(&self, data: u8) -> GpioResult<()> {
        self.lock().driver.send_data(data)
    }

    /// Sends a single raw command byte.
    pub fn write_command(&self, command: u8) -> GpioResult<()> {
        self.lock().driver.send_command(command)
    }

    /// Copy of the last payload accepted by [LcdDisplay::submit].
    pub fn last_message(&self) -> Vec<u8> {
        self.lock().buffer.to_vec()
    }

    /// Clears the screen and leaves `status` on it, as one operation.
    pub fn shutdown(&self, status: &str) -> GpioResult<RenderSummary> {
        debug!("Writing shutdown status: {:?}", status);
        let mut state = self.lock();
        self.render(&mut state.driver, status.as_bytes(), true)
    }

    pub fn into_driver(self) -> D {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .driver
    }

    fn render(&self, driver: &mut D, text: &[u8], clear_first: bool) -> GpioResult<RenderSummary> {
        if clear_first {
            driver.clear_display()?;
        }

        let separator = self.separator();
        let mut summary = RenderSummary {
            lines: 1,
            ..RenderSummary::default()
        };
        let mut line = 0;

        for &byte in text.iter().take_while(|&&byte| byte != 0) {
            if byte != separator {
                driver.send_data(byte)?;
                summary.glyphs += 1;
                continue;
            }

            line += 1;
            match self.layout.base(line) {
                Some(base) => {
                    driver.set_ddram_address(base)?;
                    summary.lines = line + 1;
                }
                None => {
                    warn!(
                        "Message has more than {} lines, dropping the rest",
                        self.layout.lines()
                    );
                    summary.truncated = true;
                    break;
                }
            }
        }

        driver.return_home()?;
        Ok(summary)
    }
}

impl<D: HD44780Driver> Debug for LcdDisplay<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "LcdDisplay({}x{})", self.layout.columns, self.layout.lines())
    }
}
