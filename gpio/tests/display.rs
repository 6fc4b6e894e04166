//! End-to-end behaviour of the display on a simulated GPIO bank with a modelled controller.

use hdlcd_gpio::delay::VirtualClock;
use hdlcd_gpio::lcd::hd44780::driver::GpioHD44780Driver;
use hdlcd_gpio::lcd::hd44780::Transaction::{Command, Data};
use hdlcd_gpio::lcd::hd44780::{DisplayLayout, LcdDisplay, PinAssignment, Transaction, timing};
use hdlcd_gpio::line::GpioLineDriver;
use hdlcd_gpio::sim::{Hd44780Model, InterfaceMode, SimulatedBank};
use hdlcd_gpio::{GpioError, GpioResult};
use std::sync::Arc;
use std::thread;

type SimDisplay = LcdDisplay<GpioHD44780Driver<Arc<SimulatedBank>, Arc<VirtualClock>>>;

struct Rig {
    display: Arc<SimDisplay>,
    bank: Arc<SimulatedBank>,
}

impl Rig {
    fn start(layout: DisplayLayout) -> GpioResult<Self> {
        let pins = PinAssignment::default();
        let clock = Arc::new(VirtualClock::new());
        let bank = Arc::new(SimulatedBank::with_controller(
            Hd44780Model::new(pins, InterfaceMode::EightBit).with_clock(clock.clone()),
        ));
        let driver = GpioHD44780Driver::new(GpioLineDriver::new(bank.clone()), pins, clock)?;
        let display = Arc::new(LcdDisplay::start(driver, layout)?);
        bank.controller_mut(|c| c.clear_log());
        Ok(Rig { display, bank })
    }

    fn transactions(&self) -> Vec<Transaction> {
        self.bank.controller(|c| c.transactions()).unwrap_or_default()
    }

    fn line(&self, line: usize) -> String {
        let layout = *self.display.layout();
        self.bank
            .controller(|c| c.line(&layout, line))
            .flatten()
            .unwrap_or_default()
    }
}

#[test]
fn controller_is_ready_after_start() -> GpioResult<()> {
    let rig = Rig::start(DisplayLayout::LCD_20X4)?;
    assert_eq!(rig.bank.controller(|c| c.is_ready()), Some(true));
    Ok(())
}

#[test]
fn message_lands_on_four_lines_and_the_fifth_is_dropped() -> GpioResult<()> {
    let rig = Rig::start(DisplayLayout::LCD_20X4)?;
    let summary = rig.display.write_message("A+B+C+D+E")?;
    assert!(summary.truncated);

    assert_eq!(rig.line(0), format!("{:<20}", "A"));
    assert_eq!(rig.line(1), format!("{:<20}", "B"));
    assert_eq!(rig.line(2), format!("{:<20}", "C"));
    assert_eq!(rig.line(3), format!("{:<20}", "D"));
    assert!(!rig.transactions().contains(&Data(b'E')));
    assert_eq!(rig.transactions().last(), Some(&Command(0x02)));
    Ok(())
}

#[test]
fn two_line_layout_drops_the_third_line() -> GpioResult<()> {
    let rig = Rig::start(DisplayLayout::LCD_16X2)?;
    rig.display.write_message("  Hello From+  Userspace!+extra")?;
    assert_eq!(rig.line(0), "  Hello From    ");
    assert_eq!(rig.line(1), "  Userspace!    ");
    Ok(())
}

#[test]
fn empty_message_sends_a_single_return_home() -> GpioResult<()> {
    let rig = Rig::start(DisplayLayout::LCD_20X4)?;
    rig.display.write_message("")?;
    assert_eq!(rig.transactions(), vec![Command(0x02)]);
    Ok(())
}

#[test]
fn clear_waits_before_the_next_transaction() -> GpioResult<()> {
    let rig = Rig::start(DisplayLayout::LCD_20X4)?;
    rig.display.clear()?;
    rig.display.write_char(b'x')?;

    let timed = rig
        .bank
        .controller(|c| c.timed_transactions().to_vec())
        .unwrap_or_default();
    assert_eq!(timed.len(), 2);
    assert_eq!(timed[0].1, Command(0x01));
    assert_eq!(timed[1].1, Data(b'x'));
    assert!(timed[1].0 - timed[0].0 >= timing::CLEAR);
    Ok(())
}

#[test]
fn clear_before_write_waits_before_the_first_glyph() -> GpioResult<()> {
    let rig = Rig::start(DisplayLayout::LCD_20X4)?;
    rig.display.set_clear_before_write(true);
    rig.display.write_message("hi")?;

    let timed = rig
        .bank
        .controller(|c| c.timed_transactions().to_vec())
        .unwrap_or_default();
    assert_eq!(timed[0].1, Command(0x01));
    assert_eq!(timed[1].1, Data(b'h'));
    assert!(timed[1].0 - timed[0].0 >= timing::CLEAR);
    Ok(())
}

#[test]
fn oversize_payload_never_reaches_the_bus() -> GpioResult<()> {
    let rig = Rig::start(DisplayLayout::LCD_20X4)?;
    rig.display.submit(b"first")?;
    rig.bank.controller_mut(|c| c.clear_log());

    let payload = vec![b'x'; rig.display.capacity() + 1];
    assert_eq!(
        rig.display.submit(&payload),
        Err(GpioError::OversizeInput {
            len: 84,
            capacity: 83
        })
    );
    assert_eq!(rig.display.last_message(), b"first");
    assert!(rig.transactions().is_empty());
    Ok(())
}

#[test]
fn concurrent_messages_never_interleave() -> GpioResult<()> {
    const ROUNDS: usize = 25;
    const LEN: usize = 12;

    let rig = Rig::start(DisplayLayout::LCD_20X4)?;
    let writers: Vec<_> = [b'a', b'b', b'c', b'd']
        .into_iter()
        .map(|glyph| {
            let display = rig.display.clone();
            thread::spawn(move || -> GpioResult<()> {
                let message = [glyph; LEN];
                for _ in 0..ROUNDS {
                    display.write_message(message)?;
                }
                Ok(())
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer panicked")?;
    }

    let transactions = rig.transactions();
    assert_eq!(transactions.len(), 4 * ROUNDS * (LEN + 1));
    for run in transactions.chunks(LEN + 1) {
        let first = run[0];
        assert!(matches!(first, Data(_)), "run starts with {first:?}");
        assert!(run[..LEN].iter().all(|&t| t == first), "interleaved run: {run:?}");
        assert_eq!(run[LEN], Command(0x02));
    }
    Ok(())
}

#[test]
fn single_writes_wait_for_a_message_in_flight() -> GpioResult<()> {
    let rig = Rig::start(DisplayLayout::LCD_20X4)?;
    let display = rig.display.clone();
    let writer = thread::spawn(move || -> GpioResult<()> {
        for _ in 0..20 {
            display.write_message("0123456789")?;
        }
        Ok(())
    });
    for _ in 0..50 {
        rig.display.write_char(b'#')?;
    }
    writer.join().expect("writer panicked")?;

    let transactions = rig.transactions();
    let mut in_message = false;
    for t in transactions {
        match t {
            Data(b'0') => in_message = true,
            Command(0x02) => in_message = false,
            Data(b'#') => assert!(!in_message, "single write landed inside a message"),
            _ => {}
        }
    }
    Ok(())
}
