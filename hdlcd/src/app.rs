//! The control surface: line-oriented requests against a shared display.
//!
//! | Request | Effect |
//! |---|---|
//! | `write <text>` | stores and shows a message |
//! | `char <c>` | writes one glyph at the cursor |
//! | `command <byte>` | sends a raw instruction, decimal or `0x` hex |
//! | `clear` | clears the screen |
//! | `get <setting>` | prints `separator` or `clear_before_write` |
//! | `set <setting> <value>` | changes a setting and saves the config |
//! | `show` | prints the stored message |
//! | `shutdown` | leaves the halt status on the screen and stops |
//!
//! Every request gets one line back: `ok`, the requested value, or `error: <reason>`.
//!
//! The separator is given as a single character or as a `0x` byte value.

use crate::config::Config;
use hdlcd_gpio::lcd::hd44780::driver::HD44780Driver;
use hdlcd_gpio::lcd::hd44780::LcdDisplay;
use hdlcd_gpio::setup::{date_time_lines, local_now, parse_number};
use log::{debug, error, info, warn};
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Setting {
    Separator,
    ClearBeforeWrite,
}

impl FromStr for Setting {
    type Err = ParseRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "separator" => Ok(Setting::Separator),
            "clear_before_write" => Ok(Setting::ClearBeforeWrite),
            _ => Err(ParseRequestError::UnknownSetting(s.to_string())),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ControlRequest {
    Write(Vec<u8>),
    Char(u8),
    Command(u8),
    Clear,
    Get(Setting),
    SetSeparator(u8),
    SetClearBeforeWrite(bool),
    Show,
    Shutdown,
}

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ParseRequestError {
    #[error("empty request")]
    Empty,
    #[error("unknown request: {0}")]
    UnknownRequest(String),
    #[error("unknown setting: {0}")]
    UnknownSetting(String),
    #[error("missing argument for {0}")]
    MissingArgument(&'static str),
    #[error("invalid argument for {0}: {1:?}")]
    InvalidArgument(&'static str, String),
}

impl FromStr for ControlRequest {
    type Err = ParseRequestError;

    /// Parses one request line. The text of `write` is taken verbatim after the first space.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, argument) = match line.split_once(' ') {
            Some((verb, argument)) => (verb, Some(argument)),
            None => (line, None),
        };

        let required = |name: &'static str| argument.ok_or(ParseRequestError::MissingArgument(name));
        let invalid = |name: &'static str, value: &str| {
            ParseRequestError::InvalidArgument(name, value.to_string())
        };

        match verb {
            "" => Err(ParseRequestError::Empty),
            "write" => Ok(ControlRequest::Write(
                argument.unwrap_or_default().as_bytes().to_vec(),
            )),
            "char" => {
                let glyph = required("char")?;
                match glyph.as_bytes() {
                    &[byte] => Ok(ControlRequest::Char(byte)),
                    _ => Err(invalid("char", glyph)),
                }
            }
            "command" => {
                let byte = required("command")?;
                parse_number("command", byte)
                    .map(ControlRequest::Command)
                    .map_err(|_| invalid("command", byte))
            }
            "clear" => Ok(ControlRequest::Clear),
            "get" => Ok(ControlRequest::Get(required("get")?.trim().parse()?)),
            "set" => {
                let (setting, value) = required("set")?
                    .split_once(' ')
                    .ok_or(ParseRequestError::MissingArgument("set"))?;
                match setting.parse::<Setting>()? {
                    Setting::Separator => parse_separator(value)
                        .map(ControlRequest::SetSeparator)
                        .ok_or_else(|| invalid("separator", value)),
                    Setting::ClearBeforeWrite => match value.trim() {
                        "true" | "1" | "on" => Ok(ControlRequest::SetClearBeforeWrite(true)),
                        "false" | "0" | "off" => Ok(ControlRequest::SetClearBeforeWrite(false)),
                        _ => Err(invalid("clear_before_write", value)),
                    },
                }
            }
            "show" => Ok(ControlRequest::Show),
            "shutdown" => Ok(ControlRequest::Shutdown),
            _ => Err(ParseRequestError::UnknownRequest(verb.to_string())),
        }
    }
}

/// A literal ASCII character, or any byte written as `0x..`. NUL ends messages, so it is refused.
fn parse_separator(value: &str) -> Option<u8> {
    let separator = match value.as_bytes() {
        &[byte] if byte.is_ascii() => byte,
        _ if value.starts_with("0x") || value.starts_with("0X") => {
            parse_number::<u8>("separator", value).ok()?
        }
        _ => return None,
    };
    (separator != 0).then_some(separator)
}

/// Printable separators as themselves, anything else as a `0x` byte value.
fn describe_separator(separator: u8) -> String {
    if separator.is_ascii_graphic() {
        (separator as char).to_string()
    } else {
        format!("{:#04x}", separator)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reply {
    Ok,
    Value(String),
    Halt,
}

impl Display for Reply {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Ok | Reply::Halt => write!(f, "ok"),
            Reply::Value(value) => write!(f, "{}", value),
        }
    }
}

/// Why [App::run] returned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Stop {
    /// A `shutdown` request was served; the halt status is on the screen.
    Shutdown,
    /// The input ran out. The display is untouched.
    EndOfInput,
}

/// The status left on the screen when the daemon stops.
pub fn status_message(at: OffsetDateTime, separator: u8) -> Result<String, time::error::Format> {
    let date_time = date_time_lines(at, separator)?;
    Ok(format!("System halted{}{date_time}", separator as char))
}

/// Clears the screen and leaves the halt status on it.
pub fn halt<D: HD44780Driver>(display: &LcdDisplay<D>, at: OffsetDateTime) -> eyre::Result<()> {
    let status = status_message(at, display.separator())?;
    info!("Shutting down: {:?}", status);
    display.shutdown(&status)?;
    Ok(())
}

/// Runs the halt hook for a termination signal. Waits for any message in flight to finish.
pub fn halt_on_signal<D: HD44780Driver>(display: &LcdDisplay<D>) {
    info!("Received shutdown signal");
    if let Err(err) = halt(display, local_now()) {
        error!("Failed to leave the halt status: {}", err);
    }
}

/// The main app state: the display and the config it was set up with.
pub struct App<D: HD44780Driver> {
    display: Arc<LcdDisplay<D>>,
    config: Config,
    config_path: PathBuf,
}

impl<D: HD44780Driver> App<D> {
    /// Creates the app and applies `config` to the display.
    pub fn new(display: Arc<LcdDisplay<D>>, config: Config, config_path: PathBuf) -> Self {
        config.apply(&display);
        App {
            display,
            config,
            config_path,
        }
    }

    pub fn display(&self) -> &LcdDisplay<D> {
        &self.display
    }

    pub fn execute(&mut self, request: ControlRequest) -> eyre::Result<Reply> {
        debug!("Executing {:?}", request);
        match request {
            ControlRequest::Write(text) => {
                let summary = self.display.submit(&text)?;
                debug!("Rendered {:?}", summary);
            }
            ControlRequest::Char(glyph) => self.display.write_char(glyph)?,
            ControlRequest::Command(command) => self.display.write_command(command)?,
            ControlRequest::Clear => self.display.clear()?,
            ControlRequest::Get(Setting::Separator) => {
                return Ok(Reply::Value(describe_separator(self.display.separator())));
            }
            ControlRequest::Get(Setting::ClearBeforeWrite) => {
                return Ok(Reply::Value(self.display.clear_before_write().to_string()));
            }
            ControlRequest::SetSeparator(separator) => {
                self.display.set_separator(separator);
                self.config.separator = separator as char;
                self.save_config()?;
            }
            ControlRequest::SetClearBeforeWrite(clear) => {
                self.display.set_clear_before_write(clear);
                self.config.clear_before_write = clear;
                self.save_config()?;
            }
            ControlRequest::Show => {
                let message = self.display.last_message();
                return Ok(Reply::Value(String::from_utf8_lossy(&message).into_owned()));
            }
            ControlRequest::Shutdown => {
                self.shutdown(local_now())?;
                return Ok(Reply::Halt);
            }
        }
        Ok(Reply::Ok)
    }

    /// Leaves the halt status on the screen.
    pub fn shutdown(&self, at: OffsetDateTime) -> eyre::Result<()> {
        halt(&self.display, at)
    }

    /// Answers requests from `input` until a `shutdown` request or the end of input.
    ///
    /// Running out of input does not halt; the caller decides whether more input can follow.
    pub fn run(&mut self, input: impl BufRead, mut output: impl Write) -> eyre::Result<Stop> {
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let reply = line
                .parse::<ControlRequest>()
                .map_err(eyre::Report::from)
                .and_then(|request| self.execute(request));

            match reply {
                Ok(Reply::Halt) => {
                    writeln!(output, "{}", Reply::Halt)?;
                    output.flush()?;
                    return Ok(Stop::Shutdown);
                }
                Ok(reply) => writeln!(output, "{}", reply)?,
                Err(err) => {
                    warn!("Request {:?} failed: {}", line, err);
                    writeln!(output, "error: {}", err)?;
                }
            }
            output.flush()?;
        }

        Ok(Stop::EndOfInput)
    }

    /// Answers requests from stdin-like `input`, halting when it runs out.
    pub fn serve_stream(&mut self, input: impl BufRead, output: impl Write) -> eyre::Result<()> {
        if self.run(input, output)? == Stop::EndOfInput {
            info!("End of input.");
            self.shutdown(local_now())?;
        }
        Ok(())
    }

    /// Answers requests from the control file at `path` until a `shutdown` request.
    ///
    /// A FIFO is reopened every time its last writer closes it, so later writers are still
    /// served. A regular file is read once and its end halts, like the end of stdin.
    pub fn serve_path(&mut self, path: &Path, mut output: impl Write) -> eyre::Result<()> {
        let fifo = std::fs::metadata(path)?.file_type().is_fifo();
        loop {
            let input = BufReader::new(File::open(path)?);
            match self.run(input, &mut output)? {
                Stop::Shutdown => return Ok(()),
                Stop::EndOfInput if fifo => {
                    debug!("Writer closed {}, reopening.", path.display());
                }
                Stop::EndOfInput => {
                    info!("End of input.");
                    return self.shutdown(local_now());
                }
            }
        }
    }

    fn save_config(&self) -> std::io::Result<()> {
        self.config.save_to(&self.config_path)?;
        debug!("Config saved to {}.", self.config_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdlcd_gpio::delay::VirtualClock;
    use hdlcd_gpio::lcd::hd44780::driver::GpioHD44780Driver;
    use hdlcd_gpio::lcd::hd44780::{DisplayLayout, PinAssignment, Transaction};
    use hdlcd_gpio::line::GpioLineDriver;
    use hdlcd_gpio::sim::{Hd44780Model, InterfaceMode, SimulatedBank};
    use std::fs::OpenOptions;
    use std::process::Command;
    use std::thread;
    use time::macros::datetime;

    type SimApp = App<GpioHD44780Driver<Arc<SimulatedBank>, VirtualClock>>;

    struct Harness {
        app: SimApp,
        bank: Arc<SimulatedBank>,
        dir: tempfile::TempDir,
    }

    fn harness(config: Config) -> Harness {
        let pins = PinAssignment::default();
        let bank = Arc::new(SimulatedBank::with_controller(Hd44780Model::new(
            pins,
            InterfaceMode::EightBit,
        )));
        let driver =
            GpioHD44780Driver::new(GpioLineDriver::new(bank.clone()), pins, VirtualClock::new())
                .unwrap();
        let display = LcdDisplay::start(driver, DisplayLayout::LCD_20X4).unwrap();
        bank.controller_mut(|c| c.clear_log());

        let dir = tempfile::tempdir().unwrap();
        let app = App::new(Arc::new(display), config, dir.path().join("config.json"));
        Harness { app, bank, dir }
    }

    impl Harness {
        fn run(&mut self, input: &str) -> String {
            let mut output = Vec::new();
            self.app.run(input.as_bytes(), &mut output).unwrap();
            String::from_utf8(output).unwrap()
        }

        fn halted(&self) -> bool {
            self.line(0).starts_with("System halted")
        }

        fn line(&self, line: usize) -> String {
            self.bank
                .controller(|c| c.line(&DisplayLayout::LCD_20X4, line))
                .flatten()
                .unwrap()
        }

        fn saved(&self) -> Option<Config> {
            Config::try_load_from(&self.dir.path().join("config.json"))
        }
    }

    #[test]
    fn requests_parse() {
        let cases = [
            ("write Hi+there", ControlRequest::Write(b"Hi+there".to_vec())),
            ("write  two  spaces", ControlRequest::Write(b" two  spaces".to_vec())),
            ("write", ControlRequest::Write(Vec::new())),
            ("char x", ControlRequest::Char(b'x')),
            ("char  ", ControlRequest::Char(b' ')),
            ("command 0x0F", ControlRequest::Command(0x0F)),
            ("command 192", ControlRequest::Command(0xC0)),
            ("clear", ControlRequest::Clear),
            ("get separator", ControlRequest::Get(Setting::Separator)),
            ("get clear_before_write", ControlRequest::Get(Setting::ClearBeforeWrite)),
            ("set separator |", ControlRequest::SetSeparator(b'|')),
            ("set separator 0x0a", ControlRequest::SetSeparator(b'\n')),
            ("set separator 0XE9", ControlRequest::SetSeparator(0xE9)),
            ("set separator 0", ControlRequest::SetSeparator(b'0')),
            ("set clear_before_write on", ControlRequest::SetClearBeforeWrite(true)),
            ("show\r\n", ControlRequest::Show),
            ("shutdown", ControlRequest::Shutdown),
        ];
        for (line, expected) in cases {
            assert_eq!(line.parse(), Ok(expected), "{line:?}");
        }
    }

    #[test]
    fn bad_requests_are_explained() {
        assert_eq!(
            "blink".parse::<ControlRequest>(),
            Err(ParseRequestError::UnknownRequest("blink".to_string()))
        );
        assert_eq!(
            "char".parse::<ControlRequest>(),
            Err(ParseRequestError::MissingArgument("char"))
        );
        assert_eq!(
            "char xy".parse::<ControlRequest>(),
            Err(ParseRequestError::InvalidArgument("char", "xy".to_string()))
        );
        assert!("command 256".parse::<ControlRequest>().is_err());
        assert!("set separator".parse::<ControlRequest>().is_err());
        for separator in ["0x00", "0x100", "0x", "é", "ab"] {
            assert_eq!(
                format!("set separator {separator}").parse::<ControlRequest>(),
                Err(ParseRequestError::InvalidArgument("separator", separator.to_string()))
            );
        }
        assert!("set clear_before_write maybe".parse::<ControlRequest>().is_err());
        assert_eq!(
            "get contrast".parse::<ControlRequest>(),
            Err(ParseRequestError::UnknownSetting("contrast".to_string()))
        );
    }

    #[test]
    fn status_uses_twelve_hour_time() {
        let status = status_message(datetime!(2024-03-07 15:04:05 UTC), b'+').unwrap();
        assert_eq!(status, "System halted+03-07-2024+03:04:05 PM");

        let status = status_message(datetime!(2024-12-31 00:30:00 UTC), b'|').unwrap();
        assert_eq!(status, "System halted|12-31-2024|12:30:00 AM");
    }

    #[test]
    fn every_request_gets_one_reply() {
        let mut harness = harness(Config::default());
        let output = harness.run("write Hi+there\nshow\nget separator\nbogus\n\nshutdown\nclear\n");
        assert_eq!(output, "ok\nHi+there\n+\nerror: unknown request: bogus\nok\n");
    }

    #[test]
    fn written_messages_reach_the_screen() {
        let mut harness = harness(Config::default());
        harness.run("write Hi+there\nshutdown\n");
        assert!(harness.line(0).starts_with("System halted"));

        let transactions = harness.bank.controller(|c| c.transactions()).unwrap();
        assert_eq!(transactions[0], Transaction::Data(b'H'));
        assert!(transactions.contains(&Transaction::Command(0xC0)));
    }

    #[test]
    fn separate_inputs_keep_being_served() {
        let mut harness = harness(Config::default());
        let mut output = Vec::new();
        let stop = harness.app.run(&b"write first\n"[..], &mut output).unwrap();
        assert_eq!(stop, Stop::EndOfInput);
        assert!(harness.line(0).starts_with("first"));

        let stop = harness.app.run(&b"write second+line\nshow\n"[..], &mut output).unwrap();
        assert_eq!(stop, Stop::EndOfInput);
        assert_eq!(String::from_utf8(output).unwrap(), "ok\nok\nsecond+line\n");
        assert!(harness.line(0).starts_with("second"));
        assert!(harness.line(1).starts_with("line"));
        assert!(!harness.halted());
    }

    #[test]
    fn shutdown_request_stops_the_run() {
        let mut harness = harness(Config::default());
        let stop = harness.app.run(&b"shutdown\nwrite late\n"[..], Vec::new()).unwrap();
        assert_eq!(stop, Stop::Shutdown);
        assert!(harness.halted());
    }

    #[test]
    fn end_of_stream_runs_the_shutdown_hook() {
        let mut harness = harness(Config::default());
        let mut output = Vec::new();
        harness.app.serve_stream(&b"char A\n"[..], &mut output).unwrap();
        assert_eq!(output, b"ok\n");
        assert!(harness.halted());
        assert!(harness.line(1).ends_with("  "));
        assert_eq!(&harness.line(1)[2..3], "-");
    }

    #[test]
    fn end_of_control_file_runs_the_shutdown_hook() {
        let mut harness = harness(Config::default());
        let path = harness.dir.path().join("requests");
        std::fs::write(&path, "write hello\n").unwrap();

        let mut output = Vec::new();
        harness.app.serve_path(&path, &mut output).unwrap();
        assert_eq!(output, b"ok\n");
        assert!(harness.halted());
    }

    #[test]
    fn control_fifo_outlives_its_writers() {
        let mut harness = harness(Config::default());
        let path = harness.dir.path().join("control");
        let made = Command::new("mkfifo").arg(&path).status().unwrap();
        assert!(made.success());

        let writer_path = path.clone();
        let writer = thread::spawn(move || {
            for session in ["write first\n", "write second\nshow\nshutdown\n"] {
                let mut fifo = OpenOptions::new().write(true).open(&writer_path).unwrap();
                fifo.write_all(session.as_bytes()).unwrap();
            }
        });

        let mut output = Vec::new();
        harness.app.serve_path(&path, &mut output).unwrap();
        writer.join().unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "ok\nok\nsecond\nok\n");
        assert!(harness.halted());
    }

    #[test]
    fn signal_leaves_the_halt_status() {
        let mut harness = harness(Config::default());
        harness.run("write working\n");
        assert!(!harness.halted());

        halt_on_signal(harness.app.display());
        assert!(harness.halted());
        assert_eq!(&harness.line(1)[2..3], "-");
    }

    #[test]
    fn separator_reads_back_printable_or_as_a_byte() {
        let mut harness = harness(Config::default());
        let output = harness.run("set separator 0x0a\nget separator\nset separator 0x7c\nget separator\n");
        assert_eq!(output, "ok\n0x0a\nok\n|\n");
        assert_eq!(harness.app.display().separator(), b'|');
        assert_eq!(harness.saved().map(|config| config.separator), Some('|'));

        harness.run("set separator 0xe9\n");
        assert_eq!(harness.saved().map(|config| config.separator), Some('\u{e9}'));
        assert_eq!(harness.saved().unwrap().separator_byte(), 0xe9);
    }

    #[test]
    fn settings_are_applied_and_saved() {
        let mut harness = harness(Config {
            separator: '|',
            clear_before_write: false,
        });
        assert_eq!(harness.app.display().separator(), b'|');

        harness.run("set clear_before_write true\nget clear_before_write\nshutdown\n");
        assert!(harness.app.display().clear_before_write());
        assert_eq!(
            harness.saved(),
            Some(Config {
                separator: '|',
                clear_before_write: true,
            })
        );
    }

    #[test]
    fn oversize_write_is_an_error_reply() {
        let mut harness = harness(Config::default());
        let input = format!("write {}\nshow\nshutdown\n", "x".repeat(84));
        let output = harness.run(&input);
        assert_eq!(
            output,
            "error: payload of 84 bytes exceeds the message buffer capacity of 83 bytes\n\nok\n"
        );
    }
}
