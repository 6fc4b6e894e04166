use dotenv::var;
use hdlcd_gpio::lcd::hd44780::driver::HD44780Driver;
use hdlcd_gpio::lcd::hd44780::{DEFAULT_SEPARATOR, LcdDisplay};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime settings of the display, persisted between runs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Byte that starts a new line in a message.
    pub separator: char,
    /// Whether every message clears the screen first.
    pub clear_before_write: bool,
}

impl Config {
    /// Location of the config file, `CONFIG_FILE` or `config.json`.
    pub fn path() -> PathBuf {
        PathBuf::from(var("CONFIG_FILE").unwrap_or_else(|_| "config.json".to_string()))
    }

    pub fn try_load_from(config_path: &Path) -> Option<Self> {
        if config_path.exists() {
            let file = std::fs::File::open(config_path).ok()?;
            let reader = std::io::BufReader::new(file);
            serde_json::from_reader(reader)
                .inspect_err(|err| warn!("Ignoring malformed {}: {}", config_path.display(), err))
                .ok()
        } else {
            None
        }
    }

    pub fn save_to(&self, config_path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::create(config_path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// The separator as a single byte. Characters past U+00FF, and NUL, fall back to the default.
    pub fn separator_byte(&self) -> u8 {
        match u8::try_from(self.separator) {
            Ok(separator) if separator != 0 => separator,
            _ => {
                warn!(
                    "Separator {:?} does not fit a byte, using {:?}",
                    self.separator, DEFAULT_SEPARATOR as char
                );
                DEFAULT_SEPARATOR
            }
        }
    }

    pub fn apply<D: HD44780Driver>(&self, display: &LcdDisplay<D>) {
        display.set_separator(self.separator_byte());
        display.set_clear_before_write(self.clear_before_write);
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            separator: DEFAULT_SEPARATOR as char,
            clear_before_write: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Config {
            separator: '|',
            clear_before_write: true,
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::try_load_from(&path), Some(config));
    }

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::try_load_from(&dir.path().join("none.json")), None);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "clear_before_write": true }"#).unwrap();

        let config = Config::try_load_from(&path).unwrap();
        assert_eq!(config.separator, '+');
        assert!(config.clear_before_write);
    }

    #[test]
    fn malformed_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "separator = '+'").unwrap();
        assert_eq!(Config::try_load_from(&path), None);
    }

    #[test]
    fn separator_is_kept_as_a_byte() {
        let byte = |separator| Config { separator, ..Config::default() }.separator_byte();
        assert_eq!(byte('|'), b'|');
        assert_eq!(byte('\n'), 0x0a);
        assert_eq!(byte('\u{e9}'), 0xe9);
    }

    #[test]
    fn separator_past_a_byte_falls_back() {
        let byte = |separator| Config { separator, ..Config::default() }.separator_byte();
        assert_eq!(byte('\u{20ac}'), b'+');
        assert_eq!(byte('\0'), b'+');
    }
}
