mod app;
mod config;

use crate::app::{App, halt_on_signal};
use crate::config::Config;
use dotenv::dotenv;
use hdlcd_gpio::setup::LcdSettings;
use log::{debug, info};
use std::env::var_os;
use std::io;
use std::path::Path;
use std::process;
use std::sync::Arc;

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    let env_file = dotenv();
    pretty_env_logger::init();
    if let Err(err) = env_file {
        debug!("No .env file loaded: {}", err);
    }

    info!("hdlcd starting...");

    let settings = LcdSettings::from_env()?;
    info!("{}", settings);

    debug!("Trying to load config...");
    let config_path = Config::path();
    let config = if let Some(config) = Config::try_load_from(&config_path) {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save_to(&config_path)?;
        info!("Default config saved.");
        config
    };

    debug!("Initializing display...");
    let display = Arc::new(settings.open()?);
    let mut app = App::new(display.clone(), config, config_path);

    ctrlc::set_handler(move || {
        halt_on_signal(&display);
        process::exit(0);
    })?;

    let separator = app.display().separator() as char;
    app.display()
        .submit(format!("  Hello From{separator}  Userspace!").as_bytes())?;

    info!("hdlcd initialized.");

    match var_os("HDLCD_CONTROL") {
        Some(path) => {
            info!("Reading requests from {}", path.to_string_lossy());
            app.serve_path(Path::new(&path), io::stdout().lock())?;
        }
        None => {
            info!("Reading requests from stdin");
            app.serve_stream(io::stdin().lock(), io::stdout().lock())?;
        }
    }

    info!("hdlcd stopped.");
    Ok(())
}
