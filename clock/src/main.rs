use dotenv::dotenv;
use hdlcd_gpio::setup::{LcdSettings, date_time_lines, local_now, parse_number};
use log::{debug, info};
use std::env::var;
use std::thread::sleep;
use std::time::Duration;
use sysinfo::System;

/// Time between two refreshes of the screen.
const REFRESH: Duration = Duration::from_millis(10);

fn main() -> eyre::Result<()> {
    dotenv().ok();
    pretty_env_logger::init();

    const UNKNOWN_STR: &str = "???";

    info!(
        "Hello, {}!",
        System::name().as_deref().unwrap_or(UNKNOWN_STR)
    );
    info!(
        "System ver {} kernel ver {}",
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );
    info!(
        "Hostname {}",
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR)
    );
    info!("Architecture {}", System::cpu_arch());

    let settings = LcdSettings::from_env()?;
    info!("{}", settings);

    let iterations: Option<u64> = match var("HDLCD_CLOCK_ITERATIONS") {
        Ok(value) => Some(parse_number("HDLCD_CLOCK_ITERATIONS", &value)?),
        Err(_) => None,
    };

    let display = settings.open()?;
    // Frames overwrite the previous glyphs in place.
    display.set_clear_before_write(false);
    display.clear()?;

    info!("Clock running, refreshing every {:?}", REFRESH);
    let mut shown = 0u64;
    while iterations.is_none_or(|limit| shown < limit) {
        let face = date_time_lines(local_now(), display.separator())?;
        display.write_message(&face)?;
        shown += 1;
        sleep(REFRESH);
    }

    debug!("Shown {} frames.", shown);
    Ok(())
}
