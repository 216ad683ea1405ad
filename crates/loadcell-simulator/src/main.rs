//! Desktop simulator for the HX711 load-cell scale.
//!
//! Runs the real `loadcell-core` driver and console against a simulated
//! HX711 on a virtual clock, with the calibration record kept in a file.
//! Commands are read line by line from stdin.
//!
//! # Keys
//!
//! | Key         | Action                                  |
//! |-------------|-----------------------------------------|
//! | `L <grams>` | Put a load on the simulated cell        |
//! | `q`         | Quit                                    |
//! | other       | Console command, `m` prints the menu    |

mod chip;
mod config;
mod storage;

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::{Context, anyhow};
use log::{error, info, warn};

use loadcell_core::{Console, Hx711, Scale};

use crate::chip::SimulatedHx711;
use crate::config::SimulatorConfig;
use crate::storage::{DEFAULT_EEPROM_SIZE, FileEeprom};

/// Reply buffer for one console command; the menu is the longest reply.
const REPLY_CAPACITY: usize = 1024;

const PROMPT: &str = "> ";

// ---------------------------------------------------------------------------
// Simulator-only commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum SimCommand {
    PlaceLoad(f64),
    Quit,
}

/// `Some` for lines the simulator handles itself, `Err` for a malformed one.
fn parse_sim_command(line: &str) -> Option<Result<SimCommand, String>> {
    let line = line.trim();
    if line == "q" {
        return Some(Ok(SimCommand::Quit));
    }
    let argument = line.strip_prefix('L')?.trim();
    Some(
        argument
            .parse::<f64>()
            .ok()
            .filter(|grams| grams.is_finite())
            .map(SimCommand::PlaceLoad)
            .ok_or_else(|| format!("Usage: L <grams>, got '{}'", argument)),
    )
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let config = SimulatorConfig::from_env().context("loading simulator configuration")?;
    info!(
        "Simulated cell: offset {}, {} counts/g, noise ±{}",
        config.cell.offset, config.cell.counts_per_gram, config.cell.noise
    );

    let chip = SimulatedHx711::new(config.cell);
    let (sck, dt, delay) = chip.pins();
    let mut hx711 = Hx711::new(sck, dt, delay).with_ready_wait(config.settings.ready_wait);
    hx711
        .reset()
        .map_err(|e| anyhow!("resetting HX711: {}", e))?;

    let eeprom = FileEeprom::open(&config.eeprom_path, DEFAULT_EEPROM_SIZE)
        .with_context(|| format!("opening EEPROM image {}", config.eeprom_path.display()))?;
    info!(
        "EEPROM image {} ({} bytes)",
        eeprom.path().display(),
        eeprom.len()
    );

    let scale = Scale::new(hx711, config.settings.device);
    let mut console = Console::new(scale, eeprom, config.settings.console);
    match console.restore() {
        Ok(true) => info!("Stored calibration applied"),
        Ok(false) => info!("No stored calibration, calibrate with r, z and c"),
        Err(e) => warn!("Could not read stored calibration: {}", e),
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write!(out, "{}\n{}", console.respond::<REPLY_CAPACITY>("m"), PROMPT)?;
    out.flush()?;

    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        match parse_sim_command(&line) {
            Some(Ok(SimCommand::Quit)) => break,
            Some(Ok(SimCommand::PlaceLoad(grams))) => {
                chip.set_load(grams);
                writeln!(out, "Load on cell: {:.1} g", chip.load())?;
            }
            Some(Err(message)) => writeln!(out, "{}", message)?,
            None => {
                let reply = console.respond::<REPLY_CAPACITY>(&line);
                if !reply.is_empty() {
                    writeln!(out, "{}", reply)?;
                }
            }
        }
        write!(out, "{}", PROMPT)?;
        out.flush()?;
    }

    info!(
        "Simulated time elapsed: {:.3} s",
        chip.elapsed_ns() as f64 / 1e9
    );
    Ok(())
}
