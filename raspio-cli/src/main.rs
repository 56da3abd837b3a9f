//! raspio command line
//!
//! Pin access for scripts and bench work on a Raspberry Pi.
//!
//! # Usage
//!
//! ```bash
//! # Board, pinout and available drivers
//! raspio info
//!
//! # Read a pin with the pull-up enabled
//! raspio read P1-11 --resistor pull-up
//!
//! # Drive a pin high and leave it driven
//! raspio write GPIO18 1
//!
//! # Blink an LED three times
//! raspio blink 18 --duration-ms 100 --count 3
//!
//! # Print input changes of the pins described in a file
//! raspio watch --config pins.toml --seconds 30
//!
//! # Read a DHT11 sensor
//! raspio dht 4 --model dht11
//! ```
//!
//! Pins are given as processor numbers (`17`, `GPIO17`) or connector
//! positions (`P1-11`). Set `RUST_LOG` or pass `--verbose` for diagnostics.

mod commands;
mod config;
mod hardware;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use raspio_hal::Pinout;

use commands::{parse_level, Context, ModelArg, ResistorArg};
use hardware::DriverChoice;

/// Raspberry Pi GPIO from the command line
#[derive(Parser)]
#[command(name = "raspio")]
#[command(version)]
#[command(about = "Raspberry Pi GPIO, I2C and SPI from the command line")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pin driver
    #[arg(short, long, global = true, value_enum, default_value_t = DriverChoice::Auto)]
    driver: DriverChoice,

    /// Connector pinout (rev1, rev2, plus); detected from the board by default
    #[arg(short, long, global = true)]
    pinout: Option<Pinout>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the board, its pinout and the available drivers
    Info,

    /// Print the level of an input pin
    Read {
        /// Pin (17, GPIO17 or P1-11)
        pin: String,

        /// Pull resistor
        #[arg(short, long, value_enum, default_value_t = ResistorArg::None)]
        resistor: ResistorArg,
    },

    /// Drive an output pin
    Write {
        /// Pin (17, GPIO17 or P1-11)
        pin: String,

        /// Level (0 or 1)
        #[arg(value_parser = parse_level, action = ArgAction::Set)]
        level: bool,

        /// Hold the level this long, then release the pin
        #[arg(long)]
        hold_ms: Option<u64>,
    },

    /// Toggle an output pin and toggle it back
    Blink {
        /// Pin (17, GPIO17 or P1-11)
        pin: String,

        /// Time spent in the toggled state
        #[arg(long, default_value_t = 250)]
        duration_ms: u64,

        /// Number of blinks
        #[arg(short, long, default_value_t = 1)]
        count: u32,
    },

    /// Print changes of the pins described in a configuration file
    Watch {
        /// TOML connection description
        #[arg(short, long)]
        config: PathBuf,

        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,
    },

    /// Read a DHT temperature and humidity sensor
    Dht {
        /// Data pin (17, GPIO17 or P1-11)
        pin: String,

        /// Sensor model
        #[arg(short, long, value_enum, default_value_t = ModelArg::Dht22)]
        model: ModelArg,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let ctx = Context {
        driver: cli.driver,
        pinout: cli.pinout,
    };

    match cli.command {
        Commands::Info => commands::info(ctx),
        Commands::Read { pin, resistor } => commands::read(ctx, &pin, resistor),
        Commands::Write {
            pin,
            level,
            hold_ms,
        } => commands::write(ctx, &pin, level, hold_ms.map(Duration::from_millis)),
        Commands::Blink {
            pin,
            duration_ms,
            count,
        } => commands::blink(ctx, &pin, Duration::from_millis(duration_ms), count),
        Commands::Watch { config, seconds } => commands::watch(ctx, &config, seconds),
        Commands::Dht { pin, model } => commands::dht(ctx, &pin, model),
    }
}
