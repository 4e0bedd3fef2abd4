//! # memslot relay binary
//!
//! Moves exclusive and shared pointers through slot queues and reports what
//! arrived.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: both modes, 1000 messages, one pair
//! memslot_relay
//!
//! # From a config file, overriding the mode
//! memslot_relay --config config/relay.toml --mode shared
//!
//! # Four pairs, JSON logs and a JSON report on stdout
//! memslot_relay --consumers 4 --json --report
//! ```

#![deny(warnings)]

use clap::Parser;
use memslot::config::{ConfigLoader, Validate};
use memslot::init_tracing;
use memslot_relay::{RelayConfig, RelayMode, RelayOverrides};
use std::path::PathBuf;
use tracing::{error, info};

/// memslot relay - slot-queue pointer hand-off driver
#[derive(Parser, Debug)]
#[command(name = "memslot_relay")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Moves memslot pointers between threads through fixed-size slot queues")]
#[command(long_about = None)]
struct Args {
    /// Relay configuration file (TOML). Built-in defaults when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Messages per producer and mode
    #[arg(short, long)]
    messages: Option<u32>,

    /// Pointer family to exercise
    #[arg(long, value_enum)]
    mode: Option<RelayMode>,

    /// Producer/consumer pairs
    #[arg(long)]
    consumers: Option<u8>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    report: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("Relay failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(Default::default(), args.json);
            return Err(e.into());
        }
    };

    let level = if args.verbose {
        config.shared.log_level.verbose()
    } else {
        config.shared.log_level
    };
    init_tracing(level, args.json);

    info!(
        "memslot relay v{} starting as {}",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name
    );

    let report = memslot_relay::run(&config)?;

    if args.report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    info!("Relay complete");
    Ok(())
}

/// File (or defaults), then command-line overrides, then validation.
fn load_config(args: &Args) -> Result<RelayConfig, memslot_relay::RelayError> {
    let mut config = match &args.config {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::default(),
    };

    config.apply(RelayOverrides {
        messages: args.messages,
        mode: args.mode,
        consumers: args.consumers,
    });
    config.validate()?;
    Ok(config)
}
