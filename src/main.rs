//! stkboot - STK500v2 bootloader emulator
//!
//! Runs the `stkboot-core` protocol engine against an emulated AVR device
//! and exposes it on a serial port or TCP socket, so a stock STK500v2 host
//! (avrdude `-c stk500v2` / `-c wiring`) can program, read back and verify
//! the emulated memories.

mod cli;
mod commands;
mod config;
mod error;
mod transport;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Commands::Serve(args) => commands::serve::run(&args)?,
        Commands::ListDevices => commands::list_devices(),
    }

    Ok(())
}
