//! CLI argument parsing

use crate::transport::Connection;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "stkboot")]
#[command(author, version, about = "STK500v2 bootloader emulator", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options for `stkboot serve`
#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    /// Transport: dev=/dev/ttyACM0[:baud] or ip=[host:]port
    #[arg(short, long, value_parser = Connection::parse)]
    pub transport: Connection,

    /// Device profile to emulate (see list-devices)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Configuration file (TOML format)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Pre-load flash from this raw binary image
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Write the flash contents to this file when the session ends
    #[arg(long)]
    pub dump: Option<PathBuf>,

    /// Only accept sequence numbers 1 and the expected next sequence
    #[arg(long)]
    pub strict_sequence: bool,

    /// Give up after this many busy polls per erase/write
    #[arg(long, value_parser = parse_hex_u32)]
    pub busy_timeout: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one bootloader session against an emulated device
    Serve(ServeArgs),

    /// List built-in device profiles
    ListDevices,
}
