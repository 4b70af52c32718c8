//! Error types for the stkboot CLI

use thiserror::Error;

/// Errors raised outside the protocol engine
#[derive(Debug, Error)]
pub enum AppError {
    /// File or socket I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The configuration file is not valid TOML for this tool
    #[error("Invalid config file: {0}")]
    Config(#[from] toml::de::Error),

    /// The requested device is not in the profile table
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// A custom device description does not describe a usable memory layout
    #[error("Invalid device description: {0}")]
    InvalidDevice(String),

    /// The bootloader session ended with a fatal error
    #[error("Bootloader session failed: {0}")]
    Session(#[from] stkboot_core::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, AppError>;
