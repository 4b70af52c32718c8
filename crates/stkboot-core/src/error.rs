//! Error types for stkboot-core
//!
//! This module provides a no_std compatible error type shared by the frame
//! parser, the programming engine and the session loop.

use core::fmt;

/// Reason a frame was dropped by the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Declared payload length exceeds the frame buffer
    PayloadTooLarge {
        /// Length announced in the frame header
        declared: u16,
    },
    /// Declared payload length is zero, so there is no opcode
    EmptyFrame,
    /// Byte after the length field was not the token
    BadToken(u8),
    /// Checksum byte did not match the running XOR
    ChecksumMismatch {
        /// Checksum computed over the received bytes
        expected: u8,
        /// Checksum byte received
        found: u8,
    },
    /// Sequence number refused in strict sequence mode
    SequenceRejected(u8),
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Malformed frame (only surfaced through `ParseEvent::Rejected`)
    Frame(FrameError),

    // Request errors
    /// Request payload shorter than the command requires
    InvalidLength,
    /// Flash access not word aligned or odd sized
    InvalidAlignment,
    /// Address range outside device memory
    AddressOutOfBounds,
    /// Range reaches into the boot-protected region
    RegionProtected,
    /// Reply does not fit the frame buffer
    BufferTooSmall,
    /// Command disabled in this build configuration
    Unsupported,

    // Device errors
    /// Device capability reported a failure
    DeviceError,
    /// Device stayed busy past the configured poll budget
    Timeout,

    // Transport errors
    /// Transport read or write failed
    IoError,
}

impl Error {
    /// Whether this error must abort the session instead of failing a command
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Timeout | Self::IoError)
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLarge { declared } => {
                write!(f, "declared payload length {} exceeds frame buffer", declared)
            }
            Self::EmptyFrame => write!(f, "empty frame"),
            Self::BadToken(b) => write!(f, "expected token 0x0E, found 0x{:02X}", b),
            Self::ChecksumMismatch { expected, found } => write!(
                f,
                "checksum mismatch: expected 0x{:02X}, found 0x{:02X}",
                expected, found
            ),
            Self::SequenceRejected(seq) => write!(f, "sequence number {} rejected", seq),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame(e) => write!(f, "framing error: {}", e),
            Self::InvalidLength => write!(f, "request payload too short"),
            Self::InvalidAlignment => write!(f, "invalid alignment"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::RegionProtected => write!(f, "region is boot protected"),
            Self::BufferTooSmall => write!(f, "reply does not fit frame buffer"),
            Self::Unsupported => write!(f, "command not enabled"),
            Self::DeviceError => write!(f, "device operation failed"),
            Self::Timeout => write!(f, "device busy-wait timed out"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
