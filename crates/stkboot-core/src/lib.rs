//! stkboot-core - STK500v2 bootloader protocol engine
//!
//! This crate implements the device side of the STK500v2 (AVR068) in-system
//! programming protocol: the byte-level frame parser, the command processor,
//! the non-volatile memory programming engine and the reply encoder. It is
//! `no_std` and never touches hardware directly; everything device specific
//! goes through the [`device::Device`] trait.
//!
//! # Features
//!
//! - `std` - Enable standard library support (`std::error::Error`, std I/O
//!   errors through `embedded-io`)
//!
//! # Example
//!
//! ```ignore
//! use stkboot_core::{Bootloader, BootloaderConfig};
//!
//! fn enter_bootloader<D, T>(device: D, transport: &mut T) -> stkboot_core::Result<D>
//! where
//!     D: stkboot_core::device::Device,
//!     T: embedded_io::Read + embedded_io::Write,
//! {
//!     let mut bootloader = Bootloader::new(device, BootloaderConfig::default());
//!     bootloader.run(transport)?;
//!     Ok(bootloader.into_device())
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "std")]
extern crate std;

pub mod command;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod session;

#[cfg(test)]
mod mock;

pub use config::{BootloaderConfig, Options, VersionInfo};
pub use error::{Error, Result};
pub use frame::{Frame, ParseEvent};
pub use session::Bootloader;
