//! TOML configuration file parsing
//!
//! ```toml
//! [bootloader]
//! strict_sequence = true
//! spi_multi = true
//! lock_bits = false
//! activity_indicator = true
//! busy_timeout = 100000
//!
//! [device]
//! name = "ATmega2560"        # start from a built-in profile
//! signature = ["0x1E", "0x98", "0x01"]
//! flash_size = "0x40000"
//! page_size = 256
//! boot_start = "0x3E000"
//! eeprom_size = 4096
//! fuses = ["0xFF", "0xD8", "0xFD"]
//! lock = "0xFF"
//! busy_polls = 3
//! ```
//!
//! Numbers may be written as integers or as hex/decimal strings.

use crate::error::{AppError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use stkboot_core::device::find_by_name;
use stkboot_core::{BootloaderConfig, Options};
use stkboot_dummy::DummyConfig;

/// Configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub bootloader: BootloaderSection,
    pub device: Option<DeviceSection>,
}

/// `[bootloader]` table
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootloaderSection {
    pub strict_sequence: Option<bool>,
    pub spi_multi: Option<bool>,
    pub lock_bits: Option<bool>,
    pub activity_indicator: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    pub busy_timeout: Option<u32>,
}

/// `[device]` table
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceSection {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_bytes3")]
    pub signature: Option<[u8; 3]>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    pub flash_size: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    pub page_size: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    pub boot_start: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    pub eeprom_size: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_bytes3")]
    pub fuses: Option<[u8; 3]>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    pub lock: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    pub busy_polls: Option<u32>,
}

/// A number written either as an integer or as a string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HexOrInt {
    Int(u32),
    Str(String),
}

impl HexOrInt {
    fn value(self) -> std::result::Result<u32, String> {
        match self {
            HexOrInt::Int(n) => Ok(n),
            HexOrInt::Str(s) => parse_number(&s),
        }
    }
}

/// Parse a number that can be hex (0x...) or decimal
fn parse_number(s: &str) -> std::result::Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

fn deserialize_opt_hex_u32<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<HexOrInt>::deserialize(deserializer)?
        .map(HexOrInt::value)
        .transpose()
        .map_err(serde::de::Error::custom)
}

fn deserialize_opt_bytes3<'de, D>(deserializer: D) -> std::result::Result<Option<[u8; 3]>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let Some(items) = Option::<Vec<HexOrInt>>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if items.len() != 3 {
        return Err(serde::de::Error::custom(format!(
            "expected 3 bytes, got {}",
            items.len()
        )));
    }
    let mut bytes = [0u8; 3];
    for (slot, item) in bytes.iter_mut().zip(items) {
        let value = item.value().map_err(serde::de::Error::custom)?;
        *slot = u8::try_from(value)
            .map_err(|_| serde::de::Error::custom(format!("0x{:X} is not a byte", value)))?;
    }
    Ok(Some(bytes))
}

impl ConfigFile {
    /// Load a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply the `[bootloader]` table on top of `config`
    pub fn apply(&self, mut config: BootloaderConfig) -> BootloaderConfig {
        let section = &self.bootloader;
        if let Some(strict) = section.strict_sequence {
            config.strict_sequence_check = strict;
        }
        for (flag, enabled) in [
            (Options::SPI_MULTI, section.spi_multi),
            (Options::LOCK_BITS, section.lock_bits),
            (Options::ACTIVITY_INDICATOR, section.activity_indicator),
        ] {
            if let Some(enabled) = enabled {
                config.options.set(flag, enabled);
            }
        }
        if section.busy_timeout.is_some() {
            config.busy_timeout = section.busy_timeout;
        }
        config
    }

    /// Name of the base profile requested by the `[device]` table
    pub fn device_name(&self) -> Option<&str> {
        self.device.as_ref()?.name.as_deref()
    }

    /// Apply the `[device]` table on top of `base`
    pub fn device_config(&self, base: DummyConfig) -> Result<DummyConfig> {
        let Some(section) = &self.device else {
            return Ok(base);
        };
        let mut config = base;
        if let Some(signature) = section.signature {
            config.signature = signature;
        }
        if let Some(size) = section.flash_size {
            config.layout.flash_size = size;
        }
        if let Some(size) = section.page_size {
            config.layout.page_size = size;
        }
        if let Some(start) = section.boot_start {
            config.layout.boot_start = start;
        } else if section.flash_size.is_some() {
            config.layout.boot_start = config.layout.flash_size;
        }
        if let Some(size) = section.eeprom_size {
            config.layout.eeprom_size = size;
        }
        if let Some(fuses) = section.fuses {
            config.fuses = fuses;
        }
        if let Some(lock) = section.lock {
            config.lock = u8::try_from(lock)
                .map_err(|_| AppError::InvalidDevice(format!("lock 0x{:X} is not a byte", lock)))?;
        }
        if let Some(polls) = section.busy_polls {
            config.busy_polls = polls;
        }
        if !config.layout.is_consistent() {
            return Err(AppError::InvalidDevice(format!("{:?}", config.layout)));
        }
        Ok(config)
    }
}

/// Resolve a profile name to an emulated device configuration
pub fn profile_config(name: &str) -> Result<DummyConfig> {
    find_by_name(name)
        .map(DummyConfig::from_profile)
        .ok_or_else(|| AppError::UnknownDevice(name.to_string()))
}
