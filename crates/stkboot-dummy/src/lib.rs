//! stkboot-dummy - Emulated AVR device
//!
//! This crate provides a device that emulates the non-volatile memories of an
//! AVR microcontroller in RAM: flash with a temporary page buffer and NOR
//! programming semantics, byte-addressable EEPROM, fuses and a lock byte.
//! Erase and write operations keep the device busy for a configurable number
//! of polls, like the SPM/EEPROM hardware does. It is used by the tests and by
//! the `stkboot serve` command.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::vec;
use alloc::vec::Vec;

use stkboot_core::device::{find_by_name, Device, DeviceProfile, FuseKind, MemoryLayout};
use stkboot_core::error::{Error, Result};

/// Configuration for the emulated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyConfig {
    /// Signature bytes
    pub signature: [u8; 3],
    /// Memory geometry
    pub layout: MemoryLayout,
    /// Low, high and extended fuse bytes
    pub fuses: [u8; 3],
    /// Initial lock byte
    pub lock: u8,
    /// Polls an erase or write stays busy
    pub busy_polls: u32,
}

impl DummyConfig {
    /// Configuration matching a built-in profile
    pub fn from_profile(profile: &DeviceProfile) -> Self {
        Self {
            signature: profile.signature,
            layout: profile.layout,
            fuses: profile.fuses,
            lock: profile.lock,
            busy_polls: 3,
        }
    }
}

impl Default for DummyConfig {
    fn default() -> Self {
        match find_by_name("ATmega2560") {
            Some(profile) => Self::from_profile(profile),
            None => Self {
                signature: [0x1E, 0x98, 0x01],
                layout: MemoryLayout::new(256 * 1024, 256, 0x3_E000, 4096),
                fuses: [0xFF, 0xD8, 0xFD],
                lock: 0xFF,
                busy_polls: 3,
            },
        }
    }
}

/// Emulated device
pub struct DummyDevice {
    config: DummyConfig,
    flash: Vec<u8>,
    eeprom: Vec<u8>,
    page_buffer: Vec<u8>,
    lock: u8,
    busy: u32,
    stuck: bool,
    rww_enabled: bool,
    erase_log: Vec<u32>,
    commits: usize,
    activity_toggles: usize,
}

impl DummyDevice {
    /// Create a blank device (all memories erased to 0xFF)
    pub fn new(config: DummyConfig) -> Self {
        let layout = config.layout;
        Self {
            flash: vec![0xFF; layout.flash_size as usize],
            eeprom: vec![0xFF; layout.eeprom_size as usize],
            page_buffer: vec![0xFF; layout.page_size as usize],
            lock: config.lock,
            busy: 0,
            stuck: false,
            rww_enabled: true,
            erase_log: Vec::new(),
            commits: 0,
            activity_toggles: 0,
            config,
        }
    }

    /// Create a blank ATmega2560
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a device with flash pre-filled from `image`
    pub fn with_flash(config: DummyConfig, image: &[u8]) -> Self {
        let mut device = Self::new(config);
        let len = core::cmp::min(image.len(), device.flash.len());
        device.flash[..len].copy_from_slice(&image[..len]);
        device
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Flash contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// EEPROM contents
    pub fn eeprom(&self) -> &[u8] {
        &self.eeprom
    }

    /// Current lock byte
    pub fn lock(&self) -> u8 {
        self.lock
    }

    /// Page addresses erased so far, in order
    pub fn erase_log(&self) -> &[u32] {
        &self.erase_log
    }

    /// Number of page commits so far
    pub fn commits(&self) -> usize {
        self.commits
    }

    /// Number of activity indicator toggles so far
    pub fn activity_toggles(&self) -> usize {
        self.activity_toggles
    }

    /// Make every operation hang (busy forever) to exercise timeouts
    pub fn set_stuck(&mut self, stuck: bool) {
        self.stuck = stuck;
    }

    fn start_operation(&mut self) -> Result<()> {
        if self.busy > 0 {
            log::error!("dummy: operation started while busy");
            return Err(Error::DeviceError);
        }
        self.busy = self.config.busy_polls;
        Ok(())
    }

    fn page_range(&self, addr: u32) -> Result<core::ops::Range<usize>> {
        let layout = &self.config.layout;
        let base = layout.page_base(addr);
        if base >= layout.flash_size {
            return Err(Error::AddressOutOfBounds);
        }
        let base = base as usize;
        Ok(base..base + layout.page_size as usize)
    }
}

impl Device for DummyDevice {
    fn layout(&self) -> MemoryLayout {
        self.config.layout
    }

    fn signature(&self) -> [u8; 3] {
        self.config.signature
    }

    fn fuse_byte(&mut self, kind: FuseKind) -> u8 {
        match kind {
            FuseKind::Low => self.config.fuses[0],
            FuseKind::High => self.config.fuses[1],
            FuseKind::Extended => self.config.fuses[2],
        }
    }

    fn lock_byte(&mut self) -> u8 {
        self.lock
    }

    fn program_lock_bits(&mut self, bits: u8) -> Result<()> {
        self.start_operation()?;
        // Programming can only clear bits
        self.lock &= !bits;
        log::debug!("dummy: lock byte now 0x{:02X}", self.lock);
        Ok(())
    }

    fn erase_page(&mut self, addr: u32) -> Result<()> {
        let range = self.page_range(addr)?;
        self.start_operation()?;
        self.rww_enabled = false;
        self.erase_log.push(range.start as u32);
        self.flash[range].fill(0xFF);
        Ok(())
    }

    fn fill_page_word(&mut self, addr: u32, word: u16) -> Result<()> {
        if self.busy > 0 {
            return Err(Error::DeviceError);
        }
        let offset = (addr & (self.config.layout.page_size - 1)) as usize;
        self.page_buffer[offset..offset + 2].copy_from_slice(&word.to_le_bytes());
        Ok(())
    }

    fn commit_page(&mut self, addr: u32) -> Result<()> {
        let range = self.page_range(addr)?;
        self.start_operation()?;
        self.rww_enabled = false;
        // Flash programming: can only change 1 -> 0
        for (dst, src) in self.flash[range].iter_mut().zip(self.page_buffer.iter()) {
            *dst &= *src;
        }
        self.page_buffer.fill(0xFF);
        self.commits += 1;
        Ok(())
    }

    fn enable_rww(&mut self) -> Result<()> {
        if self.busy > 0 {
            return Err(Error::DeviceError);
        }
        self.rww_enabled = true;
        Ok(())
    }

    fn read_flash_word(&mut self, addr: u32) -> Result<u16> {
        if !self.rww_enabled && addr < self.config.layout.boot_start {
            log::error!("dummy: RWW section read while disabled");
            return Err(Error::DeviceError);
        }
        let a = addr as usize;
        let bytes = self.flash.get(a..a + 2).ok_or(Error::AddressOutOfBounds)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn write_eeprom_byte(&mut self, addr: u32, value: u8) -> Result<()> {
        if addr as usize >= self.eeprom.len() {
            return Err(Error::AddressOutOfBounds);
        }
        self.start_operation()?;
        self.eeprom[addr as usize] = value;
        Ok(())
    }

    fn read_eeprom_byte(&mut self, addr: u32) -> Result<u8> {
        if self.busy > 0 {
            return Err(Error::DeviceError);
        }
        self.eeprom
            .get(addr as usize)
            .copied()
            .ok_or(Error::AddressOutOfBounds)
    }

    fn is_busy(&mut self) -> bool {
        if self.stuck {
            return true;
        }
        if self.busy > 0 {
            self.busy -= 1;
            return true;
        }
        false
    }

    fn toggle_activity(&mut self) {
        self.activity_toggles += 1;
    }
}
