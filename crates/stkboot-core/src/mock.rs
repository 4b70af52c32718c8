//! Minimal recording device for unit tests

use crate::device::{Device, FuseKind, MemoryLayout};
use crate::error::{Error, Result};
use heapless::Vec;

const FLASH_SIZE: usize = 0x8000;
const PAGE_SIZE: usize = 128;
const EEPROM_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Erase(u32),
    Fill(u32, u16),
    Commit(u32),
    EnableRww,
    Eeprom(u32, u8),
    Lock(u8),
    Toggle,
}

pub struct MockDevice {
    pub flash: [u8; FLASH_SIZE],
    pub eeprom: [u8; EEPROM_SIZE],
    page_buffer: [u8; PAGE_SIZE],
    pub lock: u8,
    pub ops: Vec<Op, 512>,
    pub busy_polls: u32,
    pub stuck_busy: bool,
    pub polls: u32,
    pub fail_commit: Option<u32>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            flash: [0xFF; FLASH_SIZE],
            eeprom: [0xFF; EEPROM_SIZE],
            page_buffer: [0xFF; PAGE_SIZE],
            lock: 0xFF,
            ops: Vec::new(),
            busy_polls: 0,
            stuck_busy: false,
            polls: 0,
            fail_commit: None,
        }
    }

    fn record(&mut self, op: Op) {
        self.ops.push(op).expect("mock op log full");
    }

    pub fn erased_pages(&self) -> Vec<u32, 512> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Erase(addr) => Some(*addr),
                _ => None,
            })
            .collect()
    }

    pub fn erase_count(&self) -> usize {
        self.erased_pages().len()
    }

    pub fn commit_count(&self) -> usize {
        self.ops.iter().filter(|op| matches!(op, Op::Commit(_))).count()
    }
}

impl Device for MockDevice {
    fn layout(&self) -> MemoryLayout {
        MemoryLayout::new(FLASH_SIZE as u32, PAGE_SIZE as u32, 0x7000, EEPROM_SIZE as u32)
    }

    fn signature(&self) -> [u8; 3] {
        [0x1E, 0x95, 0x87]
    }

    fn fuse_byte(&mut self, kind: FuseKind) -> u8 {
        match kind {
            FuseKind::Low => 0xFF,
            FuseKind::High => 0xD8,
            FuseKind::Extended => 0xCB,
        }
    }

    fn lock_byte(&mut self) -> u8 {
        self.lock
    }

    fn program_lock_bits(&mut self, bits: u8) -> Result<()> {
        self.record(Op::Lock(bits));
        self.lock &= !bits;
        Ok(())
    }

    fn erase_page(&mut self, addr: u32) -> Result<()> {
        self.record(Op::Erase(addr));
        let base = addr as usize & !(PAGE_SIZE - 1);
        self.flash[base..base + PAGE_SIZE].fill(0xFF);
        Ok(())
    }

    fn fill_page_word(&mut self, addr: u32, word: u16) -> Result<()> {
        self.record(Op::Fill(addr, word));
        let offset = addr as usize & (PAGE_SIZE - 1);
        self.page_buffer[offset..offset + 2].copy_from_slice(&word.to_le_bytes());
        Ok(())
    }

    fn commit_page(&mut self, addr: u32) -> Result<()> {
        if self.fail_commit == Some(addr) {
            return Err(Error::DeviceError);
        }
        self.record(Op::Commit(addr));
        let base = addr as usize & !(PAGE_SIZE - 1);
        for (dst, src) in self.flash[base..base + PAGE_SIZE]
            .iter_mut()
            .zip(self.page_buffer.iter())
        {
            *dst &= *src;
        }
        self.page_buffer = [0xFF; PAGE_SIZE];
        Ok(())
    }

    fn enable_rww(&mut self) -> Result<()> {
        self.record(Op::EnableRww);
        Ok(())
    }

    fn read_flash_word(&mut self, addr: u32) -> Result<u16> {
        let a = addr as usize;
        let bytes = self.flash.get(a..a + 2).ok_or(Error::AddressOutOfBounds)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn write_eeprom_byte(&mut self, addr: u32, value: u8) -> Result<()> {
        self.record(Op::Eeprom(addr, value));
        *self
            .eeprom
            .get_mut(addr as usize)
            .ok_or(Error::AddressOutOfBounds)? = value;
        Ok(())
    }

    fn read_eeprom_byte(&mut self, addr: u32) -> Result<u8> {
        self.eeprom
            .get(addr as usize)
            .copied()
            .ok_or(Error::AddressOutOfBounds)
    }

    fn is_busy(&mut self) -> bool {
        self.polls += 1;
        if self.stuck_busy {
            return true;
        }
        if self.busy_polls > 0 {
            self.busy_polls -= 1;
            return true;
        }
        false
    }

    fn toggle_activity(&mut self) {
        self.record(Op::Toggle);
    }
}
