//! Non-volatile memory programming engine
//!
//! Sequences page erase, page-buffer fill and page commit for flash, and
//! byte-wise writes for EEPROM. Every operation that starts a hardware write
//! busy-waits for completion before returning, so nothing is acknowledged to
//! the host before it is durable.

use crate::device::{Device, MemoryLayout};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::protocol::LOCK_BITS_MASK;

/// Programming position that persists across commands of one session
///
/// Both fields are byte addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgrammingCursor {
    /// Next address read or written by a memory command
    pub load_address: u32,
    /// First page not yet erased in this session
    pub erase_watermark: u32,
}

/// Programming engine bound to one device for the duration of a command
pub struct ProgrammingEngine<'a, D: Device> {
    device: &'a mut D,
    layout: MemoryLayout,
    busy_timeout: Option<u32>,
}

impl<'a, D: Device> ProgrammingEngine<'a, D> {
    /// Bind an engine to `device`; `busy_timeout` bounds each busy-wait
    pub fn new(device: &'a mut D, busy_timeout: Option<u32>) -> Self {
        let layout = device.layout();
        Self {
            device,
            layout,
            busy_timeout,
        }
    }

    /// Poll the device until it reports idle
    pub fn wait_ready(&mut self) -> Result<()> {
        let mut polls: u32 = 0;
        while self.device.is_busy() {
            polls = polls.saturating_add(1);
            if let Some(limit) = self.busy_timeout {
                if polls > limit {
                    log::error!("stk500: device still busy after {} polls", limit);
                    return Err(Error::Timeout);
                }
            }
            core::hint::spin_loop();
        }
        Ok(())
    }

    /// Erase the page containing `addr`; pages in the boot section are refused
    pub fn erase_page(&mut self, addr: u32) -> Result<()> {
        let page = self.layout.page_base(addr);
        if page >= self.layout.boot_start || page >= self.layout.flash_size {
            return Err(Error::RegionProtected);
        }
        log::trace!("stk500: erase page 0x{:05X}", page);
        self.device.erase_page(page)?;
        self.wait_ready()
    }

    /// Store one word in the page buffer
    pub fn fill_page_word(&mut self, addr: u32, word: u16) -> Result<()> {
        self.device.fill_page_word(addr, word)
    }

    /// Write the page buffer to the page containing `addr`
    pub fn commit_page(&mut self, addr: u32) -> Result<()> {
        let page = self.layout.page_base(addr);
        if page >= self.layout.boot_start || page >= self.layout.flash_size {
            return Err(Error::RegionProtected);
        }
        log::trace!("stk500: commit page 0x{:05X}", page);
        self.device.commit_page(page)?;
        self.wait_ready()?;
        self.device.enable_rww()
    }

    /// Write one EEPROM byte and wait for it
    pub fn write_eeprom_byte(&mut self, addr: u32, value: u8) -> Result<()> {
        if !self.layout.eeprom_range_valid(addr, 1) {
            return Err(Error::AddressOutOfBounds);
        }
        self.device.write_eeprom_byte(addr, value)?;
        self.wait_ready()
    }

    /// Read one flash word
    pub fn read_flash_word(&mut self, addr: u32) -> Result<u16> {
        if !self.layout.flash_range_valid(addr, 2) {
            return Err(Error::AddressOutOfBounds);
        }
        self.device.read_flash_word(addr)
    }

    /// Read one EEPROM byte
    pub fn read_eeprom_byte(&mut self, addr: u32) -> Result<u8> {
        if !self.layout.eeprom_range_valid(addr, 1) {
            return Err(Error::AddressOutOfBounds);
        }
        self.device.read_eeprom_byte(addr)
    }

    /// Erase `page` unless the watermark says it was already erased
    ///
    /// Only the targeted page is erased; pages below it keep their contents.
    fn erase_if_needed(&mut self, page: u32, watermark: &mut u32) -> Result<()> {
        if page < *watermark || page >= self.layout.boot_start {
            return Ok(());
        }
        self.erase_page(page)?;
        *watermark = page + self.layout.page_size;
        Ok(())
    }

    /// Program `data` at the cursor, page by page, and advance the cursor
    ///
    /// The whole range is validated before any memory is touched.
    pub fn program_flash(&mut self, cursor: &mut ProgrammingCursor, data: &[u8]) -> Result<()> {
        let start = cursor.load_address;
        let len = u32::try_from(data.len()).map_err(|_| Error::AddressOutOfBounds)?;
        if len == 0 {
            return Ok(());
        }
        if start % 2 != 0 || len % 2 != 0 {
            return Err(Error::InvalidAlignment);
        }
        if !self.layout.flash_range_valid(start, len) {
            return Err(Error::AddressOutOfBounds);
        }
        if !self.layout.application_range_valid(start, len) {
            log::warn!(
                "stk500: refusing flash write 0x{:05X}+{} into boot section at 0x{:05X}",
                start,
                len,
                self.layout.boot_start
            );
            return Err(Error::RegionProtected);
        }

        let mut offset = 0usize;
        while offset < data.len() {
            let addr = start + offset as u32;
            let page = self.layout.page_base(addr);
            let page_end = (page + self.layout.page_size - start) as usize;
            let chunk_end = page_end.min(data.len());

            self.erase_if_needed(page, &mut cursor.erase_watermark)?;

            for (i, word) in data[offset..chunk_end].chunks_exact(2).enumerate() {
                let word_addr = addr + (i as u32) * 2;
                self.fill_page_word(word_addr, u16::from_le_bytes([word[0], word[1]]))?;
            }
            self.commit_page(page)?;
            offset = chunk_end;
        }

        cursor.load_address = start + len;
        Ok(())
    }

    /// Write `data` byte by byte into EEPROM at the cursor and advance it
    pub fn program_eeprom(&mut self, cursor: &mut ProgrammingCursor, data: &[u8]) -> Result<()> {
        let start = cursor.load_address;
        let len = u32::try_from(data.len()).map_err(|_| Error::AddressOutOfBounds)?;
        if !self.layout.eeprom_range_valid(start, len) {
            return Err(Error::AddressOutOfBounds);
        }
        for (i, &b) in data.iter().enumerate() {
            self.write_eeprom_byte(start + i as u32, b)?;
        }
        cursor.load_address = start + len;
        Ok(())
    }

    /// Append `size` flash bytes from the cursor to `reply`, advancing the cursor
    pub fn read_flash(
        &mut self,
        cursor: &mut ProgrammingCursor,
        size: u32,
        reply: &mut Frame,
    ) -> Result<()> {
        let start = cursor.load_address;
        if start % 2 != 0 || size % 2 != 0 {
            return Err(Error::InvalidAlignment);
        }
        if !self.layout.flash_range_valid(start, size) {
            return Err(Error::AddressOutOfBounds);
        }
        for addr in (start..start + size).step_by(2) {
            let word = self.read_flash_word(addr)?;
            reply.extend(&word.to_le_bytes())?;
        }
        cursor.load_address = start + size;
        Ok(())
    }

    /// Append `size` EEPROM bytes from the cursor to `reply`, advancing the cursor
    pub fn read_eeprom(
        &mut self,
        cursor: &mut ProgrammingCursor,
        size: u32,
        reply: &mut Frame,
    ) -> Result<()> {
        let start = cursor.load_address;
        if !self.layout.eeprom_range_valid(start, size) {
            return Err(Error::AddressOutOfBounds);
        }
        for addr in start..start + size {
            let b = self.read_eeprom_byte(addr)?;
            reply.push(b)?;
        }
        cursor.load_address = start + size;
        Ok(())
    }

    /// Program the boot lock bits requested by the host
    ///
    /// Only the BLB bits can be changed from the bootloader; the requested
    /// value is inverted so each 0 bit becomes a bit to program.
    pub fn program_lock(&mut self, requested: u8) -> Result<()> {
        let bits = !requested & LOCK_BITS_MASK;
        log::debug!("stk500: program lock bits 0x{:02X}", bits);
        self.device.program_lock_bits(bits)?;
        self.wait_ready()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::mock::{MockDevice, Op};

    #[test]
    fn program_flash_erases_fills_and_commits() {
        let mut dev = MockDevice::new();
        let mut cursor = ProgrammingCursor {
            load_address: 0x2000,
            erase_watermark: 0x2000,
        };
        ProgrammingEngine::new(&mut dev, None)
            .program_flash(&mut cursor, &[0x11, 0x22, 0x33, 0x44])
            .unwrap();

        assert_eq!(
            dev.ops.as_slice(),
            &[
                Op::Erase(0x2000),
                Op::Fill(0x2000, 0x2211),
                Op::Fill(0x2002, 0x4433),
                Op::Commit(0x2000),
                Op::EnableRww,
            ]
        );
        assert_eq!(cursor.load_address, 0x2004);
        assert_eq!(cursor.erase_watermark, 0x2000 + 128);
    }

    #[test]
    fn page_is_erased_once() {
        let mut dev = MockDevice::new();
        let mut cursor = ProgrammingCursor::default();
        let mut engine = ProgrammingEngine::new(&mut dev, None);
        engine.program_flash(&mut cursor, &[0; 4]).unwrap();
        cursor.load_address = 0x40;
        engine.program_flash(&mut cursor, &[0; 4]).unwrap();

        assert_eq!(dev.erase_count(), 1);
        assert_eq!(dev.commit_count(), 2);
    }

    #[test]
    fn only_the_target_page_is_erased() {
        let mut dev = MockDevice::new();
        let mut cursor = ProgrammingCursor {
            load_address: 0x180,
            erase_watermark: 0,
        };
        ProgrammingEngine::new(&mut dev, None)
            .program_flash(&mut cursor, &[0; 2])
            .unwrap();
        assert_eq!(dev.erased_pages().as_slice(), &[0x180]);
        assert_eq!(cursor.erase_watermark, 0x200);
    }

    #[test]
    fn pages_below_the_watermark_are_not_erased_again() {
        let mut dev = MockDevice::new();
        let mut cursor = ProgrammingCursor {
            load_address: 0x100,
            erase_watermark: 0x200,
        };
        let mut engine = ProgrammingEngine::new(&mut dev, None);
        engine.program_flash(&mut cursor, &[0; 2]).unwrap();
        cursor.load_address = 0x200;
        engine.program_flash(&mut cursor, &[0; 2]).unwrap();
        assert_eq!(dev.erased_pages().as_slice(), &[0x200]);
        assert_eq!(dev.commit_count(), 2);
    }

    #[test]
    fn write_spanning_pages_commits_each() {
        let mut dev = MockDevice::new();
        let mut cursor = ProgrammingCursor {
            load_address: 0x7C,
            erase_watermark: 0,
        };
        ProgrammingEngine::new(&mut dev, None)
            .program_flash(&mut cursor, &[0xAA; 8])
            .unwrap();
        assert_eq!(dev.erased_pages().as_slice(), &[0x00, 0x80]);
        assert_eq!(dev.commit_count(), 2);
        assert_eq!(cursor.load_address, 0x84);
    }

    #[test]
    fn boot_section_is_never_erased() {
        let mut dev = MockDevice::new();
        let boot = dev.layout().boot_start;
        let mut cursor = ProgrammingCursor {
            load_address: boot,
            erase_watermark: boot,
        };
        let mut engine = ProgrammingEngine::new(&mut dev, None);
        assert_eq!(
            engine.program_flash(&mut cursor, &[0; 4]),
            Err(Error::RegionProtected)
        );
        assert_eq!(engine.erase_page(boot + 0x80), Err(Error::RegionProtected));

        cursor.load_address = boot - 2;
        assert_eq!(
            engine.program_flash(&mut cursor, &[0; 4]),
            Err(Error::RegionProtected)
        );
        assert!(dev.ops.is_empty());
        assert_eq!(cursor.load_address, boot - 2);
    }

    #[test]
    fn rejects_odd_and_out_of_range() {
        let mut dev = MockDevice::new();
        let mut cursor = ProgrammingCursor::default();
        let mut engine = ProgrammingEngine::new(&mut dev, None);
        assert_eq!(
            engine.program_flash(&mut cursor, &[0; 3]),
            Err(Error::InvalidAlignment)
        );
        cursor.load_address = 0x1_0000;
        assert_eq!(
            engine.program_flash(&mut cursor, &[0; 2]),
            Err(Error::AddressOutOfBounds)
        );
        cursor.load_address = 1020;
        assert_eq!(
            engine.program_eeprom(&mut cursor, &[0; 8]),
            Err(Error::AddressOutOfBounds)
        );
        assert!(dev.ops.is_empty());
    }

    #[test]
    fn eeprom_write_then_read_advances_cursor() {
        let mut dev = MockDevice::new();
        let mut cursor = ProgrammingCursor {
            load_address: 0x10,
            erase_watermark: 0,
        };
        let mut engine = ProgrammingEngine::new(&mut dev, None);
        engine.program_eeprom(&mut cursor, &[1, 2, 3]).unwrap();
        assert_eq!(cursor.load_address, 0x13);

        cursor.load_address = 0x10;
        let mut reply = Frame::with_payload(1, &[0x16]).unwrap();
        engine.read_eeprom(&mut cursor, 3, &mut reply).unwrap();
        assert_eq!(reply.payload(), &[0x16, 1, 2, 3]);
        assert_eq!(cursor.load_address, 0x13);
    }

    #[test]
    fn busy_wait_times_out_when_bounded() {
        let mut dev = MockDevice::new();
        dev.stuck_busy = true;
        let mut cursor = ProgrammingCursor::default();
        let mut engine = ProgrammingEngine::new(&mut dev, Some(10));
        assert_eq!(
            engine.program_flash(&mut cursor, &[0; 2]),
            Err(Error::Timeout)
        );
    }

    #[test]
    fn busy_wait_polls_until_idle() {
        let mut dev = MockDevice::new();
        dev.busy_polls = 5;
        let mut engine = ProgrammingEngine::new(&mut dev, Some(10));
        engine.erase_page(0).unwrap();
        assert_eq!(dev.polls, 6);
    }

    #[test]
    fn lock_request_is_inverted_and_masked() {
        let mut dev = MockDevice::new();
        ProgrammingEngine::new(&mut dev, None)
            .program_lock(0xEF)
            .unwrap();
        assert_eq!(dev.ops.as_slice(), &[Op::Lock(0x10)]);
    }
}
