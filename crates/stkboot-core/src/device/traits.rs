//! Device trait definition

use super::types::{FuseKind, MemoryLayout};
use crate::error::Result;

/// Non-volatile memory and identity capability of the target device
///
/// All flash addresses are byte addresses. Erase, commit, lock and EEPROM
/// writes only *start* the hardware operation; completion is observed by
/// polling [`Device::is_busy`], which the programming engine does before it
/// acknowledges anything to the host.
///
/// ## Example: in-memory implementation
///
/// ```ignore
/// impl Device for Emulated {
///     fn layout(&self) -> MemoryLayout { self.layout }
///
///     fn erase_page(&mut self, addr: u32) -> Result<()> {
///         let page = self.page_range(addr)?;
///         self.flash[page].fill(0xFF);
///         Ok(())
///     }
///     // ...
/// }
/// ```
pub trait Device {
    /// Memory geometry of this device
    fn layout(&self) -> MemoryLayout;

    /// Three signature bytes, most significant first
    fn signature(&self) -> [u8; 3];

    /// Read one fuse byte
    fn fuse_byte(&mut self, kind: FuseKind) -> u8;

    /// Read the lock byte
    fn lock_byte(&mut self) -> u8;

    /// Program lock bits
    ///
    /// Every bit set in `bits` is programmed (cleared to 0) in the lock byte.
    fn program_lock_bits(&mut self, bits: u8) -> Result<()>;

    /// Start erasing the page containing `addr`
    fn erase_page(&mut self, addr: u32) -> Result<()>;

    /// Store one word in the temporary page buffer at `addr`
    fn fill_page_word(&mut self, addr: u32, word: u16) -> Result<()>;

    /// Start writing the temporary page buffer to the page containing `addr`
    fn commit_page(&mut self, addr: u32) -> Result<()>;

    /// Re-enable the read-while-write section after a page write
    fn enable_rww(&mut self) -> Result<()> {
        Ok(())
    }

    /// Read one little-endian word of flash
    fn read_flash_word(&mut self, addr: u32) -> Result<u16>;

    /// Start writing one EEPROM byte
    fn write_eeprom_byte(&mut self, addr: u32, value: u8) -> Result<()>;

    /// Read one EEPROM byte
    fn read_eeprom_byte(&mut self, addr: u32) -> Result<u8>;

    /// Whether an erase or write is still in progress
    fn is_busy(&mut self) -> bool;

    /// Flip the activity indicator (typically an LED)
    fn toggle_activity(&mut self) {}
}
