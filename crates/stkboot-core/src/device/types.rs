//! Device description types

/// Fuse byte selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuseKind {
    /// Low fuse byte
    Low,
    /// High fuse byte
    High,
    /// Extended fuse byte
    Extended,
}

/// How `CMD_LOAD_ADDRESS` is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    /// Flash fits in 64 KiB: only the low two address bytes are used
    Near16,
    /// Larger flash: all four address bytes are used
    Far32,
}

/// Memory geometry of a device
///
/// `boot_start` is the first byte of the boot-protected region; everything
/// from there to the end of flash belongs to the bootloader itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryLayout {
    /// Flash size in bytes
    pub flash_size: u32,
    /// Flash page size in bytes (power of two)
    pub page_size: u32,
    /// Start of the boot-protected region in bytes
    pub boot_start: u32,
    /// EEPROM size in bytes
    pub eeprom_size: u32,
}

impl MemoryLayout {
    /// Create a new memory layout
    pub const fn new(flash_size: u32, page_size: u32, boot_start: u32, eeprom_size: u32) -> Self {
        Self {
            flash_size,
            page_size,
            boot_start,
            eeprom_size,
        }
    }

    /// Address decoding implied by the flash size
    pub const fn address_mode(&self) -> AddressMode {
        if self.flash_size > 0x1_0000 {
            AddressMode::Far32
        } else {
            AddressMode::Near16
        }
    }

    /// Start of the page containing `addr`
    pub const fn page_base(&self, addr: u32) -> u32 {
        addr & !(self.page_size - 1)
    }

    /// Check that `[addr, addr + len)` lies inside flash
    pub fn flash_range_valid(&self, addr: u32, len: u32) -> bool {
        addr.checked_add(len)
            .is_some_and(|end| end <= self.flash_size)
    }

    /// Check that `[addr, addr + len)` lies below the boot-protected region
    pub fn application_range_valid(&self, addr: u32, len: u32) -> bool {
        addr.checked_add(len)
            .is_some_and(|end| end <= self.boot_start.min(self.flash_size))
    }

    /// Check that `[addr, addr + len)` lies inside EEPROM
    pub fn eeprom_range_valid(&self, addr: u32, len: u32) -> bool {
        addr.checked_add(len)
            .is_some_and(|end| end <= self.eeprom_size)
    }

    /// Sanity check: power-of-two page, boot start page aligned and inside flash
    pub fn is_consistent(&self) -> bool {
        self.page_size.is_power_of_two()
            && self.flash_size % self.page_size == 0
            && self.boot_start <= self.flash_size
            && self.boot_start % self.page_size == 0
    }
}

/// Static description of a supported part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Part name
    pub name: &'static str,
    /// Signature bytes, most significant first
    pub signature: [u8; 3],
    /// Memory geometry
    pub layout: MemoryLayout,
    /// Factory low, high and extended fuse values
    pub fuses: [u8; 3],
    /// Factory lock byte
    pub lock: u8,
}

impl DeviceProfile {
    /// Signature packed as `0x1E9801`-style integer
    pub fn signature_u32(&self) -> u32 {
        u32::from_be_bytes([0, self.signature[0], self.signature[1], self.signature[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_mode_follows_flash_size() {
        assert_eq!(
            MemoryLayout::new(0x8000, 128, 0x7000, 1024).address_mode(),
            AddressMode::Near16
        );
        assert_eq!(
            MemoryLayout::new(0x1_0000, 256, 0xE000, 2048).address_mode(),
            AddressMode::Near16
        );
        assert_eq!(
            MemoryLayout::new(0x4_0000, 256, 0x3_E000, 4096).address_mode(),
            AddressMode::Far32
        );
    }

    #[test]
    fn range_checks() {
        let layout = MemoryLayout::new(0x8000, 128, 0x7000, 1024);
        assert_eq!(layout.page_base(0x2083), 0x2080);
        assert!(layout.flash_range_valid(0x7F00, 0x100));
        assert!(!layout.flash_range_valid(0x7F00, 0x101));
        assert!(!layout.flash_range_valid(u32::MAX, 2));
        assert!(layout.application_range_valid(0x6F80, 0x80));
        assert!(!layout.application_range_valid(0x6F80, 0x82));
        assert!(layout.eeprom_range_valid(1023, 1));
        assert!(!layout.eeprom_range_valid(1023, 2));
    }
}
