//! Built-in device profiles
//!
//! Boot start assumes the largest boot section (BOOTSZ = 00), which is how
//! STK500v2 bootloaders are normally fused.

use super::types::{DeviceProfile, MemoryLayout};

const FUSES: [u8; 3] = [0xFF, 0xD8, 0xFD];
const LOCK: u8 = 0xFF;

const fn profile(
    name: &'static str,
    signature: u32,
    flash_size: u32,
    page_size: u32,
    boot_size: u32,
    eeprom_size: u32,
) -> DeviceProfile {
    DeviceProfile {
        name,
        signature: [(signature >> 16) as u8, (signature >> 8) as u8, signature as u8],
        layout: MemoryLayout::new(flash_size, page_size, flash_size - boot_size, eeprom_size),
        fuses: FUSES,
        lock: LOCK,
    }
}

/// Parts known to the bootloader
pub static PROFILES: &[DeviceProfile] = &[
    profile("ATmega8", 0x1E9307, 8 * 1024, 64, 2 * 1024, 512),
    profile("ATmega16", 0x1E9403, 16 * 1024, 128, 2 * 1024, 512),
    profile("ATmega32", 0x1E9502, 32 * 1024, 128, 4 * 1024, 1024),
    profile("ATmega8515", 0x1E9306, 8 * 1024, 64, 2 * 1024, 512),
    profile("ATmega8535", 0x1E9308, 8 * 1024, 64, 2 * 1024, 512),
    profile("ATmega162", 0x1E9404, 16 * 1024, 128, 2 * 1024, 512),
    profile("ATmega128", 0x1E9702, 128 * 1024, 256, 8 * 1024, 4096),
    profile("ATmega1280", 0x1E9703, 128 * 1024, 256, 8 * 1024, 4096),
    profile("ATmega2560", 0x1E9801, 256 * 1024, 256, 8 * 1024, 4096),
    profile("ATmega2561", 0x1E9802, 256 * 1024, 256, 8 * 1024, 4096),
    profile("ATmega1284P", 0x1E9705, 128 * 1024, 256, 8 * 1024, 4096),
    profile("ATmega640", 0x1E9608, 64 * 1024, 256, 8 * 1024, 4096),
    profile("ATmega64", 0x1E9602, 64 * 1024, 256, 8 * 1024, 2048),
    profile("ATmega169", 0x1E9405, 16 * 1024, 128, 2 * 1024, 512),
    profile("AT90USB1287", 0x1E9782, 128 * 1024, 256, 8 * 1024, 4096),
    profile("ATmega32U4", 0x1E9587, 32 * 1024, 128, 4 * 1024, 1024),
];

/// Find a profile by name (case-insensitive)
pub fn find_by_name(name: &str) -> Option<&'static DeviceProfile> {
    PROFILES.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Find a profile by signature bytes
pub fn find_by_signature(signature: [u8; 3]) -> Option<&'static DeviceProfile> {
    PROFILES.iter().find(|p| p.signature == signature)
}
