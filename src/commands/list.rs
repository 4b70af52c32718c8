//! List command implementation

use stkboot_core::device::PROFILES;

/// List all built-in device profiles
pub fn list_devices() {
    println!("Supported devices:");
    println!();
    println!(
        "{:<14} {:>9} {:>9} {:>6} {:>10} {:>8}",
        "Name", "Signature", "Flash", "Page", "Boot start", "EEPROM"
    );
    println!("{}", "-".repeat(61));

    for profile in PROFILES {
        let layout = &profile.layout;
        println!(
            "{:<14} {:>9} {:>9} {:>6} {:>10} {:>8}",
            profile.name,
            format!("{:06X}", profile.signature_u32()),
            format_size(layout.flash_size),
            layout.page_size,
            format!("0x{:05X}", layout.boot_start),
            format_size(layout.eeprom_size)
        );
    }
}

fn format_size(bytes: u32) -> String {
    if bytes >= 1024 && bytes % 1024 == 0 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(format_size(256 * 1024), "256 KiB");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1536 B");
    }
}
