//! STK500v2 protocol constants
//!
//! Based on Atmel application note AVR068 (STK500 communication protocol).

/// First byte of every frame
pub const MESSAGE_START: u8 = 0x1B;
/// Separator between the length field and the payload
pub const TOKEN: u8 = 0x0E;

/// Bytes of framing around the payload: start, sequence, length (2), token, checksum
pub const FRAME_OVERHEAD: usize = 6;

/// Largest payload accepted or emitted in one frame
pub const MAX_PAYLOAD: usize = 285;

/// Offset of the data block in program flash/EEPROM requests
pub const PROGRAM_DATA_OFFSET: usize = 10;

// Command opcodes
/// Identify the programmer
pub const CMD_SIGN_ON: u8 = 0x01;
/// Set a programmer parameter
pub const CMD_SET_PARAMETER: u8 = 0x02;
/// Read a programmer parameter
pub const CMD_GET_PARAMETER: u8 = 0x03;
/// Set the word address for subsequent memory commands
pub const CMD_LOAD_ADDRESS: u8 = 0x06;
/// Enter programming mode
pub const CMD_ENTER_PROGMODE_ISP: u8 = 0x10;
/// Leave programming mode
pub const CMD_LEAVE_PROGMODE_ISP: u8 = 0x11;
/// Erase the whole chip
pub const CMD_CHIP_ERASE_ISP: u8 = 0x12;
/// Program a block of flash
pub const CMD_PROGRAM_FLASH_ISP: u8 = 0x13;
/// Read a block of flash
pub const CMD_READ_FLASH_ISP: u8 = 0x14;
/// Program a block of EEPROM
pub const CMD_PROGRAM_EEPROM_ISP: u8 = 0x15;
/// Read a block of EEPROM
pub const CMD_READ_EEPROM_ISP: u8 = 0x16;
/// Read one fuse byte
pub const CMD_READ_FUSE_ISP: u8 = 0x18;
/// Program the lock bits
pub const CMD_PROGRAM_LOCK_ISP: u8 = 0x19;
/// Read the lock byte
pub const CMD_READ_LOCK_ISP: u8 = 0x1A;
/// Read one signature byte
pub const CMD_READ_SIGNATURE_ISP: u8 = 0x1B;
/// Raw SPI instruction passthrough
pub const CMD_SPI_MULTI: u8 = 0x1D;
/// STK500v1 get-parameter opcode, served by the same handler
pub const CMD_GET_PARAMETER_V1: u8 = 0x41;

// Status codes
/// Command succeeded
pub const STATUS_CMD_OK: u8 = 0x00;
/// Command failed
pub const STATUS_CMD_FAILED: u8 = 0xC0;

// Parameter ids
/// Firmware build number, low byte
pub const PARAM_BUILD_NUMBER_LOW: u8 = 0x80;
/// Firmware build number, high byte
pub const PARAM_BUILD_NUMBER_HIGH: u8 = 0x81;
/// Hardware version
pub const PARAM_HW_VER: u8 = 0x90;
/// Software major version
pub const PARAM_SW_MAJOR: u8 = 0x91;
/// Software minor version
pub const PARAM_SW_MINOR: u8 = 0x92;

/// Programmer identifier returned by sign-on
pub const SIGN_ON_ID: &[u8; 8] = b"AVRISP_2";

/// ISP instruction bytes decoded by the SPI multi and read fuse commands
pub mod isp {
    /// Read signature byte
    pub const READ_SIGNATURE: u8 = 0x30;
    /// Read low or extended fuse (second byte selects)
    pub const READ_FUSE_LOW: u8 = 0x50;
    /// Read high fuse or lock byte (second byte selects)
    pub const READ_FUSE_HIGH: u8 = 0x58;
    /// Second instruction byte selecting the extended/high fuse
    pub const SELECT_HIGH: u8 = 0x08;
}

/// Lock byte bits a bootloader may program (BLB0x/BLB1x)
pub const LOCK_BITS_MASK: u8 = 0x3C;

/// Byte-wise XOR checksum used by both directions of the protocol
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, &b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_xor_of_all_bytes() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[MESSAGE_START]), MESSAGE_START);
        assert_eq!(checksum(&[0x1B, 0x01, 0x00, 0x01, 0x0E, 0x01]), 0x14);
    }
}
