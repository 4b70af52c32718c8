//! STK500v2 command processor
//!
//! Interprets the opcode and fields of a validated request frame, drives the
//! programming engine and rewrites the same frame into the reply. Every reply
//! starts with the echoed opcode followed by a status byte.

use crate::config::{BootloaderConfig, Options, VersionInfo};
use crate::device::{AddressMode, Device, FuseKind};
use crate::engine::{ProgrammingCursor, ProgrammingEngine};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::protocol::*;

/// Flags raised by the host for the bootloader's outer loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionFlags {
    /// Host sent `CMD_LEAVE_PROGMODE_ISP`
    pub leave_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Memory {
    Flash,
    Eeprom,
}

/// Stateful command dispatcher
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    options: Options,
    version: VersionInfo,
    busy_timeout: Option<u32>,
    cursor: ProgrammingCursor,
    flags: SessionFlags,
}

impl CommandProcessor {
    /// Create a processor with a fresh cursor
    pub fn new(config: &BootloaderConfig) -> Self {
        Self {
            options: config.options,
            version: config.version,
            busy_timeout: config.busy_timeout,
            cursor: ProgrammingCursor::default(),
            flags: SessionFlags::default(),
        }
    }

    /// Current programming cursor
    pub fn cursor(&self) -> &ProgrammingCursor {
        &self.cursor
    }

    /// Session flags raised so far
    pub fn flags(&self) -> &SessionFlags {
        &self.flags
    }

    /// Process the request in `frame` and leave the reply in its place
    ///
    /// Only fatal errors (busy-wait timeout) are returned; every other
    /// failure is reported to the host as `STATUS_CMD_FAILED`.
    pub fn process<D: Device>(&mut self, device: &mut D, frame: &mut Frame) -> Result<()> {
        let Some(opcode) = frame.opcode() else {
            frame.begin_reply(STATUS_CMD_FAILED);
            return Ok(());
        };
        log::debug!("stk500: cmd 0x{:02X} len={}", opcode, frame.len());

        let result = match opcode {
            CMD_SIGN_ON => self.sign_on(frame),
            CMD_GET_PARAMETER | CMD_GET_PARAMETER_V1 => self.get_parameter(frame),
            CMD_LEAVE_PROGMODE_ISP => {
                self.flags.leave_requested = true;
                self.acknowledge(frame)
            }
            CMD_SET_PARAMETER | CMD_ENTER_PROGMODE_ISP => self.acknowledge(frame),
            CMD_CHIP_ERASE_ISP => self.chip_erase(frame),
            CMD_LOAD_ADDRESS => self.load_address(frame, device.layout().address_mode()),
            CMD_PROGRAM_FLASH_ISP => self.program(device, frame, Memory::Flash),
            CMD_PROGRAM_EEPROM_ISP => self.program(device, frame, Memory::Eeprom),
            CMD_READ_FLASH_ISP => self.read(device, frame, Memory::Flash),
            CMD_READ_EEPROM_ISP => self.read(device, frame, Memory::Eeprom),
            CMD_READ_SIGNATURE_ISP => self.read_signature(device, frame),
            CMD_READ_FUSE_ISP => self.read_fuse(device, frame),
            CMD_READ_LOCK_ISP => {
                let lock = device.lock_byte();
                reply_value(frame, lock)
            }
            CMD_PROGRAM_LOCK_ISP if self.options.contains(Options::LOCK_BITS) => {
                self.program_lock(device, frame)
            }
            CMD_SPI_MULTI if self.options.contains(Options::SPI_MULTI) => {
                self.spi_multi(device, frame)
            }
            _ => {
                log::debug!("stk500: unsupported command 0x{:02X}", opcode);
                Err(Error::Unsupported)
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                if e != Error::Unsupported {
                    log::warn!("stk500: command 0x{:02X} failed: {}", opcode, e);
                }
                frame.begin_reply(STATUS_CMD_FAILED);
                Ok(())
            }
        }
    }

    fn engine<'a, D: Device>(&self, device: &'a mut D) -> ProgrammingEngine<'a, D> {
        ProgrammingEngine::new(device, self.busy_timeout)
    }

    fn sign_on(&mut self, frame: &mut Frame) -> Result<()> {
        frame.begin_reply(STATUS_CMD_OK);
        frame.push(SIGN_ON_ID.len() as u8)?;
        frame.extend(SIGN_ON_ID)
    }

    fn get_parameter(&mut self, frame: &mut Frame) -> Result<()> {
        let id = frame.byte(1).ok_or(Error::InvalidLength)?;
        let value = match id {
            PARAM_BUILD_NUMBER_LOW => self.version.build_number_low,
            PARAM_BUILD_NUMBER_HIGH => self.version.build_number_high,
            PARAM_HW_VER => self.version.hw_version,
            PARAM_SW_MAJOR => self.version.sw_major,
            PARAM_SW_MINOR => self.version.sw_minor,
            _ => 0,
        };
        frame.begin_reply(STATUS_CMD_OK);
        frame.push(value)
    }

    fn acknowledge(&mut self, frame: &mut Frame) -> Result<()> {
        frame.begin_reply(STATUS_CMD_OK);
        Ok(())
    }

    fn chip_erase(&mut self, frame: &mut Frame) -> Result<()> {
        // Erase is deferred to the next flash write. Hosts expect FAILED here.
        self.cursor.erase_watermark = 0;
        frame.begin_reply(STATUS_CMD_FAILED);
        Ok(())
    }

    fn load_address(&mut self, frame: &mut Frame, mode: AddressMode) -> Result<()> {
        let bytes = frame.payload().get(1..5).ok_or(Error::InvalidLength)?;
        let word = match mode {
            // Bit 31 flags an extended address to the programmer, not part of the address
            AddressMode::Far32 => {
                u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) & 0x7FFF_FFFF
            }
            AddressMode::Near16 => u32::from(u16::from_be_bytes([bytes[2], bytes[3]])),
        };
        self.cursor.load_address = word << 1;
        log::trace!("stk500: load address 0x{:05X}", self.cursor.load_address);
        frame.begin_reply(STATUS_CMD_OK);
        Ok(())
    }

    fn program<D: Device>(
        &mut self,
        device: &mut D,
        frame: &mut Frame,
        memory: Memory,
    ) -> Result<()> {
        let size = request_size(frame)?;
        let data = frame
            .payload()
            .get(PROGRAM_DATA_OFFSET..PROGRAM_DATA_OFFSET + size)
            .ok_or(Error::InvalidLength)?;

        let mut cursor = self.cursor;
        let mut engine = self.engine(device);
        let result = match memory {
            Memory::Flash => engine.program_flash(&mut cursor, data),
            Memory::Eeprom => engine.program_eeprom(&mut cursor, data),
        };
        // Pages erased before a failure stay erased
        self.cursor.erase_watermark = cursor.erase_watermark;
        result?;
        self.cursor = cursor;

        frame.begin_reply(STATUS_CMD_OK);
        Ok(())
    }

    fn read<D: Device>(
        &mut self,
        device: &mut D,
        frame: &mut Frame,
        memory: Memory,
    ) -> Result<()> {
        let size = request_size(frame)?;
        if size + 3 > MAX_PAYLOAD {
            return Err(Error::BufferTooSmall);
        }

        let mut cursor = self.cursor;
        frame.begin_reply(STATUS_CMD_OK);
        let mut engine = self.engine(device);
        match memory {
            Memory::Flash => engine.read_flash(&mut cursor, size as u32, frame)?,
            Memory::Eeprom => engine.read_eeprom(&mut cursor, size as u32, frame)?,
        }
        frame.push(STATUS_CMD_OK)?;
        self.cursor = cursor;
        Ok(())
    }

    fn read_signature<D: Device>(&mut self, device: &mut D, frame: &mut Frame) -> Result<()> {
        let index = frame.byte(4).ok_or(Error::InvalidLength)?;
        let value = signature_byte(device.signature(), index);
        reply_value(frame, value)
    }

    fn read_fuse<D: Device>(&mut self, device: &mut D, frame: &mut Frame) -> Result<()> {
        let cmd1 = frame.byte(2).ok_or(Error::InvalidLength)?;
        let cmd2 = frame.byte(3).ok_or(Error::InvalidLength)?;
        let kind = match (cmd1, cmd2) {
            (isp::READ_FUSE_LOW, isp::SELECT_HIGH) => FuseKind::Extended,
            (isp::READ_FUSE_LOW, _) => FuseKind::Low,
            _ => FuseKind::High,
        };
        let value = device.fuse_byte(kind);
        reply_value(frame, value)
    }

    fn program_lock<D: Device>(&mut self, device: &mut D, frame: &mut Frame) -> Result<()> {
        let requested = frame.byte(4).ok_or(Error::InvalidLength)?;
        self.engine(device).program_lock(requested)?;
        frame.begin_reply(STATUS_CMD_OK);
        frame.push(STATUS_CMD_OK)
    }

    /// Compatibility stub: only signature, fuse and lock reads are decoded
    fn spi_multi<D: Device>(&mut self, device: &mut D, frame: &mut Frame) -> Result<()> {
        let tx0 = frame.byte(4).ok_or(Error::InvalidLength)?;
        let tx1 = frame.byte(5).unwrap_or(0);
        let tx2 = frame.byte(6).unwrap_or(0);

        let answer = match (tx0, tx1) {
            (isp::READ_SIGNATURE, _) => signature_byte(device.signature(), tx2),
            (isp::READ_FUSE_LOW, isp::SELECT_HIGH) => device.fuse_byte(FuseKind::Extended),
            (isp::READ_FUSE_LOW, _) => device.fuse_byte(FuseKind::Low),
            (isp::READ_FUSE_HIGH, isp::SELECT_HIGH) => device.fuse_byte(FuseKind::High),
            (isp::READ_FUSE_HIGH, _) => device.lock_byte(),
            _ => 0,
        };

        frame.begin_reply(STATUS_CMD_OK);
        frame.extend(&[0, tx0, 0, answer, STATUS_CMD_OK])
    }
}

/// Big-endian size field at payload bytes 1..=2
fn request_size(frame: &Frame) -> Result<usize> {
    let bytes = frame.payload().get(1..3).ok_or(Error::InvalidLength)?;
    Ok(usize::from(u16::from_be_bytes([bytes[0], bytes[1]])))
}

fn signature_byte(signature: [u8; 3], index: u8) -> u8 {
    match index {
        0 => signature[0],
        1 => signature[1],
        _ => signature[2],
    }
}

/// `[op, OK, value, OK]`
fn reply_value(frame: &mut Frame, value: u8) -> Result<()> {
    frame.begin_reply(STATUS_CMD_OK);
    frame.extend(&[value, STATUS_CMD_OK])
}
