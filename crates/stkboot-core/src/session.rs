//! Bootloader session
//!
//! A [`Bootloader`] is created once when the device enters the bootloader and
//! dropped (or turned back into its device) when the host leaves programming
//! mode. It owns all protocol state, so independent sessions never share
//! anything.

use crate::command::{CommandProcessor, SessionFlags};
use crate::config::{BootloaderConfig, Options};
use crate::device::Device;
use crate::engine::ProgrammingCursor;
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameParser, ParseEvent, ReplyEncoder};
use embedded_io::{Read, Write};

/// One bootloader session: parser, processor and encoder around a device
pub struct Bootloader<D: Device> {
    device: D,
    config: BootloaderConfig,
    parser: FrameParser,
    processor: CommandProcessor,
    encoder: ReplyEncoder,
    frame: Frame,
}

impl<D: Device> Bootloader<D> {
    /// Start a session on `device`
    pub fn new(device: D, config: BootloaderConfig) -> Self {
        let layout = device.layout();
        log::debug!(
            "stk500: session start, flash {} bytes, page {}, boot section at 0x{:05X}",
            layout.flash_size,
            layout.page_size,
            layout.boot_start
        );
        Self {
            device,
            parser: FrameParser::new(config.strict_sequence_check),
            processor: CommandProcessor::new(&config),
            encoder: ReplyEncoder::new(),
            frame: Frame::new(),
            config,
        }
    }

    /// The device being programmed
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutable access to the device
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// End the session and hand the device back
    pub fn into_device(self) -> D {
        self.device
    }

    /// Programming cursor
    pub fn cursor(&self) -> &ProgrammingCursor {
        self.processor.cursor()
    }

    /// Session flags
    pub fn flags(&self) -> &SessionFlags {
        self.processor.flags()
    }

    /// Whether the host asked to leave programming mode
    pub fn leave_requested(&self) -> bool {
        self.flags().leave_requested
    }

    /// Feed one received byte to the frame parser
    pub fn feed(&mut self, byte: u8) -> ParseEvent {
        let event = self.parser.feed(byte, &mut self.frame);
        if let ParseEvent::Rejected(reason) = event {
            log::warn!("stk500: frame rejected: {}", reason);
        }
        event
    }

    /// Process the frame the parser just completed, turning it into the reply
    pub fn process(&mut self) -> Result<()> {
        self.processor.process(&mut self.device, &mut self.frame)
    }

    /// Emit the reply currently in the frame buffer
    pub fn encode<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        self.encoder.encode(&self.frame, sink)?;
        self.parser.set_expected_sequence(self.encoder.next_sequence());
        if self.config.options.contains(Options::ACTIVITY_INDICATOR) {
            self.device.toggle_activity();
        }
        Ok(())
    }

    /// Feed one byte; on a complete frame process it and send the reply
    ///
    /// Returns `true` once the reply to a leave-programming-mode request has
    /// been sent.
    pub fn handle_byte<W: Write>(&mut self, byte: u8, sink: &mut W) -> Result<bool> {
        match self.feed(byte) {
            ParseEvent::FrameReady => {
                self.process()?;
                self.encode(sink)?;
                Ok(self.leave_requested())
            }
            ParseEvent::Continue | ParseEvent::Rejected(_) => Ok(false),
        }
    }

    /// Serve requests from `transport` until the host leaves programming mode
    pub fn run<T: Read + Write>(&mut self, transport: &mut T) -> Result<()> {
        loop {
            let mut byte = [0u8; 1];
            transport
                .read_exact(&mut byte)
                .map_err(|_| Error::IoError)?;
            if self.handle_byte(byte[0], transport)? {
                log::info!("stk500: host left programming mode");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, Op};
    use crate::protocol::*;
    use core::convert::Infallible;

    /// Scripted host link: replays request bytes, records reply bytes
    struct Link<'a> {
        input: &'a [u8],
        output: heapless::Vec<u8, 4096>,
    }

    impl embedded_io::ErrorType for Link<'_> {
        type Error = Infallible;
    }

    impl Read for Link<'_> {
        fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Infallible> {
            let n = buf.len().min(self.input.len());
            buf[..n].copy_from_slice(&self.input[..n]);
            self.input = &self.input[n..];
            Ok(n)
        }
    }

    impl Write for Link<'_> {
        fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Infallible> {
            self.output.extend_from_slice(buf).expect("link output full");
            Ok(buf.len())
        }

        fn flush(&mut self) -> core::result::Result<(), Infallible> {
            Ok(())
        }
    }

    /// Send one request and decode the reply
    fn transact(bl: &mut Bootloader<MockDevice>, seq: u8, payload: &[u8]) -> Option<Frame> {
        let request = Frame::with_payload(seq, payload).unwrap().to_bytes();
        let mut out = [0u8; crate::frame::MAX_FRAME];
        let mut sink = &mut out[..];
        for &b in request.iter() {
            bl.handle_byte(b, &mut sink).unwrap();
        }
        let remaining = sink.len();
        let written = out.len() - remaining;
        if written == 0 {
            return None;
        }

        let mut parser = FrameParser::default();
        let mut reply = Frame::new();
        for &b in &out[..written] {
            if parser.feed(b, &mut reply) == ParseEvent::FrameReady {
                return Some(reply);
            }
        }
        panic!("reply did not parse");
    }

    fn session() -> Bootloader<MockDevice> {
        Bootloader::new(MockDevice::new(), BootloaderConfig::default())
    }

    #[test]
    fn scenario_sign_on() {
        let mut bl = session();
        let reply = transact(&mut bl, 1, &[CMD_SIGN_ON]).unwrap();
        assert_eq!(reply.sequence(), 1);
        assert_eq!(reply.len(), 11);
        assert_eq!(&reply.payload()[1..], b"\x00\x08AVRISP_2");
    }

    #[test]
    fn scenario_get_hw_version() {
        let mut bl = session();
        let reply = transact(&mut bl, 2, &[CMD_GET_PARAMETER_V1, PARAM_HW_VER]).unwrap();
        assert_eq!(reply.len(), 3);
        assert_eq!(&reply.payload()[1..], &[STATUS_CMD_OK, 0x0F]);
    }

    #[test]
    fn scenario_chip_erase() {
        let mut bl = session();
        let reply =
            transact(&mut bl, 3, &[CMD_CHIP_ERASE_ISP, 0x0A, 0x01, 0xAC, 0x80, 0, 0]).unwrap();
        assert_eq!(reply.len(), 2);
        assert_eq!(reply.payload()[1], STATUS_CMD_FAILED);
        assert_eq!(bl.cursor().erase_watermark, 0);
    }

    #[test]
    fn scenario_load_address_and_program_flash() {
        let mut bl = session();
        let reply = transact(&mut bl, 4, &[CMD_LOAD_ADDRESS, 0, 0, 0x10, 0x00]).unwrap();
        assert_eq!(reply.payload(), &[CMD_LOAD_ADDRESS, STATUS_CMD_OK]);
        assert_eq!(bl.cursor().load_address, 0x2000);

        let request = [CMD_PROGRAM_FLASH_ISP, 0, 4, 0xC1, 0x0A, 0x40, 0x4C, 0x20, 0, 0, 1, 2, 3, 4];
        let reply = transact(&mut bl, 5, &request).unwrap();
        assert_eq!(reply.len(), 2);
        assert_eq!(reply.payload(), &[CMD_PROGRAM_FLASH_ISP, STATUS_CMD_OK]);
        assert_eq!(&bl.device().flash[0x2000..0x2004], &[1, 2, 3, 4]);
        assert_eq!(bl.cursor().load_address, 0x2004);
        assert_eq!(bl.device().erased_pages().as_slice(), &[0x2000]);
    }

    #[test]
    fn partial_write_keeps_lower_pages() {
        let mut bl = session();
        bl.device_mut().flash[..0x4000].fill(0xA5);

        transact(&mut bl, 1, &[CMD_LOAD_ADDRESS, 0, 0, 0x10, 0x00]).unwrap();
        let request = [CMD_PROGRAM_FLASH_ISP, 0, 4, 0xC1, 0x0A, 0x40, 0x4C, 0x20, 0, 0, 1, 2, 3, 4];
        let reply = transact(&mut bl, 2, &request).unwrap();
        assert_eq!(reply.payload(), &[CMD_PROGRAM_FLASH_ISP, STATUS_CMD_OK]);

        let flash = &bl.device().flash;
        assert!(flash[..0x2000].iter().all(|&b| b == 0xA5));
        assert_eq!(&flash[0x2000..0x2004], &[1, 2, 3, 4]);
        assert!(flash[0x2004..0x2080].iter().all(|&b| b == 0xFF));
        assert!(flash[0x2080..0x4000].iter().all(|&b| b == 0xA5));
        assert_eq!(bl.device().erased_pages().as_slice(), &[0x2000]);
    }

    #[test]
    fn scenario_unknown_opcode() {
        let mut bl = session();
        let reply = transact(&mut bl, 6, &[0xFF]).unwrap();
        assert_eq!(reply.len(), 2);
        assert_eq!(reply.payload(), &[0xFF, STATUS_CMD_FAILED]);
    }

    #[test]
    fn corrupted_frame_gets_no_reply() {
        let mut bl = session();
        let mut request = Frame::with_payload(1, &[CMD_SIGN_ON]).unwrap().to_bytes();
        let last = request.len() - 1;
        request[last] ^= 0x40;
        let mut out = [0u8; 32];
        let mut sink = &mut out[..];
        for &b in request.iter() {
            assert!(!bl.handle_byte(b, &mut sink).unwrap());
        }
        assert_eq!(sink.len(), 32);
    }

    #[test]
    fn strict_sequence_follows_replies() {
        let config = BootloaderConfig::default().with_strict_sequence(true);
        let mut bl = Bootloader::new(MockDevice::new(), config);

        assert!(transact(&mut bl, 7, &[CMD_SIGN_ON]).is_none());
        assert!(transact(&mut bl, 1, &[CMD_SIGN_ON]).is_some());
        assert!(transact(&mut bl, 2, &[CMD_SIGN_ON]).is_some());
        assert!(transact(&mut bl, 2, &[CMD_SIGN_ON]).is_none());
        assert!(transact(&mut bl, 3, &[CMD_SIGN_ON]).is_some());
        assert!(transact(&mut bl, 1, &[CMD_SIGN_ON]).is_some());
    }

    #[test]
    fn activity_indicator_toggles_per_reply() {
        let mut bl = session();
        transact(&mut bl, 1, &[CMD_SIGN_ON]);
        transact(&mut bl, 2, &[CMD_ENTER_PROGMODE_ISP]);
        let toggles = bl.device().ops.iter().filter(|op| **op == Op::Toggle).count();
        assert_eq!(toggles, 2);

        let config = BootloaderConfig::default().with_options(Options::SPI_MULTI);
        let mut bl = Bootloader::new(MockDevice::new(), config);
        transact(&mut bl, 1, &[CMD_SIGN_ON]);
        assert!(bl.device().ops.is_empty());
    }

    #[test]
    fn run_serves_until_leave() {
        let mut input = heapless::Vec::<u8, 256>::new();
        for (seq, payload) in [
            (1u8, &[CMD_SIGN_ON][..]),
            (2, &[CMD_ENTER_PROGMODE_ISP][..]),
            (3, &[CMD_LEAVE_PROGMODE_ISP, 1, 1][..]),
            (4, &[CMD_SIGN_ON][..]),
        ] {
            let raw = Frame::with_payload(seq, payload).unwrap().to_bytes();
            input.extend_from_slice(&raw).unwrap();
        }

        let mut link = Link {
            input: &input,
            output: heapless::Vec::new(),
        };
        let mut bl = session();
        bl.run(&mut link).unwrap();

        assert!(bl.leave_requested());
        // The frame after leave is never consumed
        assert_eq!(link.input.len(), 7);

        let mut parser = FrameParser::default();
        let mut reply = Frame::new();
        let mut replies = 0;
        for &b in link.output.iter() {
            if parser.feed(b, &mut reply) == ParseEvent::FrameReady {
                replies += 1;
            }
        }
        assert_eq!(replies, 3);
        assert_eq!(reply.payload(), &[CMD_LEAVE_PROGMODE_ISP, STATUS_CMD_OK]);
    }

    #[test]
    fn run_reports_closed_transport() {
        let mut link = Link {
            input: &[],
            output: heapless::Vec::new(),
        };
        assert_eq!(session().run(&mut link), Err(Error::IoError));
    }
}
