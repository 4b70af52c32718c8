//! Reply encoder

use super::Frame;
use crate::error::{Error, Result};
use embedded_io::Write;

/// Serializes reply frames onto the transport one byte at a time
///
/// The reply carries the sequence number of the request it answers. After
/// every reply the encoder advances its own sequence counter, which the
/// session hands to the parser for strict sequence checking.
#[derive(Debug, Clone, Default)]
pub struct ReplyEncoder {
    next_sequence: u8,
}

impl ReplyEncoder {
    /// Create an encoder
    pub const fn new() -> Self {
        Self { next_sequence: 0 }
    }

    /// Sequence number following the last emitted reply
    pub fn next_sequence(&self) -> u8 {
        self.next_sequence
    }

    /// Emit `frame` byte by byte into `sink` and flush it
    pub fn encode<W: Write>(&mut self, frame: &Frame, sink: &mut W) -> Result<()> {
        let mut checksum = 0u8;
        for &b in frame.header().iter().chain(frame.payload()) {
            send_byte(sink, b)?;
            checksum ^= b;
        }
        send_byte(sink, checksum)?;
        sink.flush().map_err(|_| Error::IoError)?;

        self.next_sequence = frame.sequence().wrapping_add(1);
        log::trace!(
            "stk500: sent reply seq={} len={} status=0x{:02X}",
            frame.sequence(),
            frame.len(),
            frame.byte(1).unwrap_or(0)
        );
        Ok(())
    }
}

fn send_byte<W: Write>(sink: &mut W, byte: u8) -> Result<()> {
    sink.write_all(&[byte]).map_err(|_| Error::IoError)
}
