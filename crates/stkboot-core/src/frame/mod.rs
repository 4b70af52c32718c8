//! STK500v2 message framing
//!
//! ```text
//! START(0x1B) SEQ LEN_HI LEN_LO TOKEN(0x0E) payload[LEN] CHECKSUM
//! ```
//!
//! `CHECKSUM` is the XOR of every byte from `START` through the last payload
//! byte. Requests and replies use the same framing; a single [`Frame`] buffer
//! holds the request and is then rewritten in place into the reply.

mod encoder;
mod parser;

pub use encoder::ReplyEncoder;
pub use parser::{FrameParser, ParserState};

use crate::error::{Error, Result};
use crate::protocol::{checksum, FRAME_OVERHEAD, MAX_PAYLOAD, MESSAGE_START, TOKEN};
use heapless::Vec;

/// Largest encoded frame
pub const MAX_FRAME: usize = MAX_PAYLOAD + FRAME_OVERHEAD;

/// Outcome of feeding one byte to the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseEvent {
    /// Byte consumed, frame not complete yet
    Continue,
    /// A checksum-valid frame is in the buffer
    FrameReady,
    /// The frame was dropped and the parser is idle again
    Rejected(crate::error::FrameError),
}

/// One protocol message: sequence number plus bounds-checked payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    sequence: u8,
    payload: Vec<u8, MAX_PAYLOAD>,
}

impl Frame {
    /// Create an empty frame
    pub const fn new() -> Self {
        Self {
            sequence: 0,
            payload: Vec::new(),
        }
    }

    /// Create a frame from a sequence number and payload
    pub fn with_payload(sequence: u8, payload: &[u8]) -> Result<Self> {
        let mut frame = Self::new();
        frame.sequence = sequence;
        frame
            .payload
            .extend_from_slice(payload)
            .map_err(|_| Error::BufferTooSmall)?;
        Ok(frame)
    }

    /// Sequence number of this frame
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length as carried in the length field
    pub fn len(&self) -> u16 {
        self.payload.len() as u16
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// First payload byte
    pub fn opcode(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// Payload byte at `index`, if present
    pub fn byte(&self, index: usize) -> Option<u8> {
        self.payload.get(index).copied()
    }

    pub(crate) fn reset(&mut self, sequence: u8) {
        self.sequence = sequence;
        self.payload.clear();
    }

    pub(crate) fn push_received(&mut self, byte: u8) -> Result<()> {
        self.payload.push(byte).map_err(|_| Error::BufferTooSmall)
    }

    /// Turn the request into a reply: keep the echoed opcode, append `status`
    pub fn begin_reply(&mut self, status: u8) {
        self.payload.truncate(1);
        // Capacity is never below 2, the push cannot fail
        let _ = self.payload.push(status);
    }

    /// Append one byte to the reply
    pub fn push(&mut self, byte: u8) -> Result<()> {
        self.payload.push(byte).map_err(|_| Error::BufferTooSmall)
    }

    /// Append bytes to the reply
    pub fn extend(&mut self, bytes: &[u8]) -> Result<()> {
        self.payload
            .extend_from_slice(bytes)
            .map_err(|_| Error::BufferTooSmall)
    }

    /// Header bytes: start, sequence, length, token
    pub fn header(&self) -> [u8; 5] {
        let [hi, lo] = self.len().to_be_bytes();
        [MESSAGE_START, self.sequence, hi, lo, TOKEN]
    }

    /// Checksum over header and payload
    pub fn checksum(&self) -> u8 {
        checksum(&self.header()) ^ checksum(&self.payload)
    }

    /// Encode the complete frame into a buffer
    pub fn to_bytes(&self) -> Vec<u8, MAX_FRAME> {
        let mut out = Vec::new();
        // MAX_FRAME covers header, full payload and checksum
        let _ = out.extend_from_slice(&self.header());
        let _ = out.extend_from_slice(&self.payload);
        let _ = out.push(self.checksum());
        out
    }
}
