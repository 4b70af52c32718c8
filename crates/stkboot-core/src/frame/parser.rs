//! Byte-at-a-time frame parser

use super::{Frame, ParseEvent};
use crate::error::FrameError;
use crate::protocol::{MAX_PAYLOAD, MESSAGE_START, TOKEN};

/// Receive state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Hunting for `MESSAGE_START`
    Idle,
    /// Start seen, sequence number next
    AwaitSequence,
    /// Length high byte next
    AwaitLengthHigh,
    /// Length low byte next
    AwaitLengthLow,
    /// Token next
    AwaitToken,
    /// Collecting payload bytes
    ReadingPayload,
    /// Checksum byte next
    AwaitChecksum,
}

/// STK500v2 frame parser
///
/// Consumes exactly one byte per [`FrameParser::feed`] call and never blocks.
/// Any protocol violation drops the frame and returns the parser to
/// [`ParserState::Idle`]; the host is expected to time out and retry.
#[derive(Debug, Clone)]
pub struct FrameParser {
    state: ParserState,
    checksum: u8,
    length: u16,
    strict_sequence: bool,
    expected_sequence: u8,
}

impl FrameParser {
    /// Create a parser; `strict_sequence` only admits sequence 1 or the
    /// expected sequence
    pub const fn new(strict_sequence: bool) -> Self {
        Self {
            state: ParserState::Idle,
            checksum: 0,
            length: 0,
            strict_sequence,
            expected_sequence: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Sequence number admitted in strict mode besides 1
    pub fn set_expected_sequence(&mut self, sequence: u8) {
        self.expected_sequence = sequence;
    }

    fn reject(&mut self, reason: FrameError) -> ParseEvent {
        log::trace!("stk500: dropping frame: {}", reason);
        self.state = ParserState::Idle;
        ParseEvent::Rejected(reason)
    }

    /// Feed one received byte, filling `frame` as the payload arrives
    pub fn feed(&mut self, byte: u8, frame: &mut Frame) -> ParseEvent {
        match self.state {
            ParserState::Idle => {
                if byte == MESSAGE_START {
                    self.checksum = MESSAGE_START;
                    self.state = ParserState::AwaitSequence;
                }
                ParseEvent::Continue
            }
            ParserState::AwaitSequence => {
                if self.strict_sequence && byte != 1 && byte != self.expected_sequence {
                    return self.reject(FrameError::SequenceRejected(byte));
                }
                frame.reset(byte);
                self.checksum ^= byte;
                self.state = ParserState::AwaitLengthHigh;
                ParseEvent::Continue
            }
            ParserState::AwaitLengthHigh => {
                self.length = u16::from(byte) << 8;
                self.checksum ^= byte;
                self.state = ParserState::AwaitLengthLow;
                ParseEvent::Continue
            }
            ParserState::AwaitLengthLow => {
                self.length |= u16::from(byte);
                self.checksum ^= byte;
                if self.length == 0 {
                    return self.reject(FrameError::EmptyFrame);
                }
                if usize::from(self.length) > MAX_PAYLOAD {
                    return self.reject(FrameError::PayloadTooLarge {
                        declared: self.length,
                    });
                }
                self.state = ParserState::AwaitToken;
                ParseEvent::Continue
            }
            ParserState::AwaitToken => {
                if byte != TOKEN {
                    return self.reject(FrameError::BadToken(byte));
                }
                self.checksum ^= byte;
                self.state = ParserState::ReadingPayload;
                ParseEvent::Continue
            }
            ParserState::ReadingPayload => {
                // Length was checked against capacity, so this cannot overflow
                if frame.push_received(byte).is_err() {
                    return self.reject(FrameError::PayloadTooLarge {
                        declared: self.length,
                    });
                }
                self.checksum ^= byte;
                if frame.len() == self.length {
                    self.state = ParserState::AwaitChecksum;
                }
                ParseEvent::Continue
            }
            ParserState::AwaitChecksum => {
                self.state = ParserState::Idle;
                if byte == self.checksum {
                    ParseEvent::FrameReady
                } else {
                    let expected = self.checksum;
                    self.reject(FrameError::ChecksumMismatch {
                        expected,
                        found: byte,
                    })
                }
            }
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new(false)
    }
}
