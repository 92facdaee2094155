//! Byte-driven receive state machine.
//!
//! `IDLE -> SYNC -> HEADER -> DATA -> CRC -> PROCESS`, fed one byte at
//! a time so it can sit directly on top of a transport's non-blocking
//! read or an ISR-fed ingestion ring buffer: accumulate into a fixed
//! buffer, decode once full, hand back a borrowed [`Frame`]. Byte-level
//! SYNC scanning resynchronizes the stream after any invalid byte
//! rather than assuming a clean frame start.

use crate::config::HEADER_SIZE;
use crate::core::{Frame, Header, CRC32_SIZE};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    Idle,
    Header,
    Data,
    Crc,
    Ready,
}

/// Outcome of feeding a single byte into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedResult {
    /// Still waiting for more bytes.
    Pending,
    /// A complete, checksum-valid frame is ready; call
    /// [`ReceiveMachine::take_frame`].
    FrameReady,
    /// The header's own CRC16 failed; the machine has already
    /// resynchronized and is scanning for a new SYNC sequence.
    HeaderChecksumError,
    /// The payload's CRC32 failed; the machine has already
    /// resynchronized. Carries the (already-validated) header so the
    /// caller can NAK it if `ACK_REQ` was set — unlike a header CRC
    /// failure, the header itself is known-good here.
    PayloadChecksumError(Header),
}

/// Byte-driven frame receiver, sized to accept payloads up to
/// `MAX_PAYLOAD` bytes.
pub struct ReceiveMachine<const MAX_PAYLOAD: usize> {
    state: RxState,
    header_buf: [u8; HEADER_SIZE],
    header_pos: usize,
    header: Option<Header>,
    payload_buf: [u8; MAX_PAYLOAD],
    payload_pos: usize,
    crc_buf: [u8; CRC32_SIZE],
    crc_pos: usize,
    frame_start_ms: u64,
    check_payload_crc: bool,
}

impl<const MAX_PAYLOAD: usize> ReceiveMachine<MAX_PAYLOAD> {
    pub const fn new() -> Self {
        Self {
            state: RxState::Idle,
            header_buf: [0u8; HEADER_SIZE],
            header_pos: 0,
            header: None,
            payload_buf: [0u8; MAX_PAYLOAD],
            payload_pos: 0,
            crc_buf: [0u8; CRC32_SIZE],
            crc_pos: 0,
            frame_start_ms: 0,
            check_payload_crc: true,
        }
    }

    /// Gates payload CRC32 verification on the negotiated `caps.crc`
    /// capability. The header CRC16 is always validated — it protects
    /// `LENGTH` itself, which the state machine must trust before it
    /// will even read a payload of that size.
    pub fn set_payload_crc_check(&mut self, enabled: bool) {
        self.check_payload_crc = enabled;
    }

    fn reset_to_idle(&mut self) {
        self.state = RxState::Idle;
        self.header_pos = 0;
        self.payload_pos = 0;
        self.crc_pos = 0;
        self.header = None;
    }

    /// Feeds one byte from the transport into the state machine.
    pub fn feed(&mut self, byte: u8, now_ms: u64) -> FeedResult {
        use crate::config::{SYNC0, SYNC1};

        match self.state {
            RxState::Idle => {
                if byte == SYNC0 {
                    self.header_buf[0] = byte;
                    self.header_pos = 1;
                    self.state = RxState::Header;
                    self.frame_start_ms = now_ms;
                }
                FeedResult::Pending
            }
            RxState::Header => {
                if self.header_pos == 1 && byte != SYNC1 {
                    // Resync: this byte might itself be a fresh SYNC0.
                    if byte == SYNC0 {
                        self.header_buf[0] = byte;
                        self.header_pos = 1;
                        self.frame_start_ms = now_ms;
                    } else {
                        self.reset_to_idle();
                    }
                    return FeedResult::Pending;
                }

                self.header_buf[self.header_pos] = byte;
                self.header_pos += 1;

                if self.header_pos < HEADER_SIZE {
                    return FeedResult::Pending;
                }

                match Header::decode(&self.header_buf) {
                    Ok(header) => {
                        let length = header.length as usize;
                        self.header = Some(header);
                        if length == 0 {
                            self.state = RxState::Ready;
                            FeedResult::FrameReady
                        } else if length > MAX_PAYLOAD {
                            self.reset_to_idle();
                            FeedResult::HeaderChecksumError
                        } else {
                            self.state = RxState::Data;
                            self.payload_pos = 0;
                            FeedResult::Pending
                        }
                    }
                    Err(Error::InvalidFrame) => {
                        // Bad SYNC1 already filtered above; this is a
                        // structurally-impossible decode path, treat as
                        // resync defensively.
                        self.reset_to_idle();
                        FeedResult::Pending
                    }
                    Err(_) => {
                        self.reset_to_idle();
                        FeedResult::HeaderChecksumError
                    }
                }
            }
            RxState::Data => {
                self.payload_buf[self.payload_pos] = byte;
                self.payload_pos += 1;
                let length = self.header.expect("header set before Data state").length as usize;
                if self.payload_pos < length {
                    FeedResult::Pending
                } else {
                    self.state = RxState::Crc;
                    self.crc_pos = 0;
                    FeedResult::Pending
                }
            }
            RxState::Crc => {
                self.crc_buf[self.crc_pos] = byte;
                self.crc_pos += 1;
                if self.crc_pos < CRC32_SIZE {
                    return FeedResult::Pending;
                }

                let header = self.header.expect("header set before Crc state");
                let length = header.length as usize;
                let verified = !self.check_payload_crc
                    || Frame::verify_payload_crc(&self.payload_buf[..length], self.crc_buf).is_ok();
                if verified {
                    self.state = RxState::Ready;
                    FeedResult::FrameReady
                } else {
                    self.reset_to_idle();
                    FeedResult::PayloadChecksumError(header)
                }
            }
            RxState::Ready => {
                // Caller hasn't consumed the ready frame yet; treat this
                // byte as belonging to the next frame's search.
                self.reset_to_idle();
                self.feed(byte, now_ms)
            }
        }
    }

    /// Returns the completed frame after [`FeedResult::FrameReady`],
    /// and resets the state machine to scan for the next one.
    pub fn take_frame(&mut self) -> Frame<'_> {
        let header = self.header.take().expect("take_frame called without a ready frame");
        let length = header.length as usize;
        let frame = Frame {
            header,
            payload: &self.payload_buf[..length],
        };
        self.state = RxState::Idle;
        self.header_pos = 0;
        self.payload_pos = 0;
        self.crc_pos = 0;
        frame
    }

    /// Returns `true` (and resets to `Idle`) if a frame has been
    /// in-flight longer than `timeout_ms` without completing.
    pub fn check_timeout(&mut self, now_ms: u64, timeout_ms: u64) -> bool {
        if self.state == RxState::Idle || self.state == RxState::Ready {
            return false;
        }
        if now_ms.saturating_sub(self.frame_start_ms) >= timeout_ms {
            self.reset_to_idle();
            true
        } else {
            false
        }
    }
}

impl<const MAX_PAYLOAD: usize> Default for ReceiveMachine<MAX_PAYLOAD> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FrameFlags;

    fn encode_frame(seq: u8, channel: u8, opcode: u8, payload: &[u8]) -> alloc::vec::Vec<u8> {
        let header = Header {
            seq,
            channel,
            flags: FrameFlags::NONE,
            opcode,
            length: payload.len() as u16,
        };
        let mut wire = alloc::vec::Vec::new();
        let mut hbuf = [0u8; HEADER_SIZE];
        header.encode(&mut hbuf);
        wire.extend_from_slice(&hbuf);
        wire.extend_from_slice(payload);
        if !payload.is_empty() {
            wire.extend_from_slice(&Frame::payload_crc(payload));
        }
        wire
    }

    #[test]
    fn receives_clean_frame() {
        let mut rx: ReceiveMachine<64> = ReceiveMachine::new();
        let wire = encode_frame(1, 2, 0x30, b"payload");

        for &b in &wire[..wire.len() - 1] {
            assert_eq!(rx.feed(b, 0), FeedResult::Pending);
        }
        assert_eq!(rx.feed(*wire.last().unwrap(), 0), FeedResult::FrameReady);
        let frame = rx.take_frame();
        assert_eq!(frame.payload, b"payload");
    }

    #[test]
    fn zero_length_frame_completes_after_header() {
        let mut rx: ReceiveMachine<64> = ReceiveMachine::new();
        let wire = encode_frame(1, 2, 0x30, b"");
        for &b in &wire[..wire.len() - 1] {
            assert_eq!(rx.feed(b, 0), FeedResult::Pending);
        }
        assert_eq!(rx.feed(*wire.last().unwrap(), 0), FeedResult::FrameReady);
        assert_eq!(rx.take_frame().payload, b"");
    }

    #[test]
    fn resyncs_past_garbage_prefix() {
        let mut rx: ReceiveMachine<64> = ReceiveMachine::new();
        let wire = encode_frame(1, 2, 0x30, b"abc");

        let mut garbage = alloc::vec::Vec::from(&b"\x01\x02\x03"[..]);
        garbage.extend_from_slice(&wire);

        let mut result = FeedResult::Pending;
        for &b in &garbage {
            result = rx.feed(b, 0);
            if result == FeedResult::FrameReady {
                break;
            }
        }
        assert_eq!(result, FeedResult::FrameReady);
        assert_eq!(rx.take_frame().payload, b"abc");
    }

    #[test]
    fn corrupted_payload_crc_triggers_resync() {
        let mut rx: ReceiveMachine<64> = ReceiveMachine::new();
        let mut wire = encode_frame(1, 2, 0x30, b"abc");
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;

        let mut saw_error = false;
        for &b in &wire {
            if let FeedResult::PayloadChecksumError(header) = rx.feed(b, 0) {
                saw_error = true;
                assert_eq!(header.channel, 2);
            }
        }
        assert!(saw_error);
    }

    #[test]
    fn disabling_payload_crc_check_accepts_corrupted_data() {
        let mut rx: ReceiveMachine<64> = ReceiveMachine::new();
        rx.set_payload_crc_check(false);
        let mut wire = encode_frame(1, 2, 0x30, b"abc");
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;

        let mut result = FeedResult::Pending;
        for &b in &wire {
            result = rx.feed(b, 0);
        }
        assert_eq!(result, FeedResult::FrameReady);
        assert_eq!(rx.take_frame().payload, b"abc");
    }

    #[test]
    fn stalled_frame_times_out() {
        let mut rx: ReceiveMachine<64> = ReceiveMachine::new();
        rx.feed(crate::config::SYNC0, 0);
        assert!(!rx.check_timeout(100, 500));
        assert!(rx.check_timeout(600, 500));
        // after timing out, the machine is idle again
        assert!(!rx.check_timeout(600, 500));
    }
}
