//! Wire frame header and dual-CRC frame codec.
//!
//! # Frame format
//!
//! ```text
//! byte:   0     1     2     3     4     5     6    7    8     9
//!       +-----+-----+-----+-----+-----+-----+----+----+----+----+
//!       |SYNC0|SYNC1| SEQ |CHAN |FLAGS|OPCODE| LENGTH  |  CRC16  |
//!       +-----+-----+-----+-----+-----+-----+----+----+----+----+
//!                                                       ^ over bytes 0..8
//! followed by, only when LENGTH > 0:
//!       | ... LENGTH bytes of payload ... | CRC32 (4 bytes, over payload) |
//! ```
//!
//! Multi-byte fields (`LENGTH`, `CRC16`, `CRC32`) are little-endian.
//! `CRC16` covers the header only (bytes 0..8), letting the receive
//! state machine validate `LENGTH` before committing to reading a
//! possibly-large payload. `CRC32` covers the payload only.

use super::checksum::{Crc16, Crc32};
use crate::config::{HEADER_SIZE, SYNC0, SYNC1};
use crate::error::{Error, Result};

/// Size of the trailing payload CRC32, in bytes.
pub const CRC32_SIZE: usize = 4;

/// Frame flag bits, carried in the header's `FLAGS` byte. Modeled as a
/// hand-rolled bitset (rather than pulling in a `bitflags`-style crate)
/// to match the existing header-codec idiom of this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    pub const NONE: Self = Self(0);
    pub const ACK: Self = Self(1 << 0);
    pub const NAK: Self = Self(1 << 1);
    pub const RTX: Self = Self(1 << 2);
    pub const ACK_REQ: Self = Self(1 << 3);
    pub const FRAGMENT: Self = Self(1 << 4);
    pub const EVENT: Self = Self(1 << 5);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn insert(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn remove(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// A parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub seq: u8,
    pub channel: u8,
    pub flags: FrameFlags,
    pub opcode: u8,
    pub length: u16,
}

impl Header {
    /// Encodes this header into its 10-byte wire form, computing and
    /// writing the header CRC16 over bytes `0..8`.
    pub fn encode(&self, out: &mut [u8; HEADER_SIZE]) {
        out[0] = SYNC0;
        out[1] = SYNC1;
        out[2] = self.seq;
        out[3] = self.channel;
        out[4] = self.flags.bits();
        out[5] = self.opcode;
        out[6..8].copy_from_slice(&self.length.to_le_bytes());
        let crc = Crc16::compute(&out[0..8]);
        out[8..10].copy_from_slice(&crc.to_le_bytes());
    }

    /// Decodes a 10-byte header, validating the SYNC bytes and header
    /// CRC16. Does not look at the payload.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        if buf[0] != SYNC0 || buf[1] != SYNC1 {
            return Err(Error::InvalidFrame);
        }
        let expected_crc = u16::from_le_bytes([buf[8], buf[9]]);
        let actual_crc = Crc16::compute(&buf[0..8]);
        if expected_crc != actual_crc {
            return Err(Error::ChecksumMismatch);
        }

        Ok(Self {
            seq: buf[2],
            channel: buf[3],
            flags: FrameFlags::from_bits(buf[4]),
            opcode: buf[5],
            length: u16::from_le_bytes([buf[6], buf[7]]),
        })
    }
}

/// A fully decoded frame: header plus a borrowed payload slice. The
/// payload CRC32, if present, has already been validated by the time
/// this value exists.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub header: Header,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Total on-wire size of this frame, header + payload + (if any)
    /// trailing CRC32.
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE
            + self.payload.len()
            + if self.payload.is_empty() { 0 } else { CRC32_SIZE }
    }

    /// Verifies a payload buffer against a trailing CRC32 read off the
    /// wire.
    pub fn verify_payload_crc(payload: &[u8], crc_bytes: [u8; 4]) -> Result<()> {
        let expected = u32::from_le_bytes(crc_bytes);
        if Crc32::verify(payload, expected) {
            Ok(())
        } else {
            Err(Error::ChecksumMismatch)
        }
    }

    /// Computes the trailing CRC32 for a payload about to be
    /// transmitted.
    pub fn payload_crc(payload: &[u8]) -> [u8; 4] {
        Crc32::compute(payload).to_le_bytes()
    }
}
