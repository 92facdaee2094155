//! Error types for the protocol engine.
//!
//! This module defines the internal [`Error`] type returned by fallible
//! engine operations, and the wire-visible [`Status`] code carried in
//! ACK/NAK payloads and command replies. The two are intentionally
//! distinct: an `Error` never crosses the wire, a `Status` is never used
//! for local control flow.

use core::fmt;

/// Result type alias for engine operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Internal error type for the protocol engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Buffer is too small for the operation.
    BufferTooSmall,
    /// Buffer is full and cannot accept more data.
    BufferFull,
    /// Header or data checksum verification failed.
    ChecksumMismatch,
    /// Invalid frame format or corrupted data.
    InvalidFrame,
    /// Sequence number is out of expected range.
    SequenceOutOfRange,
    /// Frame payload exceeds maximum allowed size.
    PayloadTooLarge,
    /// Waiting for header/data bytes timed out.
    Timeout,
    /// Maximum retransmission attempts exceeded for a queued frame.
    MaxRetransmitExceeded,
    /// The target channel does not exist.
    UnknownChannel,
    /// The target channel does not support the requested operation.
    ChannelCapability,
    /// The target channel is locked by another owner.
    ChannelLocked,
    /// The RTX queue is full and cannot accept another entry.
    QueueFull,
    /// Duplicate frame received (retransmitted frame already processed).
    DuplicateFrame,
    /// Transport I/O error occurred.
    IoError,
    /// Invalid state for this operation.
    InvalidState,
    /// Resource temporarily unavailable (would block).
    WouldBlock,
    /// A second fragmented message arrived before reassembly finished.
    ReassemblyBusy,
    /// Fragment timeout — not all fragments received in time.
    FragmentTimeout,
    /// Requested configuration value is out of the accepted range.
    InvalidConfig,
}

impl Error {
    /// Returns a human-readable description of the error.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Error::BufferTooSmall => "buffer too small",
            Error::BufferFull => "buffer full",
            Error::ChecksumMismatch => "checksum mismatch",
            Error::InvalidFrame => "invalid frame",
            Error::SequenceOutOfRange => "sequence out of range",
            Error::PayloadTooLarge => "payload too large",
            Error::Timeout => "timeout",
            Error::MaxRetransmitExceeded => "max retransmit exceeded",
            Error::UnknownChannel => "unknown channel",
            Error::ChannelCapability => "channel lacks capability",
            Error::ChannelLocked => "channel locked",
            Error::QueueFull => "queue full",
            Error::DuplicateFrame => "duplicate frame",
            Error::IoError => "I/O error",
            Error::InvalidState => "invalid state",
            Error::WouldBlock => "would block",
            Error::ReassemblyBusy => "reassembly already in progress",
            Error::FragmentTimeout => "fragment timeout",
            Error::InvalidConfig => "invalid configuration",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Wire-level status code, carried in ACK/NAK payloads and command
/// replies. Distinct from [`Error`]: this is what actually gets
/// serialized onto the wire. Values are fixed by the wire protocol,
/// not assigned by declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Success = 0,
    Failed = 1,
    Invalid = 2,
    Timeout = 3,
    Busy = 4,
    Checksum = 5,
    Sequence = 6,
    Overflow = 7,
    Fragment = 8,
    Unknown = 9,
}

impl Status {
    /// Decodes a status byte off the wire, mapping unrecognized values
    /// to [`Status::Unknown`] rather than failing — a peer speaking a
    /// newer protocol revision may emit codes this engine doesn't know.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Status::Success,
            1 => Status::Failed,
            2 => Status::Invalid,
            3 => Status::Timeout,
            4 => Status::Busy,
            5 => Status::Checksum,
            6 => Status::Sequence,
            7 => Status::Overflow,
            8 => Status::Fragment,
            _ => Status::Unknown,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::ChecksumMismatch => Status::Checksum,
            Error::SequenceOutOfRange | Error::DuplicateFrame => Status::Sequence,
            Error::Timeout | Error::FragmentTimeout => Status::Timeout,
            Error::UnknownChannel
            | Error::ChannelCapability
            | Error::InvalidConfig
            | Error::InvalidFrame => Status::Invalid,
            Error::PayloadTooLarge | Error::BufferFull | Error::QueueFull => Status::Overflow,
            Error::ChannelLocked | Error::ReassemblyBusy => Status::Busy,
            Error::BufferTooSmall
            | Error::MaxRetransmitExceeded
            | Error::IoError
            | Error::InvalidState
            | Error::WouldBlock => Status::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_values_match_protocol() {
        assert_eq!(Status::Success.as_u8(), 0);
        assert_eq!(Status::Failed.as_u8(), 1);
        assert_eq!(Status::Invalid.as_u8(), 2);
        assert_eq!(Status::Timeout.as_u8(), 3);
        assert_eq!(Status::Busy.as_u8(), 4);
        assert_eq!(Status::Checksum.as_u8(), 5);
        assert_eq!(Status::Sequence.as_u8(), 6);
        assert_eq!(Status::Overflow.as_u8(), 7);
        assert_eq!(Status::Fragment.as_u8(), 8);
        assert_eq!(Status::Unknown.as_u8(), 9);
    }

    #[test]
    fn unknown_status_roundtrips_to_unknown() {
        assert_eq!(Status::from_u8(200), Status::Unknown);
        assert_eq!(Status::from_u8(9), Status::Unknown);
    }

    #[test]
    fn status_roundtrip() {
        assert_eq!(Status::from_u8(Status::Busy.as_u8()), Status::Busy);
    }
}
