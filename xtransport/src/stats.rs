//! Engine-wide statistics counters.
//!
//! Plain `u32` counters with no atomics: the engine is single-threaded
//! cooperative, so ordinary field access suffices.

/// Number of named counters, and the size of a `PROTO_STATS` snapshot
/// in 4-byte words.
pub const COUNTER_COUNT: usize = 8;

/// Wire size of a `PROTO_STATS` reply payload: 8 little-endian `u32`s.
pub const WIRE_SIZE: usize = COUNTER_COUNT * 4;

/// Monotonic counters tracked for the lifetime of the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub frames_rx: u32,
    pub frames_tx: u32,
    pub checksum_errors: u32,
    pub sequence_errors: u32,
    pub transport_errors: u32,
    pub fragment_errors: u32,
    pub retransmits: u32,
    pub max_ack_queue_depth: u32,
}

impl Stats {
    pub const fn new() -> Self {
        Self {
            frames_rx: 0,
            frames_tx: 0,
            checksum_errors: 0,
            sequence_errors: 0,
            transport_errors: 0,
            fragment_errors: 0,
            retransmits: 0,
            max_ack_queue_depth: 0,
        }
    }

    /// Encodes the counters as a `PROTO_STATS` reply payload: 8
    /// little-endian `u32`s in declaration order.
    pub fn snapshot(&self) -> [u8; WIRE_SIZE] {
        let mut out = [0u8; WIRE_SIZE];
        let values = [
            self.frames_rx,
            self.frames_tx,
            self.checksum_errors,
            self.sequence_errors,
            self.transport_errors,
            self.fragment_errors,
            self.retransmits,
            self.max_ack_queue_depth,
        ];
        for (i, v) in values.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        out
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
