//! Buffer management for the protocol engine.
//!
//! This module provides:
//! - `RingBuffer`: circular buffer for efficient FIFO byte ingestion,
//!   feeding the receive state machine from transport reads or
//!   interrupt-context byte producers.
//!
//! A sliding send/receive window (`SendWindow`/`ReceiveWindow`) is not
//! part of this module: `seq`/`rtx` cover sequencing and retransmission
//! for this engine's single-in-flight-per-direction model instead.

mod ring;

pub use ring::RingBuffer;
