//! Core wire-level building blocks for the protocol engine:
//! - `checksum`: CRC16 (header) and CRC32 (payload) primitives
//! - `frame`: header/frame codec
//! - `packet`: outbound fragmentation helpers

mod checksum;
mod frame;
mod packet;

pub use checksum::{Crc16, Crc32};
pub use frame::{Frame, FrameFlags, Header, CRC32_SIZE};
pub use packet::{fragment_count, fragment_data};
