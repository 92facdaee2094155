//! Engine configuration.
//!
//! An explicit config value is threaded through every constructor
//! rather than relying on module-level constants, so that multiple
//! engine instances can coexist in one process (useful for host-side
//! simulation and for tests that pair two engines over a loopback
//! transport).

use crate::error::{Error, Result};

/// Wire protocol magic/version bytes.
pub const SYNC0: u8 = 0xD5;
pub const SYNC1: u8 = 0xAA;
pub const VERSION: u8 = 0x01;
pub const HEADER_SIZE: usize = 10;

/// Hard ceiling on a single frame's payload, imposed by the `LENGTH`
/// field's range and the device's fixed frame buffer.
pub const MAX_PAYLOAD: u16 = 4082;
/// Floor below which a negotiated payload size is rejected as
/// impractical (a frame must fit at least the smallest fixed-size
/// command/reply record).
pub const MIN_PAYLOAD: u16 = 50;

/// Device capability/negotiation flags, the in-memory counterpart of
/// the 16-byte wire record exchanged by PROTO_GET_CAPS/PROTO_SET_CAPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caps {
    /// Data CRC32 verification is enabled (header CRC16 is always on).
    pub crc: bool,
    /// Sequence number tracking / duplicate detection is enabled.
    pub seq: bool,
    /// ACK/NAK and retransmission is enabled.
    pub ack: bool,
    /// Asynchronous channel events are enabled.
    pub events: bool,
    /// Negotiated maximum payload size in bytes.
    pub max_payload: u16,
}

impl Caps {
    pub const WIRE_SIZE: usize = 16;

    pub const fn new() -> Self {
        Self {
            crc: true,
            seq: true,
            ack: true,
            events: true,
            max_payload: MAX_PAYLOAD,
        }
    }

    /// Encodes this record into the 16-byte wire layout: a flags byte,
    /// a reserved byte, a little-endian `max_payload` u16, and 12
    /// reserved bytes (always written zero).
    pub fn encode(&self, out: &mut [u8; Self::WIRE_SIZE]) {
        let mut flags = 0u8;
        if self.crc {
            flags |= 1 << 0;
        }
        if self.seq {
            flags |= 1 << 1;
        }
        if self.ack {
            flags |= 1 << 2;
        }
        if self.events {
            flags |= 1 << 3;
        }
        out[0] = flags;
        out[1] = 0;
        out[2..4].copy_from_slice(&self.max_payload.to_le_bytes());
        out[4..16].fill(0);
    }

    pub fn decode(data: &[u8; Self::WIRE_SIZE]) -> Self {
        let flags = data[0];
        let max_payload = u16::from_le_bytes([data[2], data[3]]);
        Self {
            crc: flags & (1 << 0) != 0,
            seq: flags & (1 << 1) != 0,
            ack: flags & (1 << 2) != 0,
            events: flags & (1 << 3) != 0,
            max_payload,
        }
    }
}

impl Default for Caps {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine configuration: timeouts, retry limits, and initial
/// capabilities. Capacities (RTX queue depth, reassembly buffer size,
/// channel slot count) are compile-time const generics elsewhere —
/// only the runtime-negotiable values live here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Per-frame receive timeout (HEADER/DATA/CRC stages), milliseconds.
    pub frame_timeout_ms: u32,
    /// Base retransmit timeout before the first backoff, milliseconds.
    pub rtx_base_ms: u32,
    /// Ceiling the retransmit timeout backs off to, milliseconds.
    pub rtx_max_ms: u32,
    /// Maximum retransmission attempts before an entry is dropped.
    pub max_retransmit: u8,
    /// Initial capabilities advertised by this side.
    pub caps: Caps,
    /// This side's own identity, used as the `caller` token for
    /// CHANNEL_LOCK/CHANNEL_UNLOCK. CHANNEL_LOCK carries no payload on
    /// the wire, so there is exactly one caller identity per engine
    /// instance rather than one per request.
    pub peer_id: u32,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            frame_timeout_ms: 500,
            rtx_base_ms: 500,
            rtx_max_ms: 2000,
            max_retransmit: 3,
            caps: Caps::new(),
            peer_id: 1,
        }
    }

    /// Validates and clamps `max_payload` into `[MIN_PAYLOAD,
    /// MAX_PAYLOAD]`, used when negotiating via PROTO_SET_CAPS.
    pub fn validate(&self) -> Result<()> {
        if self.caps.max_payload < MIN_PAYLOAD || self.caps.max_payload > MAX_PAYLOAD {
            return Err(Error::InvalidConfig);
        }
        if self.max_retransmit == 0 {
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }

    pub fn with_max_payload(mut self, max_payload: u16) -> Self {
        self.caps.max_payload = max_payload.clamp(MIN_PAYLOAD, MAX_PAYLOAD);
        self
    }

    pub fn with_caps(mut self, caps: Caps) -> Self {
        self.caps = caps;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Fluent builder for tests that need non-default sizing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn max_payload(mut self, bytes: u16) -> Self {
        self.config.caps.max_payload = bytes;
        self
    }

    pub fn frame_timeout_ms(mut self, ms: u32) -> Self {
        self.config.frame_timeout_ms = ms;
        self
    }

    pub fn rtx_timeouts_ms(mut self, base: u32, max: u32) -> Self {
        self.config.rtx_base_ms = base;
        self.config.rtx_max_ms = max;
        self
    }

    pub fn max_retransmit(mut self, attempts: u8) -> Self {
        self.config.max_retransmit = attempts;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_roundtrip() {
        let caps = Caps {
            crc: true,
            seq: false,
            ack: true,
            events: false,
            max_payload: 1024,
        };
        let mut wire = [0u8; Caps::WIRE_SIZE];
        caps.encode(&mut wire);
        assert_eq!(Caps::decode(&wire), caps);
        assert_eq!(&wire[4..], &[0u8; 12]);
    }

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn builder_rejects_oversized_payload() {
        let err = ConfigBuilder::new().max_payload(5000).build().unwrap_err();
        assert_eq!(err, Error::InvalidConfig);
    }

    #[test]
    fn builder_clamp_helper_clamps() {
        let cfg = Config::new().with_max_payload(50000);
        assert_eq!(cfg.caps.max_payload, MAX_PAYLOAD);
    }
}
