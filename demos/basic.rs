//! Minimal host-side walkthrough of the protocol engine: bring up an
//! `Engine` over a loopback transport, exchange the handshake-style
//! `PROTO_SYNC` and `PROTO_GET_CAPS` commands, register a read-only
//! channel, and read back its contents.
//!
//! Run with `cargo run --example basic_usage --features std`.

use xtransport::channel::{Channel, ChannelFlags, ChannelStatus};
use xtransport::core::{Frame, FrameFlags, Header};
use xtransport::dispatch::{opcode, SysInfo};
use xtransport::transport::LoopbackTransport;
use xtransport::{Config, Engine};

/// A trivial read-only channel backed by a fixed byte slice, standing in
/// for e.g. a device identification blob or a small sensor snapshot.
struct StaticChannel {
    data: &'static [u8],
}

impl Channel for StaticChannel {
    fn read(&mut self, offset: u32, out: &mut [u8]) -> Result<usize, ChannelStatus> {
        let offset = offset as usize;
        if offset > self.data.len() {
            return Err(ChannelStatus::Invalid);
        }
        let n = out.len().min(self.data.len() - offset);
        out[..n].copy_from_slice(&self.data[offset..offset + n]);
        Ok(n)
    }

    fn available(&self) -> u32 {
        self.data.len() as u32
    }
}

/// Builds the wire bytes a host would send for one command frame. This
/// is handed directly to [`Engine::poll`] as its `bytes` argument — the
/// engine's own transport is only ever written to by the engine itself,
/// for replies the host reads back.
fn encode_command(seq: u8, opcode: u8, payload: &[u8]) -> Vec<u8> {
    let header = Header {
        seq,
        channel: 0,
        flags: if payload.is_empty() { FrameFlags::NONE } else { FrameFlags::ACK_REQ },
        opcode,
        length: payload.len() as u16,
    };
    let mut hbuf = [0u8; 10];
    header.encode(&mut hbuf);
    let mut wire = Vec::with_capacity(10 + payload.len() + 4);
    wire.extend_from_slice(&hbuf);
    if !payload.is_empty() {
        wire.extend_from_slice(payload);
        wire.extend_from_slice(&Frame::payload_crc(payload));
    }
    wire
}

fn main() {
    let mut engine: Engine<256, 1024, 4, 270, 8> = Engine::new(Config::new(), SysInfo::new());
    let mut transport: LoopbackTransport<4096> = LoopbackTransport::new();

    engine
        .register_channel(
            Some(1),
            ChannelFlags::READ,
            *b"identity\0\0\0\0\0\0",
            Box::new(StaticChannel { data: b"xtransport-demo-device" }),
            transport.ready(),
        )
        .expect("register identity channel");

    // PROTO_SYNC: reset sequencing before the exchange begins.
    let sync = encode_command(0, opcode::PROTO_SYNC, &[]);
    engine.poll(&mut transport, &sync, 0);
    let mut reply = [0u8; 32];
    let n = transport.read_nonblocking(&mut reply);
    println!("PROTO_SYNC reply: {n} bytes, status={:?}", &reply[10..n]);

    // CHANNEL_READ on the identity channel: offset=0, len=23.
    let mut read_payload = Vec::new();
    read_payload.extend_from_slice(&0u32.to_le_bytes());
    read_payload.extend_from_slice(&23u32.to_le_bytes());
    let header = Header {
        seq: 1,
        channel: 1,
        flags: FrameFlags::ACK_REQ,
        opcode: opcode::CHANNEL_READ,
        length: read_payload.len() as u16,
    };
    let mut hbuf = [0u8; 10];
    header.encode(&mut hbuf);
    let mut wire = Vec::new();
    wire.extend_from_slice(&hbuf);
    wire.extend_from_slice(&read_payload);
    wire.extend_from_slice(&Frame::payload_crc(&read_payload));

    engine.poll(&mut transport, &wire, 1);
    let mut reply = [0u8; 64];
    let n = transport.read_nonblocking(&mut reply);
    let header = Header::decode(&reply[0..10].try_into().unwrap()).unwrap();
    let body = &reply[10..10 + header.length as usize];
    println!("CHANNEL_READ reply: {:?}", core::str::from_utf8(body).unwrap_or("<binary>"));
}
