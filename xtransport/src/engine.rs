//! Top-level protocol engine: the explicit value every handler is
//! threaded through rather than hidden module state, so multiple
//! engines can coexist in one process. Owns configuration, the channel
//! registry, both sequence counters, the RTX queue, the single-flight
//! reassembly buffer, the byte-driven receive state machine, the event
//! queue, and the statistics block — and drives all of them from two
//! entry points: [`Engine::poll`] (bytes in, dispatch, replies and
//! retransmits out) and [`Engine::emit_channel_event`] /
//! [`Engine::register_channel`] (for channel/system events raised
//! outside the request/response path).

use crate::channel::{Channel, ChannelFlags, ChannelStatus, Registry};
use crate::config::Config;
use crate::core::{fragment_count, fragment_data, Frame, FrameFlags, Header, CRC32_SIZE};
use crate::dispatch::{encode_poll_bitmap, opcode, SysInfo};
use crate::error::Status;
use crate::events::{Event, EventEmitter};
use crate::reassembly::Reassembly;
use crate::recv::{FeedResult, ReceiveMachine};
use crate::rtx::{RtxEvent, RtxQueue};
use crate::seq::{RxOutcome, SequenceState};
use crate::stats::Stats;
use crate::transport::Transport;

/// System event codes emitted on channel 0 with opcode `SYS_EVENT`.
pub mod system_event {
    pub const CHANNEL_REGISTERED: u32 = 0x00;
    pub const CHANNEL_UNREGISTERED: u32 = 0x01;
    pub const SOFT_REBOOT: u32 = 0x02;
}

/// A pending side effect requested by the host that the core loop
/// can't perform itself (rebooting the MCU, jumping to a bootloader)
/// — surfaced for the embedding application to act on after the
/// response path has had a chance to drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    Reset,
    Boot,
}

/// Size of one fully-encoded frame (header + max payload + trailing
/// CRC32) that must fit in an [`Engine`]'s RTX storage slots.
pub const fn frame_capacity(max_payload: usize) -> usize {
    crate::config::HEADER_SIZE + max_payload + CRC32_SIZE
}

/// The protocol engine. `MAX_PAYLOAD` bounds a single frame's payload
/// (and sizes the receive machine's buffer); `REASM_CAP` sizes the
/// fragment-reassembly scratch buffer (must be large enough to hold a
/// fully reassembled multi-fragment payload, so typically a multiple
/// of `MAX_PAYLOAD`); `RTX_CAP` is the number of concurrently
/// outstanding unacknowledged frames; `FRAME_CAP` must be at least
/// [`frame_capacity`]`(MAX_PAYLOAD)`; `EVENT_CAP` sizes the event queue
/// and, per [`EventEmitter`](crate::events::EventEmitter), holds
/// `EVENT_CAP - 1` events at once.
pub struct Engine<
    const MAX_PAYLOAD: usize,
    const REASM_CAP: usize,
    const RTX_CAP: usize,
    const FRAME_CAP: usize,
    const EVENT_CAP: usize,
> {
    config: Config,
    registry: Registry,
    seq: SequenceState,
    rtx: RtxQueue<RTX_CAP, FRAME_CAP>,
    reasm: Reassembly<REASM_CAP>,
    recv: ReceiveMachine<MAX_PAYLOAD>,
    events: EventEmitter<EVENT_CAP>,
    stats: Stats,
    sys_info: SysInfo,
    /// Scratch buffer for outbound command-reply bodies. Sized by
    /// `REASM_CAP`, not `MAX_PAYLOAD`: a `CHANNEL_READ` reply can be a
    /// logical payload larger than one frame, and [`Engine::reply`]
    /// hands the whole thing to [`Engine::send_fragmented`] to be split
    /// back down into `max_payload`-sized wire frames.
    resp_buf: [u8; REASM_CAP],
    pending_effect: Option<SideEffect>,
}

/// Outcome of dispatching one complete inbound frame.
struct HandlerResult {
    status: Status,
    /// Number of bytes of an actual response body written to
    /// `resp_buf` (meaningful only when `has_body` and `status` is
    /// `Success`).
    len: usize,
    /// Whether the handler produced a substantive body (read data, a
    /// record dump) as opposed to a bare status code.
    has_body: bool,
}

impl HandlerResult {
    const fn status_only(status: Status) -> Self {
        Self { status, len: 0, has_body: false }
    }

    const fn body(len: usize) -> Self {
        Self { status: Status::Success, len, has_body: true }
    }
}

impl<
        const MAX_PAYLOAD: usize,
        const REASM_CAP: usize,
        const RTX_CAP: usize,
        const FRAME_CAP: usize,
        const EVENT_CAP: usize,
    > Engine<MAX_PAYLOAD, REASM_CAP, RTX_CAP, FRAME_CAP, EVENT_CAP>
{
    pub fn new(config: Config, sys_info: SysInfo) -> Self {
        Self {
            config,
            registry: Registry::new(),
            seq: SequenceState::new(),
            rtx: RtxQueue::new(config.rtx_base_ms, config.rtx_max_ms, config.max_retransmit),
            reasm: Reassembly::new(),
            recv: ReceiveMachine::new(),
            events: EventEmitter::new(),
            stats: Stats::new(),
            sys_info,
            resp_buf: [0u8; REASM_CAP],
            pending_effect: None,
        }
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Drains and returns a side effect requested by `SYS_RESET` or
    /// `SYS_BOOT`, if any is pending. The caller is expected to let the
    /// transport drain (spec's bounded-timeout wait) before acting.
    pub fn take_side_effect(&mut self) -> Option<SideEffect> {
        self.pending_effect.take()
    }

    /// Registers a channel, emitting a `CHANNEL_REGISTERED` system
    /// event if the channel is `DYNAMIC` and events are enabled.
    pub fn register_channel(
        &mut self,
        id: Option<u8>,
        flags: ChannelFlags,
        name: [u8; 14],
        channel: alloc::boxed::Box<dyn Channel>,
        transport_ready: bool,
    ) -> crate::error::Result<u8> {
        let id = self.registry.register(id, flags, name, channel)?;
        if flags.contains(ChannelFlags::DYNAMIC) {
            self.queue_system_event(system_event::CHANNEL_REGISTERED, &[id], transport_ready);
        }
        Ok(id)
    }

    /// Unregisters a channel, emitting a `CHANNEL_UNREGISTERED` system
    /// event if it was `DYNAMIC` and events are enabled.
    pub fn unregister_channel(&mut self, id: u8, transport_ready: bool) -> crate::error::Result<()> {
        let flags = self.registry.flags(id).ok_or(crate::error::Error::UnknownChannel)?;
        self.registry.unregister(id)?;
        if flags.contains(ChannelFlags::DYNAMIC) {
            self.queue_system_event(system_event::CHANNEL_UNREGISTERED, &[id], transport_ready);
        }
        Ok(())
    }

    fn queue_system_event(&mut self, code: u32, data: &[u8], transport_ready: bool) {
        let headroom = self.rtx.depth() < RTX_CAP;
        self.events.try_emit(Event::system(code, data), self.config.caps.events, transport_ready, headroom);
    }

    /// Queues a channel event (e.g. a frame-ready notification from a
    /// stream channel). Never sets `ACK_REQ`, dropped silently if the
    /// event queue, transport, or capability gate isn't ready.
    pub fn emit_channel_event(&mut self, channel: u8, code: u32, data: &[u8], transport_ready: bool) {
        let headroom = self.rtx.depth() < RTX_CAP;
        self.events
            .try_emit(Event::channel(channel, code, data), self.config.caps.events, transport_ready, headroom);
    }

    /// Feeds transport-read bytes into the receive state machine,
    /// dispatching and replying to every complete frame, retransmitting
    /// timed-out RTX entries, and draining any queued events. Call
    /// regularly from the core loop with freshly read bytes (possibly
    /// empty, to drive timeouts) and the current monotonic time.
    pub fn poll(&mut self, transport: &mut impl Transport, bytes: &[u8], now_ms: u64) {
        self.recv.set_payload_crc_check(self.config.caps.crc);
        for &b in bytes {
            match self.recv.feed(b, now_ms) {
                FeedResult::Pending => {}
                FeedResult::FrameReady => self.handle_frame(transport, now_ms),
                FeedResult::HeaderChecksumError => {
                    // The header's own CRC failed, so SEQ/CHAN/FLAGS
                    // cannot be trusted enough to know whether ACK_REQ
                    // was set; no response is possible.
                    log::warn!("header checksum error, resynchronizing");
                    self.stats.checksum_errors += 1;
                }
                FeedResult::PayloadChecksumError(header) => {
                    log::warn!(
                        "payload checksum error on channel {} opcode {:#04x}",
                        header.channel,
                        header.opcode
                    );
                    self.stats.checksum_errors += 1;
                    if header.flags.contains(FrameFlags::ACK_REQ) && self.config.caps.ack {
                        self.reply(transport, &header, Status::Checksum, &[], false, now_ms);
                    }
                }
            }
        }
        if self.recv.check_timeout(now_ms, self.config.frame_timeout_ms as u64) {
            self.stats.transport_errors += 1;
        }
        if self.reasm.is_timed_out(now_ms, self.config.frame_timeout_ms as u64) {
            let (channel, opcode) = self.reasm.channel_opcode();
            log::warn!("reassembly for channel {channel} opcode {opcode:#04x} timed out, discarding");
            self.reasm.reset();
            self.stats.fragment_errors += 1;
        }
        self.drain_rtx(transport, now_ms);
        self.drain_events(transport, now_ms);
    }

    fn handle_frame(&mut self, transport: &mut impl Transport, now_ms: u64) {
        let frame = self.recv.take_frame();
        let header = frame.header;
        self.stats.frames_rx += 1;
        log::trace!(
            "frame accepted seq={} chan={} opcode={:#04x} len={}",
            header.seq,
            header.channel,
            header.opcode,
            header.length
        );

        if header.flags.contains(FrameFlags::ACK) || header.flags.contains(FrameFlags::NAK) {
            self.rtx.acknowledge(header.seq);
            return;
        }

        let is_rtx = header.flags.contains(FrameFlags::RTX);
        if self.config.caps.seq && !is_rtx {
            match self.seq.accept_rx(header.seq) {
                RxOutcome::InOrder => {}
                RxOutcome::Duplicate => {
                    // Re-ACK without redispatch: the peer didn't see our
                    // last ACK and retried the identical frame.
                    log::debug!("duplicate seq {} on channel {}, re-acking", header.seq, header.channel);
                    self.reply(transport, &header, Status::Success, &[], false, now_ms);
                    return;
                }
                RxOutcome::OutOfSequence => {
                    log::warn!(
                        "sequence error on channel {}: got seq {}, expected {:?}",
                        header.channel,
                        header.seq,
                        self.seq.last_rx().map(|s| s.wrapping_add(1))
                    );
                    self.stats.sequence_errors += 1;
                    self.reply(transport, &header, Status::Sequence, &[], false, now_ms);
                    return;
                }
            }
        }

        let fragment_more = header.flags.contains(FrameFlags::FRAGMENT);
        let payload: alloc::vec::Vec<u8> = if fragment_more || self.reasm.is_active() {
            let is_first = !self.reasm.is_active();
            match self.reasm.push(header.channel, header.opcode, frame.payload, is_first, now_ms) {
                Ok(()) => {
                    if fragment_more {
                        // More fragments still to come; nothing to
                        // dispatch yet.
                        return;
                    }
                    alloc::vec::Vec::from(self.reasm.take())
                }
                Err(_) => {
                    self.stats.fragment_errors += 1;
                    self.reasm.reset();
                    self.reply(transport, &header, Status::Fragment, &[], false, now_ms);
                    return;
                }
            }
        } else {
            alloc::vec::Vec::from(frame.payload)
        };

        let ack_req = header.flags.contains(FrameFlags::ACK_REQ);
        if opcode::is_no_response(header.opcode) {
            self.run_side_effects(header.opcode, transport.ready());
            return;
        }

        let result = self.dispatch(&header, &payload);
        // Copy the response out of `resp_buf` first: `reply` needs
        // `&mut self` for its own transmit path, which would otherwise
        // conflict with holding a borrow of `self.resp_buf` across the
        // call.
        let mut body_buf = [0u8; REASM_CAP];
        let body_len = if result.has_body && result.status == Status::Success {
            result.len
        } else {
            0
        };
        body_buf[..body_len].copy_from_slice(&self.resp_buf[..body_len]);
        self.reply(transport, &header, result.status, &body_buf[..body_len], ack_req, now_ms);
    }

    /// Schedules the side effect for a no-response system command. A
    /// `SYS_RESET` additionally queues a `SOFT_REBOOT` system event
    /// ahead of the reset itself, per the soft-reboot sequence in
    /// spec.md §5: the embedder drains this event (and any reply
    /// traffic still in flight) via the normal `poll()` event path
    /// before acting on [`Engine::take_side_effect`].
    fn run_side_effects(&mut self, opcode: u8, transport_ready: bool) {
        match opcode {
            self::opcode::SYS_RESET => {
                self.queue_system_event(system_event::SOFT_REBOOT, &[], transport_ready);
                self.pending_effect = Some(SideEffect::Reset);
            }
            self::opcode::SYS_BOOT => self.pending_effect = Some(SideEffect::Boot),
            _ => {}
        }
    }

    /// Builds and sends the response to a dispatched command. Bodied
    /// (`Status::Success` with `body` non-empty) replies carry `body`
    /// verbatim with `ACK` set; everything else carries a 2-byte status
    /// code with `ACK` (success, no body) or `NAK` (failure).
    fn reply(
        &mut self,
        transport: &mut impl Transport,
        request: &Header,
        status: Status,
        body: &[u8],
        _request_ack_req: bool,
        now_ms: u64,
    ) {
        let mut status_buf = [0u8; 2];
        let (flags, payload): (FrameFlags, &[u8]) = if status == Status::Success {
            if body.is_empty() {
                status_buf = (status.as_u8() as u16).to_le_bytes();
                (FrameFlags::ACK, &status_buf[..])
            } else {
                (FrameFlags::ACK, body)
            }
        } else {
            status_buf = (status.as_u8() as u16).to_le_bytes();
            (FrameFlags::NAK, &status_buf[..])
        };

        // Responses are themselves the acknowledgment: never ACK_REQ,
        // never queued for retransmission.
        self.send_fragmented(transport, request.channel, request.opcode, flags, payload, false, now_ms);
    }

    /// Sends an application/command frame originated by this side
    /// (rather than a reply to an inbound frame) — the path tests
    /// exercise directly for RTX-bound and fragmentation-round-trip
    /// properties.
    pub fn send_command(
        &mut self,
        transport: &mut impl Transport,
        channel: u8,
        opcode: u8,
        payload: &[u8],
        ack_req: bool,
        now_ms: u64,
    ) {
        let flags = if ack_req { FrameFlags::ACK_REQ } else { FrameFlags::NONE };
        self.send_fragmented(transport, channel, opcode, flags, payload, ack_req, now_ms);
    }

    fn send_fragmented(
        &mut self,
        transport: &mut impl Transport,
        channel: u8,
        opcode: u8,
        base_flags: FrameFlags,
        payload: &[u8],
        ack_req: bool,
        now_ms: u64,
    ) {
        let max_payload = self.config.caps.max_payload as usize;
        let total = fragment_count(payload, max_payload);
        for index in 0..total {
            let chunk = fragment_data(payload, index, max_payload).unwrap_or(&[]);
            let mut flags = base_flags;
            if index + 1 < total {
                flags = flags.insert(FrameFlags::FRAGMENT);
            }
            let seq = self.seq.next_tx();
            self.emit_one(transport, seq, channel, opcode, flags, chunk, ack_req, now_ms);
        }
    }

    fn emit_one(
        &mut self,
        transport: &mut impl Transport,
        seq: u8,
        channel: u8,
        opcode: u8,
        flags: FrameFlags,
        payload: &[u8],
        ack_req: bool,
        now_ms: u64,
    ) {
        let header = Header { seq, channel, flags, opcode, length: payload.len() as u16 };
        let mut header_buf = [0u8; crate::config::HEADER_SIZE];
        header.encode(&mut header_buf);
        let crc_buf = if payload.is_empty() { None } else { Some(Frame::payload_crc(payload)) };

        let status = self.transmit_raw(transport, &header_buf, payload, crc_buf.as_ref());
        self.stats.frames_tx += 1;
        if status != Status::Success {
            self.stats.transport_errors += 1;
        }

        if ack_req {
            let mut frame_buf = [0u8; FRAME_CAP];
            let mut pos = 0;
            frame_buf[pos..pos + header_buf.len()].copy_from_slice(&header_buf);
            pos += header_buf.len();
            frame_buf[pos..pos + payload.len()].copy_from_slice(payload);
            pos += payload.len();
            if let Some(crc) = crc_buf {
                frame_buf[pos..pos + crc.len()].copy_from_slice(&crc);
                pos += crc.len();
            }
            if self.rtx.enqueue(seq, &frame_buf[..pos], now_ms).is_err() {
                self.stats.transport_errors += 1;
            } else {
                let depth = self.rtx.high_water_mark() as u32;
                if depth > self.stats.max_ack_queue_depth {
                    self.stats.max_ack_queue_depth = depth;
                }
            }
        }
    }

    /// Emits a frame as three separate transport writes (header,
    /// payload, data-CRC), the zero-copy transmit contract: the
    /// caller's payload slice is written directly, never copied into an
    /// intermediate combined buffer.
    fn transmit_raw(
        &mut self,
        transport: &mut impl Transport,
        header: &[u8],
        payload: &[u8],
        crc: Option<&[u8; CRC32_SIZE]>,
    ) -> Status {
        let status = transport.write_all(header);
        if status != Status::Success {
            return status;
        }
        if payload.is_empty() {
            return Status::Success;
        }
        let status = transport.write_all(payload);
        if status != Status::Success {
            return status;
        }
        match crc {
            Some(crc) => transport.write_all(crc),
            None => Status::Success,
        }
    }

    fn drain_rtx(&mut self, transport: &mut impl Transport, now_ms: u64) {
        let mut retransmits: alloc::vec::Vec<(u8, alloc::vec::Vec<u8>)> = alloc::vec::Vec::new();
        let mut exhausted = 0u32;
        self.rtx.check_timeouts(now_ms, |event| match event {
            RtxEvent::Retransmit { seq, frame } => {
                log::debug!("retransmit scheduled for seq {seq}");
                retransmits.push((seq, alloc::vec::Vec::from(frame)));
            }
            RtxEvent::Exhausted { seq } => {
                log::warn!("rtx exhausted for seq {seq}, dropping");
                exhausted += 1;
            }
        });
        self.stats.transport_errors += exhausted;
        self.stats.retransmits += retransmits.len() as u32;

        for (_seq, frame) in retransmits {
            // Mark RTX on byte 4 (FLAGS) of the stored header before
            // resending verbatim.
            let mut frame = frame;
            let flags = FrameFlags::from_bits(frame[4]).insert(FrameFlags::RTX);
            frame[4] = flags.bits();
            let header_len = crate::config::HEADER_SIZE;
            let crc_len = if frame.len() > header_len { CRC32_SIZE } else { 0 };
            let payload_len = frame.len() - header_len - crc_len;
            let (header_bytes, rest) = frame.split_at(header_len);
            let (payload_bytes, crc_bytes) = rest.split_at(payload_len);
            self.stats.frames_tx += 1;
            let status = self.transmit_raw(transport, header_bytes, payload_bytes, crc_bytes.try_into().ok().as_ref());
            if status != Status::Success {
                self.stats.transport_errors += 1;
            }
        }
    }

    fn drain_events(&mut self, transport: &mut impl Transport, now_ms: u64) {
        while let Some(event) = self.events.pop() {
            let mut data = [0u8; 32];
            let len = event.encode(&mut data);
            let seq = self.seq.next_tx();
            self.emit_one(transport, seq, event.channel, event.opcode, FrameFlags::EVENT, &data[..len], false, now_ms);
        }
    }

    /// Routes one fully-reassembled command to its handler, writing any
    /// response body into `resp_buf`.
    fn dispatch(&mut self, header: &Header, payload: &[u8]) -> HandlerResult {
        match header.opcode {
            opcode::PROTO_SYNC => {
                self.seq.reset();
                self.rtx.reset();
                self.reasm.reset();
                HandlerResult::status_only(Status::Success)
            }
            opcode::PROTO_GET_CAPS => {
                let mut out = [0u8; crate::config::Caps::WIRE_SIZE];
                self.config.caps.encode(&mut out);
                self.resp_buf[..out.len()].copy_from_slice(&out);
                HandlerResult::body(out.len())
            }
            opcode::PROTO_SET_CAPS => {
                if payload.len() < crate::config::Caps::WIRE_SIZE {
                    return HandlerResult::status_only(Status::Invalid);
                }
                let mut buf = [0u8; crate::config::Caps::WIRE_SIZE];
                buf.copy_from_slice(&payload[..crate::config::Caps::WIRE_SIZE]);
                let mut caps = crate::config::Caps::decode(&buf);
                caps.max_payload = caps
                    .max_payload
                    .clamp(crate::config::MIN_PAYLOAD, crate::config::MAX_PAYLOAD.min(MAX_PAYLOAD as u16));
                self.config.caps = caps;
                let mut out = [0u8; crate::config::Caps::WIRE_SIZE];
                caps.encode(&mut out);
                self.resp_buf[..out.len()].copy_from_slice(&out);
                HandlerResult::body(out.len())
            }
            opcode::PROTO_STATS => {
                let snapshot = self.stats.snapshot();
                self.resp_buf[..snapshot.len()].copy_from_slice(&snapshot);
                HandlerResult::body(snapshot.len())
            }
            opcode::SYS_INFO => {
                let mut out = [0u8; SysInfo::WIRE_SIZE];
                self.sys_info.encode(&mut out);
                self.resp_buf[..out.len()].copy_from_slice(&out);
                HandlerResult::body(out.len())
            }
            opcode::CHANNEL_LIST => {
                let mut n = 0;
                for info in self.registry.list() {
                    if n + crate::channel::ChannelInfo::WIRE_SIZE > self.resp_buf.len() {
                        break;
                    }
                    let mut rec = [0u8; crate::channel::ChannelInfo::WIRE_SIZE];
                    info.encode(&mut rec);
                    self.resp_buf[n..n + rec.len()].copy_from_slice(&rec);
                    n += rec.len();
                }
                HandlerResult::body(n)
            }
            opcode::CHANNEL_POLL => {
                let bitmap = encode_poll_bitmap(|ch| {
                    self.registry
                        .get_mut(ch)
                        .map(|c| c.available() > 0)
                        .unwrap_or(false)
                });
                self.resp_buf[..bitmap.len()].copy_from_slice(&bitmap);
                HandlerResult::body(bitmap.len())
            }
            opcode::CHANNEL_LOCK => {
                match self.registry.lock(header.channel, self.config.peer_id) {
                    Ok(status) => HandlerResult::status_only(status.into()),
                    Err(_) => HandlerResult::status_only(Status::Invalid),
                }
            }
            opcode::CHANNEL_UNLOCK => {
                match self.registry.unlock(header.channel, self.config.peer_id) {
                    Ok(status) => HandlerResult::status_only(status.into()),
                    Err(_) => HandlerResult::status_only(Status::Invalid),
                }
            }
            opcode::CHANNEL_SHAPE => {
                let Some(channel) = self.registry.get_mut(header.channel) else {
                    return HandlerResult::status_only(Status::Invalid);
                };
                let shape = channel.shape();
                let mut out = [0u8; 16];
                for (i, dim) in shape.iter().enumerate() {
                    out[i * 4..i * 4 + 4].copy_from_slice(&dim.to_le_bytes());
                }
                self.resp_buf[..out.len()].copy_from_slice(&out);
                HandlerResult::body(out.len())
            }
            opcode::CHANNEL_SIZE => {
                let Some(channel) = self.registry.get_mut(header.channel) else {
                    return HandlerResult::status_only(Status::Invalid);
                };
                let available = channel.available();
                self.resp_buf[..4].copy_from_slice(&available.to_le_bytes());
                HandlerResult::body(4)
            }
            opcode::CHANNEL_READ => self.handle_channel_read(header.channel, payload),
            opcode::CHANNEL_WRITE => self.handle_channel_write(header.channel, payload),
            opcode::CHANNEL_IOCTL => self.handle_channel_ioctl(header.channel, payload),
            _ => HandlerResult::status_only(Status::Unknown),
        }
    }

    fn handle_channel_read(&mut self, channel_id: u8, payload: &[u8]) -> HandlerResult {
        if payload.len() < 8 {
            return HandlerResult::status_only(Status::Invalid);
        }
        if !self.registry.may_access(channel_id, self.config.peer_id) {
            return HandlerResult::status_only(Status::Busy);
        }
        let offset = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        let len = u32::from_le_bytes(payload[4..8].try_into().unwrap()) as usize;
        let len = len.min(self.resp_buf.len());

        let Some(channel) = self.registry.get_mut(channel_id) else {
            return HandlerResult::status_only(Status::Invalid);
        };

        match channel.readp(offset, len as u32) {
            Ok(data) => {
                let n = data.len().min(self.resp_buf.len());
                self.resp_buf[..n].copy_from_slice(&data[..n]);
                HandlerResult::body(n)
            }
            Err(ChannelStatus::Invalid) => match channel.read(offset, &mut self.resp_buf[..len]) {
                Ok(n) => HandlerResult::body(n),
                Err(status) => HandlerResult::status_only(status.into()),
            },
            Err(status) => HandlerResult::status_only(status.into()),
        }
    }

    fn handle_channel_write(&mut self, channel_id: u8, payload: &[u8]) -> HandlerResult {
        if payload.len() < 8 {
            return HandlerResult::status_only(Status::Invalid);
        }
        if !self.registry.may_access(channel_id, self.config.peer_id) {
            return HandlerResult::status_only(Status::Busy);
        }
        let offset = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        let data = &payload[8..];
        match self.registry.get_mut(channel_id) {
            Some(channel) => HandlerResult::status_only(channel.write(offset, data).into()),
            None => HandlerResult::status_only(Status::Invalid),
        }
    }

    fn handle_channel_ioctl(&mut self, channel_id: u8, payload: &[u8]) -> HandlerResult {
        if payload.len() < 4 {
            return HandlerResult::status_only(Status::Invalid);
        }
        let request = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        match self.registry.get_mut(channel_id) {
            Some(channel) => HandlerResult::status_only(channel.ioctl(request, &payload[4..]).into()),
            None => HandlerResult::status_only(Status::Invalid),
        }
    }
}
