//! Asynchronous event emission.
//!
//! System events (opcode 0x13, channel 0) and channel events (opcode
//! 0x29, source channel) are queued here rather than written directly,
//! so an interrupt-context producer (a channel's own ISR-driven state
//! change) never has to take the engine's dispatch path. Built on
//! `heapless::spsc::Queue`, the standard no_std idiom for exactly this
//! single-producer/single-consumer split.

use heapless::spsc::Queue;

/// Maximum payload carried by one queued event: a 4-byte event code
/// plus up to 12 bytes of channel-defined data.
pub const MAX_EVENT_DATA: usize = 12;

/// One queued outbound event.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    /// Channel 0 for system events, the source channel for channel
    /// events.
    pub channel: u8,
    /// 0x13 for system events, 0x29 for channel events.
    pub opcode: u8,
    pub code: u32,
    pub data: [u8; MAX_EVENT_DATA],
    pub data_len: usize,
}

impl Event {
    pub fn system(code: u32, data: &[u8]) -> Self {
        Self::new(0, 0x13, code, data)
    }

    pub fn channel(channel: u8, code: u32, data: &[u8]) -> Self {
        Self::new(channel, 0x29, code, data)
    }

    fn new(channel: u8, opcode: u8, code: u32, data: &[u8]) -> Self {
        let mut buf = [0u8; MAX_EVENT_DATA];
        let len = data.len().min(MAX_EVENT_DATA);
        buf[..len].copy_from_slice(&data[..len]);
        Self {
            channel,
            opcode,
            code,
            data: buf,
            data_len: len,
        }
    }

    /// Encodes the event payload: 4-byte little-endian code followed
    /// by the channel-defined data.
    pub fn encode(&self, out: &mut [u8]) -> usize {
        let total = 4 + self.data_len;
        if out.len() < total {
            return 0;
        }
        out[0..4].copy_from_slice(&self.code.to_le_bytes());
        out[4..total].copy_from_slice(&self.data[..self.data_len]);
        total
    }
}

/// Bounded SPSC event queue, gated on capability/readiness/headroom
/// at the emission call site rather than inside the queue itself.
///
/// `N` is the `Queue` const generic, not the usable depth:
/// `heapless::spsc::Queue<T, N>` reserves one slot to disambiguate full
/// from empty in its lock-free ring, so this emitter only ever holds
/// `N - 1` events at once. Size `N` one larger than the depth you
/// actually want (an `EVENT_CAP` of 8 on [`crate::engine::Engine`]
/// gives 7 usable slots) — see [`EventEmitter::capacity`].
pub struct EventEmitter<const N: usize> {
    queue: Queue<Event, N>,
    dropped: u32,
}

impl<const N: usize> EventEmitter<N> {
    pub const fn new() -> Self {
        Self {
            queue: Queue::new(),
            dropped: 0,
        }
    }

    /// The number of events this emitter can actually hold at once
    /// (`N - 1`, per `heapless::spsc::Queue`'s reserved disambiguation
    /// slot).
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Attempts to queue an event for emission. `events_enabled`,
    /// `transport_ready`, and `has_headroom` (ack-queue headroom) gate
    /// whether the event is even attempted — dropped events never
    /// block the caller and are never retried.
    pub fn try_emit(
        &mut self,
        event: Event,
        events_enabled: bool,
        transport_ready: bool,
        has_headroom: bool,
    ) -> bool {
        if !events_enabled || !transport_ready || !has_headroom {
            self.dropped += 1;
            return false;
        }
        match self.queue.enqueue(event) {
            Ok(()) => true,
            Err(_) => {
                self.dropped += 1;
                false
            }
        }
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.queue.dequeue()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.len() == 0
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl<const N: usize> Default for EventEmitter<N> {
    fn default() -> Self {
        Self::new()
    }
}
