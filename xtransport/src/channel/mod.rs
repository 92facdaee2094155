//! Channel registry: up to 32 ID-addressed device endpoints.
//!
//! Models an ID-addressed registry of heterogeneous device endpoints
//! (a sensor stream, a config blob, a physical UART passthrough...).
//! Each entry holds a `dyn Trait` object in a fixed-size array, the
//! same const-generic-array idiom used for fixed collections of
//! entries elsewhere (also used by `rtx::RtxQueue`'s entry array).

use crate::error::{Error, Result, Status};

/// Maximum number of simultaneously registered channels.
pub const MAX_CHANNELS: usize = 32;

/// Channel capability bits, carried in the registry entry's `flags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelFlags(u8);

impl ChannelFlags {
    pub const NONE: Self = Self(0);
    pub const READ: Self = Self(1 << 0);
    pub const WRITE: Self = Self(1 << 1);
    pub const LOCK: Self = Self(1 << 2);
    pub const DYNAMIC: Self = Self(1 << 3);
    pub const PHYSICAL: Self = Self(1 << 4);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Status returned by most [`Channel`] operations — a channel-local
/// counterpart of the wire [`crate::error::Status`] taxonomy, since a
/// handler's own "unsupported"/"busy" outcome is not itself an engine
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Success,
    Invalid,
    Busy,
    Overflow,
}

/// A channel endpoint's behavior. Unsupported operations return
/// [`ChannelStatus::Invalid`] rather than panicking — most channels
/// only implement a subset of this surface.
pub trait Channel {
    fn init(&mut self) -> ChannelStatus {
        ChannelStatus::Success
    }

    /// Copies up to `out.len()` bytes starting at `offset` into `out`,
    /// returning the number actually copied.
    fn read(&mut self, _offset: u32, _out: &mut [u8]) -> core::result::Result<usize, ChannelStatus> {
        Err(ChannelStatus::Invalid)
    }

    /// Zero-copy read: borrows up to `len` bytes starting at `offset`
    /// directly out of the channel's own backing storage.
    fn readp(&mut self, _offset: u32, _len: u32) -> core::result::Result<&[u8], ChannelStatus> {
        Err(ChannelStatus::Invalid)
    }

    fn write(&mut self, _offset: u32, _bytes: &[u8]) -> ChannelStatus {
        ChannelStatus::Invalid
    }

    fn flush(&mut self) -> ChannelStatus {
        ChannelStatus::Success
    }

    fn available(&self) -> u32 {
        0
    }

    /// Up to 4 dimensions describing the channel's shape (e.g. image
    /// width/height/channels/bit-depth); trailing entries are zero for
    /// channels with fewer dimensions.
    fn shape(&self) -> [u32; 4] {
        [0; 4]
    }

    fn ioctl(&mut self, _request: u32, _bytes: &[u8]) -> ChannelStatus {
        ChannelStatus::Invalid
    }
}

/// One registry slot: identity, capability flags, display name, and
/// the single-owner lock state for channels with `LOCK` set.
struct Entry {
    id: u8,
    flags: ChannelFlags,
    name: [u8; 14],
    channel: Option<alloc::boxed::Box<dyn Channel>>,
    owner: Option<u32>,
    in_use: bool,
}

impl Entry {
    const fn empty() -> Self {
        Self {
            id: 0,
            flags: ChannelFlags::NONE,
            name: [0u8; 14],
            channel: None,
            owner: None,
            in_use: false,
        }
    }
}

/// Snapshot of one channel's identity, for `CHANNEL_LIST` replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: u8,
    pub flags: u8,
    pub name: [u8; 14],
}

impl ChannelInfo {
    pub const WIRE_SIZE: usize = 16;

    pub fn encode(&self, out: &mut [u8; Self::WIRE_SIZE]) {
        out[0] = self.id;
        out[1] = self.flags;
        out[2..16].copy_from_slice(&self.name);
    }
}

/// Fixed-capacity registry of up to [`MAX_CHANNELS`] channels, ID 0
/// always reserved for the transport/protocol response route.
pub struct Registry {
    entries: [Entry; MAX_CHANNELS],
}

impl Registry {
    pub fn new() -> Self {
        let mut entries = [(); MAX_CHANNELS].map(|_| Entry::empty());
        entries[0] = Entry {
            id: 0,
            flags: ChannelFlags::PHYSICAL,
            name: *b"protocol\0\0\0\0\0\0",
            channel: None,
            owner: None,
            in_use: true,
        };
        Self { entries }
    }

    /// Registers a channel at a caller-supplied ID, or the lowest free
    /// slot in `1..MAX_CHANNELS` when `id` is `None`.
    pub fn register(
        &mut self,
        id: Option<u8>,
        flags: ChannelFlags,
        name: [u8; 14],
        channel: alloc::boxed::Box<dyn Channel>,
    ) -> Result<u8> {
        let slot = match id {
            Some(id) => {
                let idx = id as usize;
                if idx == 0 || idx >= MAX_CHANNELS {
                    return Err(Error::UnknownChannel);
                }
                if self.entries[idx].in_use {
                    return Err(Error::ChannelCapability);
                }
                idx
            }
            None => self
                .entries
                .iter()
                .enumerate()
                .skip(1)
                .find(|(_, e)| !e.in_use)
                .map(|(idx, _)| idx)
                .ok_or(Error::QueueFull)?,
        };

        self.entries[slot] = Entry {
            id: slot as u8,
            flags,
            name,
            channel: Some(channel),
            owner: None,
            in_use: true,
        };
        log::debug!("channel {slot} registered (flags={:#04x})", flags.bits());
        Ok(slot as u8)
    }

    pub fn unregister(&mut self, id: u8) -> Result<()> {
        let idx = id as usize;
        if idx == 0 || idx >= MAX_CHANNELS || !self.entries[idx].in_use {
            return Err(Error::UnknownChannel);
        }
        self.entries[idx] = Entry::empty();
        log::debug!("channel {idx} unregistered");
        Ok(())
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut (dyn Channel + 'static)> {
        let idx = id as usize;
        if idx >= MAX_CHANNELS || !self.entries[idx].in_use {
            return None;
        }
        self.entries[idx].channel.as_deref_mut()
    }

    pub fn flags(&self, id: u8) -> Option<ChannelFlags> {
        let idx = id as usize;
        if idx >= MAX_CHANNELS || !self.entries[idx].in_use {
            return None;
        }
        Some(self.entries[idx].flags)
    }

    pub fn list(&self) -> impl Iterator<Item = ChannelInfo> + '_ {
        self.entries.iter().filter(|e| e.in_use).map(|e| ChannelInfo {
            id: e.id,
            flags: e.flags.bits(),
            name: e.name,
        })
    }

    /// Acquires the lock on a `LOCK`-flagged channel. Reentrant for the
    /// current owner; returns `Busy` if held by another caller.
    pub fn lock(&mut self, id: u8, caller: u32) -> Result<ChannelStatus> {
        let idx = id as usize;
        if idx >= MAX_CHANNELS || !self.entries[idx].in_use {
            return Err(Error::UnknownChannel);
        }
        let entry = &mut self.entries[idx];
        if !entry.flags.contains(ChannelFlags::LOCK) {
            return Ok(ChannelStatus::Invalid);
        }
        match entry.owner {
            None => {
                entry.owner = Some(caller);
                Ok(ChannelStatus::Success)
            }
            Some(owner) if owner == caller => Ok(ChannelStatus::Success),
            Some(_) => Ok(ChannelStatus::Busy),
        }
    }

    /// Releases the lock. Succeeds only if `caller` is the current
    /// owner, else `Invalid`.
    pub fn unlock(&mut self, id: u8, caller: u32) -> Result<ChannelStatus> {
        let idx = id as usize;
        if idx >= MAX_CHANNELS || !self.entries[idx].in_use {
            return Err(Error::UnknownChannel);
        }
        let entry = &mut self.entries[idx];
        match entry.owner {
            Some(owner) if owner == caller => {
                entry.owner = None;
                Ok(ChannelStatus::Success)
            }
            _ => Ok(ChannelStatus::Invalid),
        }
    }

    /// Whether `caller` may currently read/write a locked channel:
    /// true if the channel isn't lock-gated, unowned, or owned by
    /// `caller`.
    pub fn may_access(&self, id: u8, caller: u32) -> bool {
        let idx = id as usize;
        if idx >= MAX_CHANNELS || !self.entries[idx].in_use {
            return false;
        }
        let entry = &self.entries[idx];
        if !entry.flags.contains(ChannelFlags::LOCK) {
            return true;
        }
        matches!(entry.owner, None | Some(o) if o == caller)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ChannelStatus> for Status {
    fn from(status: ChannelStatus) -> Self {
        match status {
            ChannelStatus::Success => Status::Success,
            ChannelStatus::Invalid => Status::Invalid,
            ChannelStatus::Busy => Status::Busy,
            ChannelStatus::Overflow => Status::Overflow,
        }
    }
}
