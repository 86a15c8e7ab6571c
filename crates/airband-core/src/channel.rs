//! The in-process channel model.
//!
//! A [`Channel`] is a named frequency with a preferred gain; a
//! [`ChannelList`] owns the full set of known channels and a
//! [`ChannelBank`] is an ordered selection of channel ids to scan.
//! Nothing here is persisted -- state lives in-process and the caller
//! decides how (or whether) to store it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a channel for the lifetime of the process.
pub type ChannelId = u64;

/// Process-wide channel id allocator.
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// A named radio channel.
///
/// The `id` is allocated at construction and never changes; name,
/// frequency, gain, and tags are freely mutable.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    id: ChannelId,
    /// Human-readable channel name (e.g. "London FIS").
    pub name: String,
    /// Channel frequency in hertz.
    pub frequency_hz: u64,
    /// Preferred receiver gain when tuned to this channel.
    pub gain: u32,
    /// Free-form tags for grouping/filtering in a UI.
    pub tags: Vec<String>,
}

impl Channel {
    /// Create a channel with a fresh process-unique id.
    pub fn new(name: impl Into<String>, frequency_hz: u64, gain: u32) -> Self {
        Channel {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            frequency_hz,
            gain,
            tags: Vec::new(),
        }
    }

    /// Create a channel from a frequency in megahertz.
    ///
    /// Airband frequencies are conventionally written in MHz
    /// (e.g. 124.75); this converts to hertz with sub-kHz precision.
    pub fn from_mhz(name: impl Into<String>, freq_mhz: f64, gain: u32) -> Self {
        Self::new(name, (freq_mhz * 1e6).round() as u64, gain)
    }

    /// The process-unique channel id.
    pub fn id(&self) -> ChannelId {
        self.id
    }
}

/// The full set of known channels.
///
/// Ids are unique within the list: adding a channel whose id is already
/// present replaces the existing entry.
#[derive(Debug, Clone, Default)]
pub struct ChannelList {
    channels: Vec<Channel>,
}

impl ChannelList {
    /// Create an empty channel list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel, replacing any existing channel with the same id.
    pub fn add(&mut self, channel: Channel) {
        self.channels.retain(|ch| ch.id != channel.id);
        self.channels.push(channel);
    }

    /// Remove the channel with the given id, if present.
    pub fn delete(&mut self, id: ChannelId) {
        self.channels.retain(|ch| ch.id != id);
    }

    /// Replace the entire channel set.
    pub fn replace(&mut self, channels: Vec<Channel>) {
        self.channels = channels;
    }

    /// Look up a channel by id.
    pub fn get(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|ch| ch.id == id)
    }

    /// All channels, in insertion order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Number of channels in the list.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// An ordered selection of channel ids to scan.
///
/// Scan order is exactly the bank's insertion order. Ids are unique within
/// the bank; re-adding an existing id is a no-op.
#[derive(Debug, Clone, Default)]
pub struct ChannelBank {
    ids: Vec<ChannelId>,
}

impl ChannelBank {
    /// Create an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a channel id if it is not already in the bank.
    pub fn add(&mut self, id: ChannelId) {
        if !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    /// Remove a channel id, preserving the order of the rest.
    pub fn remove(&mut self, id: ChannelId) {
        self.ids.retain(|&i| i != id);
    }

    /// Whether the bank contains the given id.
    pub fn contains(&self, id: ChannelId) -> bool {
        self.ids.contains(&id)
    }

    /// The bank's ids in insertion order.
    pub fn ids(&self) -> &[ChannelId] {
        &self.ids
    }

    /// Number of ids in the bank.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the bank is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
