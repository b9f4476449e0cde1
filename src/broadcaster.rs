//! Room membership and fan-out
//!
//! A room is the set of live channels that joined one session code. Each
//! channel owns a bounded queue and a single channel sees events in emission
//! order. Delivery never blocks the caller: a channel whose queue is full is
//! evicted from the broadcaster, so its receiver drains what is buffered and
//! then reports the channel closed. Nothing is buffered for channels that
//! join later.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::schema::{normalize_code, Feedback};

/// Events a channel may have queued before it counts as a slow consumer
pub const CHANNEL_CAPACITY: usize = 256;

/// Identifier of one connected channel
pub type ChannelId = u64;

/// Event delivered to every member of a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RoomEvent {
    FeedbackReceived { feedback: Feedback },
    SessionClosed { code: String },
}

impl RoomEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FeedbackReceived { .. } => "feedback_received",
            Self::SessionClosed { .. } => "session_closed",
        }
    }
}

/// Registered channel, handed out by [`RoomBroadcaster::open_channel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHandle {
    id: ChannelId,
}

impl ChannelHandle {
    pub fn id(&self) -> ChannelId {
        self.id
    }
}

#[derive(Default)]
struct Registry {
    /// The only long-lived senders; dropping one closes its receiver
    channels: HashMap<ChannelId, mpsc::Sender<RoomEvent>>,
    rooms: HashMap<String, HashMap<ChannelId, mpsc::Sender<RoomEvent>>>,
}

impl Registry {
    fn remove_channel(&mut self, id: ChannelId) -> bool {
        self.rooms.retain(|_, room| {
            room.remove(&id);
            !room.is_empty()
        });
        self.channels.remove(&id).is_some()
    }
}

/// Mapping from session code to the channels joined to it
pub struct RoomBroadcaster {
    registry: RwLock<Registry>,
    next_id: AtomicU64,
}

impl RoomBroadcaster {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a channel; the receiver yields every event for rooms it joins
    pub fn open_channel(&self) -> (ChannelHandle, mpsc::Receiver<RoomEvent>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.write().channels.insert(id, tx);
        (ChannelHandle { id }, rx)
    }

    /// Add a channel to a room. Memberships accumulate across codes.
    ///
    /// Returns false if the channel was already evicted or closed.
    pub fn join(&self, channel: &ChannelHandle, code: &str) -> bool {
        let code = normalize_code(code);
        let mut registry = self.registry.write();
        let Some(tx) = registry.channels.get(&channel.id).cloned() else {
            tracing::debug!("Channel {} is gone, not joining {}", channel.id, code);
            return false;
        };
        registry
            .rooms
            .entry(code.clone())
            .or_default()
            .insert(channel.id, tx);
        tracing::debug!("Channel {} joined room {}", channel.id, code);
        true
    }

    /// Remove a channel from a single room
    pub fn leave_room(&self, channel_id: ChannelId, code: &str) {
        let code = normalize_code(code);
        let mut registry = self.registry.write();
        if let Some(room) = registry.rooms.get_mut(&code) {
            room.remove(&channel_id);
            if room.is_empty() {
                registry.rooms.remove(&code);
            }
        }
    }

    /// Remove a channel from every room and forget it (disconnect)
    pub fn leave(&self, channel_id: ChannelId) {
        self.registry.write().remove_channel(channel_id);
    }

    /// Deliver an event to every member of `code`. Returns how many channels
    /// accepted it. Channels whose receiver is gone are pruned and channels
    /// with a full queue are evicted.
    pub fn broadcast(&self, code: &str, event: RoomEvent) -> usize {
        let code = normalize_code(code);
        let mut delivered = 0;
        let mut dead = Vec::new();
        let mut slow = Vec::new();

        {
            let registry = self.registry.read();
            let Some(room) = registry.rooms.get(&code) else {
                tracing::debug!("No listeners in room {}, dropping {}", code, event.name());
                return 0;
            };
            for (id, tx) in room {
                match tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => slow.push(*id),
                    Err(TrySendError::Closed(_)) => dead.push(*id),
                }
            }
        }

        if !dead.is_empty() || !slow.is_empty() {
            let mut registry = self.registry.write();
            for id in dead {
                registry.remove_channel(id);
            }
            for id in slow {
                if registry.remove_channel(id) {
                    tracing::warn!(
                        "Channel {} fell {} events behind in room {}, evicting",
                        id,
                        CHANNEL_CAPACITY,
                        code
                    );
                }
            }
        }

        tracing::debug!("Sent {} to {} channels in room {}", event.name(), delivered, code);
        delivered
    }

    /// Number of channels currently joined to `code`
    pub fn room_size(&self, code: &str) -> usize {
        self.registry
            .read()
            .rooms
            .get(&normalize_code(code))
            .map(|room| room.len())
            .unwrap_or(0)
    }

    /// Number of rooms with at least one member
    pub fn room_count(&self) -> usize {
        self.registry.read().rooms.len()
    }

    /// Number of open channels, joined or not
    pub fn channel_count(&self) -> usize {
        self.registry.read().channels.len()
    }
}

impl Default for RoomBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
