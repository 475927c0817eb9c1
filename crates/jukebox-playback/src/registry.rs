//! Room-to-orchestrator bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;

use jukebox_core::Config;
use jukebox_resolver::Resolver;
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::PlaybackError;
use crate::orchestrator::Orchestrator;
use crate::voice::{RoomId, VoiceChannel, VoiceGateway};

type Rooms = Mutex<HashMap<RoomId, Orchestrator>>;

/// At most one live orchestrator per room. Destroyed orchestrators remove
/// themselves.
pub struct Registry {
    rooms: Arc<Rooms>,
    gateway: Arc<dyn VoiceGateway>,
    resolver: Arc<Resolver>,
    config: Config,
}

impl Registry {
    pub fn new(gateway: Arc<dyn VoiceGateway>, resolver: Arc<Resolver>, config: Config) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            gateway,
            resolver,
            config,
        }
    }

    pub fn get(&self, room_id: RoomId) -> Option<Orchestrator> {
        self.rooms.lock().get(&room_id).cloned()
    }

    /// The room's orchestrator, created for `channel` if the room has none.
    pub fn get_or_create(&self, channel: &VoiceChannel) -> Result<Orchestrator, PlaybackError> {
        let mut rooms = self.rooms.lock();
        if let Some(existing) = rooms.get(&channel.room_id) {
            if !existing.is_destroyed() {
                return Ok(existing.clone());
            }
        }
        if !channel.joinable {
            return Err(PlaybackError::ChannelNotJoinable(channel.id));
        }

        let orchestrator = Orchestrator::new(
            channel.room_id,
            self.gateway.clone(),
            self.resolver.clone(),
            self.config.clone(),
        );
        let weak = Arc::downgrade(&self.rooms);
        orchestrator.set_destroy_hook(Box::new(move |room_id, id| {
            if let Some(rooms) = weak.upgrade() {
                forget(&rooms, room_id, id);
            }
        }));
        rooms.insert(channel.room_id, orchestrator.clone());
        info!(room = channel.room_id, id = %orchestrator.id(), "Registered room");
        Ok(orchestrator)
    }

    /// Drop the entry for `room_id` if it still belongs to instance `id`.
    pub fn forget(&self, room_id: RoomId, id: Uuid) -> bool {
        forget(&self.rooms, room_id, id)
    }

    /// Destroy the room's orchestrator. Returns false when there was none.
    pub fn destroy(&self, room_id: RoomId) -> bool {
        match self.get(room_id) {
            Some(orchestrator) => {
                orchestrator.destroy();
                true
            }
            None => false,
        }
    }

    pub fn destroy_all(&self) {
        let all: Vec<Orchestrator> = self.rooms.lock().values().cloned().collect();
        for orchestrator in all {
            orchestrator.destroy();
        }
    }

    pub fn rooms(&self) -> Vec<RoomId> {
        self.rooms.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.lock().is_empty()
    }
}

fn forget(rooms: &Rooms, room_id: RoomId, id: Uuid) -> bool {
    let mut rooms = rooms.lock();
    match rooms.get(&room_id) {
        Some(current) if current.id() == id => {
            rooms.remove(&room_id);
            debug!(room = room_id, %id, "Forgot room");
            true
        }
        _ => false,
    }
}
