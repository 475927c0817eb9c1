//! Voice transport seam.
//!
//! The orchestrator drives connections and players through these traits and
//! never talks to a concrete transport.

use std::sync::Arc;

use async_trait::async_trait;
use jukebox_core::AudioResource;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

pub type RoomId = u64;
pub type ChannelId = u64;
pub type ListenerId = u64;

/// A voice channel a room can play into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceChannel {
    pub id: ChannelId,
    pub room_id: RoomId,
    pub name: String,
    /// Whether the transport is allowed to connect here.
    pub joinable: bool,
}

/// A fault reported by the voice transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Playing,
    /// `automatic` is set when the transport paused on its own, e.g. because
    /// nobody is listening.
    Paused { automatic: bool },
    /// The current resource finished or was stopped.
    Idle,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Disconnected,
    Error(String),
}

/// A registered event listener. Events stop once it is unregistered.
pub struct Listener<E> {
    pub id: ListenerId,
    pub events: mpsc::UnboundedReceiver<E>,
}

#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Join `channel`, resolving once the connection is ready.
    async fn connect(&self, channel: &VoiceChannel) -> Result<Arc<dyn VoiceConnection>, TransportError>;

    fn create_player(&self) -> Arc<dyn AudioPlayer>;
}

pub trait VoiceConnection: Send + Sync {
    /// Route `player`'s output into this connection.
    fn subscribe(&self, player: &Arc<dyn AudioPlayer>) -> Result<(), TransportError>;

    fn listen(&self) -> Listener<ConnectionEvent>;

    fn unlisten(&self, id: ListenerId);

    fn destroy(&self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Start playing `resource`, resolving once the player reports playback.
    async fn play(&self, resource: Arc<AudioResource>) -> Result<(), TransportError>;

    /// Returns false when there is nothing to pause.
    fn pause(&self) -> bool;

    fn unpause(&self) -> bool;

    fn stop(&self);

    fn listen(&self) -> Listener<PlayerEvent>;

    fn unlisten(&self, id: ListenerId);
}
