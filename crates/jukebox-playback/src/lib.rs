//! # jukebox-playback
//!
//! Per-room playback: joins a voice channel, feeds queued tracks to a player
//! and leaves again when the room goes quiet. The voice transport itself is
//! behind the traits in [`voice`].

pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod voice;

#[cfg(test)]
mod testing;

pub use error::PlaybackError;
pub use orchestrator::{AddOutcome, NowPlaying, Orchestrator, PlaybackState, StatusSnapshot};
pub use registry::Registry;
pub use voice::{
    AudioPlayer, ConnectionEvent, Listener, ListenerId, PlayerEvent, RoomId, TransportError,
    VoiceChannel, VoiceConnection, VoiceGateway,
};
