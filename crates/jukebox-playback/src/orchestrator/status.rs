//! Playback status and the resources each status instance owns.

use std::sync::Arc;
use std::time::Duration;

use jukebox_core::{Track, TrackSnapshot};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;

use crate::voice::{AudioPlayer, ListenerId, RoomId, VoiceChannel, VoiceConnection};

/// A joined voice channel with its player subscribed.
#[derive(Clone)]
pub(crate) struct Session {
    pub channel: VoiceChannel,
    pub connection: Arc<dyn VoiceConnection>,
    pub player: Arc<dyn AudioPlayer>,
}

impl Session {
    /// Stop playback and leave the channel. Transport failures are logged.
    pub fn close(&self, room_id: RoomId) {
        self.player.stop();
        if let Err(e) = self.connection.destroy() {
            warn!(room = room_id, channel = self.channel.id, error = %e, "Failed to leave voice channel");
        }
    }
}

/// Event listeners registered for one status instance.
///
/// Dropping it unregisters both listeners and stops the task forwarding
/// their events.
pub(crate) struct Watch {
    pub connection: Arc<dyn VoiceConnection>,
    pub player: Arc<dyn AudioPlayer>,
    pub connection_listener: ListenerId,
    pub player_listener: ListenerId,
    pub task: JoinHandle<()>,
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.connection.unlisten(self.connection_listener);
        self.player.unlisten(self.player_listener);
        self.task.abort();
    }
}

/// A scheduled callback, cancelled on drop.
pub(crate) struct Timer(pub JoinHandle<()>);

impl Drop for Timer {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A track interrupted by a pause, with the playback time it had reached.
pub(crate) struct Paused {
    pub track: Track,
    pub played: Duration,
}

pub(crate) enum Status {
    /// Not connected. Queued tracks survive until the clear timer fires.
    Inactive { clear_timer: Option<Timer> },
    /// Connected but not playing.
    Idle {
        session: Session,
        watch: Watch,
        leave_timer: Option<Timer>,
        last_played: Option<Paused>,
    },
    Active {
        session: Session,
        watch: Watch,
        playing: Track,
        playing_since: Instant,
    },
}

impl Status {
    pub const fn state(&self) -> PlaybackState {
        match self {
            Self::Inactive { .. } => PlaybackState::Inactive,
            Self::Idle { .. } => PlaybackState::Idle,
            Self::Active { .. } => PlaybackState::Active,
        }
    }

    pub const fn session(&self) -> Option<&Session> {
        match self {
            Self::Inactive { .. } => None,
            Self::Idle { session, .. } | Self::Active { session, .. } => Some(session),
        }
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        match self {
            Self::Inactive { .. } | Self::Idle { last_played: None, .. } => None,
            Self::Idle {
                last_played: Some(paused),
                ..
            } => Some(NowPlaying::new(&paused.track, paused.played, true)),
            Self::Active {
                playing,
                playing_since,
                ..
            } => Some(NowPlaying::new(playing, playing_since.elapsed(), false)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Inactive,
    Idle,
    Active,
}

/// The current or paused track with its playback position.
#[derive(Debug, Clone, Serialize)]
pub struct NowPlaying {
    pub track: TrackSnapshot,
    pub elapsed_secs: u64,
    /// `None` for tracks without a known length.
    pub remaining_secs: Option<u64>,
    pub paused: bool,
}

impl NowPlaying {
    fn new(track: &Track, elapsed: Duration, paused: bool) -> Self {
        let elapsed_secs = elapsed.as_secs();
        let length = track.info.duration.as_seconds();
        Self {
            track: track.snapshot(),
            elapsed_secs,
            remaining_secs: (length > 0).then(|| length.saturating_sub(elapsed_secs)),
            paused,
        }
    }
}

/// Serializable view of a room's playback.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub room_id: RoomId,
    pub state: PlaybackState,
    pub channel: Option<VoiceChannel>,
    pub now_playing: Option<NowPlaying>,
    pub queue_len: usize,
    pub queue_duration_secs: u64,
}
