//! Playback command errors.

use jukebox_core::{QueueFull, TimedOut};
use jukebox_resolver::{ClassifyError, ItemFailure, ResolveError};
use thiserror::Error;

use crate::voice::{ChannelId, TransportError};

/// Why a playback command did not complete. Messages are shown to users.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Resolve(ResolveError),

    #[error(transparent)]
    Timeout(#[from] TimedOut),

    #[error("Voice transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("{0}")]
    InvalidState(&'static str),

    #[error("Another playback operation is in progress")]
    Busy,

    #[error("This player has been shut down")]
    Destroyed,

    #[error("Cannot join voice channel {0}")]
    ChannelNotJoinable(ChannelId),

    #[error("Nothing to play{}", first_reason(.errors))]
    NothingToPlay { errors: Vec<ItemFailure> },

    #[error(transparent)]
    QueueFull(#[from] QueueFull),

    #[error("Failed to prepare track: {0}")]
    Prepare(#[source] jukebox_core::Error),

    #[error("No track at position {0}")]
    NotFound(usize),
}

impl PlaybackError {
    /// Map a track preparation failure, keeping timeouts distinguishable.
    pub(crate) fn prepare(e: jukebox_core::Error) -> Self {
        match e {
            jukebox_core::Error::Timeout(timed_out) => Self::Timeout(timed_out),
            other => Self::Prepare(other),
        }
    }
}

impl From<ResolveError> for PlaybackError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Classify(c) => Self::Classify(c),
            fatal @ ResolveError::Fatal(_) => Self::Resolve(fatal),
        }
    }
}

fn first_reason(errors: &[ItemFailure]) -> String {
    errors
        .first()
        .map(|f| format!(": {}", f.error))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jukebox_core::Stage;
    use jukebox_resolver::ItemError;
    use std::time::Duration;

    #[test]
    fn test_nothing_to_play_mentions_first_reason() {
        let err = PlaybackError::NothingToPlay {
            errors: vec![
                ItemFailure::new("lofi", ItemError::NoResults),
                ItemFailure::new("x", ItemError::Private),
            ],
        };
        assert_eq!(err.to_string(), "Nothing to play: No results found");

        let bare = PlaybackError::NothingToPlay { errors: Vec::new() };
        assert_eq!(bare.to_string(), "Nothing to play");
    }

    #[test]
    fn test_prepare_timeout_is_a_timeout() {
        let timed_out = TimedOut {
            stage: Stage::PrepareResource,
            limit: Duration::from_secs(15),
        };
        let err = PlaybackError::prepare(jukebox_core::Error::Timeout(timed_out));
        assert!(matches!(err, PlaybackError::Timeout(t) if t == timed_out));

        let err = PlaybackError::prepare(jukebox_core::Error::ExtractionFailed("gone".into()));
        assert!(matches!(err, PlaybackError::Prepare(_)));
    }

    #[test]
    fn test_classification_failure_unwraps() {
        let err = PlaybackError::from(ResolveError::Classify(ClassifyError::TooShort));
        assert_eq!(err.to_string(), "Search query is too short");
        assert!(matches!(err, PlaybackError::Classify(ClassifyError::TooShort)));
    }
}
