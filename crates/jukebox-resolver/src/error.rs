//! Resolution errors.

use serde::Serialize;
use thiserror::Error;

/// A query that cannot be resolved at all. Messages are shown to users as is.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq, Serialize)]
pub enum ClassifyError {
    #[error("Invalid YouTube URL")]
    InvalidYouTubeUrl,
    #[error("Invalid Spotify URL")]
    InvalidSpotifyUrl,
    #[error("Unrecognized URL")]
    UnrecognizedUrl,
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Search query is too short")]
    TooShort,
}

/// Why a single item was left out of a resolution.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum ItemError {
    #[error("Not a video")]
    NotAVideo,
    #[error("Video is private")]
    Private,
    #[error("Video is an upcoming premiere")]
    Upcoming,
    #[error("No results found")]
    NoResults,
    #[error("No result was close enough to the query")]
    NoAcceptableResult,
    #[error("{0}")]
    Unknown(String),
}

impl From<&jukebox_core::Error> for ItemError {
    fn from(e: &jukebox_core::Error) -> Self {
        Self::Unknown(e.to_string())
    }
}

/// A collected per-item failure. `subject` names what was being resolved: a
/// title, URL or search string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub subject: String,
    pub error: ItemError,
}

impl ItemFailure {
    pub fn new(subject: impl Into<String>, error: ItemError) -> Self {
        Self {
            subject: subject.into(),
            error,
        }
    }
}

/// Failure of a whole resolve call.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// Bad credentials or an upstream outage.
    #[error("{0}")]
    Fatal(#[source] jukebox_core::Error),
}

/// Internal outcome of resolving one thing: either it only affects that item
/// or it aborts the whole call.
#[derive(Debug)]
pub(crate) enum Failure {
    Item(ItemError),
    Fatal(jukebox_core::Error),
}

impl From<jukebox_core::Error> for Failure {
    fn from(e: jukebox_core::Error) -> Self {
        if e.is_fatal() {
            Self::Fatal(e)
        } else {
            Self::Item(ItemError::from(&e))
        }
    }
}

impl From<ItemError> for Failure {
    fn from(e: ItemError) -> Self {
        Self::Item(e)
    }
}
