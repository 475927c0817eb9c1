//! Query classification.

use std::fmt;

use jukebox_core::urls::{self, SpotifyPath};
use serde::Serialize;
use url::Url;

use crate::error::ClassifyError;

/// Where a query is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Source {
    YouTube,
    Spotify,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Subtype {
    Video,
    Playlist,
    Track,
    Album,
}

/// A classified query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Search {
    pub source: Source,
    pub subtype: Option<Subtype>,
}

/// Endings that make an unparsable string look like a mistyped URL.
const COMMON_TLDS: &[&str] = &[
    ".com", ".net", ".org", ".io", ".be", ".co", ".fm", ".tv", ".me", ".app", ".uk", ".de",
];

const SCHEME_PREFIXES: &[&str] = &["http://", "https://", "www."];

/// Queries of this many characters or fewer are rejected.
const MIN_TEXT_LEN: usize = 3;

impl Search {
    pub const fn new(source: Source, subtype: Option<Subtype>) -> Self {
        Self { source, subtype }
    }

    pub const fn text() -> Self {
        Self::new(Source::Text, None)
    }

    /// Classify a raw query. Pure and deterministic.
    pub fn classify(raw: &str) -> Result<Self, ClassifyError> {
        let raw = raw.trim();

        if let Some(url) = Url::parse(raw).ok().filter(Url::has_host) {
            return Self::classify_url(&url);
        }

        if looks_like_url(raw) {
            Err(ClassifyError::InvalidUrl)
        } else if raw.chars().count() > MIN_TEXT_LEN {
            Ok(Self::text())
        } else {
            Err(ClassifyError::TooShort)
        }
    }

    fn classify_url(url: &Url) -> Result<Self, ClassifyError> {
        if urls::is_youtube(url) {
            if urls::query_param(url, "list").is_some() {
                return Ok(Self::new(Source::YouTube, Some(Subtype::Playlist)));
            }
            if urls::youtube_video_id(url.as_str()).is_some() {
                return Ok(Self::new(Source::YouTube, Some(Subtype::Video)));
            }
            return Err(ClassifyError::InvalidYouTubeUrl);
        }

        if urls::is_youtube_short(url) {
            return urls::youtube_video_id(url.as_str())
                .map(|_| Self::new(Source::YouTube, Some(Subtype::Video)))
                .ok_or(ClassifyError::InvalidYouTubeUrl);
        }

        if urls::is_spotify(url) {
            let subtype = match SpotifyPath::of(url) {
                Some(SpotifyPath::Track) => Subtype::Track,
                Some(SpotifyPath::Album) => Subtype::Album,
                Some(SpotifyPath::Playlist) => Subtype::Playlist,
                None => return Err(ClassifyError::InvalidSpotifyUrl),
            };
            return Ok(Self::new(Source::Spotify, Some(subtype)));
        }

        Err(ClassifyError::UnrecognizedUrl)
    }

    pub const fn is_collection(&self) -> bool {
        matches!(self.subtype, Some(Subtype::Playlist | Subtype::Album))
    }
}

impl fmt::Display for Search {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subtype {
            Some(subtype) => write!(f, "{:?} {subtype:?}", self.source),
            None => write!(f, "{:?}", self.source),
        }
    }
}

fn looks_like_url(raw: &str) -> bool {
    let lowered = raw.to_ascii_lowercase();
    SCHEME_PREFIXES.iter().any(|p| lowered.starts_with(p))
        || COMMON_TLDS.iter().any(|tld| lowered.ends_with(tld))
}
