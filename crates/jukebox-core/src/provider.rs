//! Content provider seams and their provider-native metadata.
//!
//! The resolver only talks to these traits; `jukebox-providers` implements
//! them over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Duration, Thumbnails};
use crate::Result;

/// What an upstream item actually is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Video,
    Playlist,
    Channel,
    Other,
}

/// Upstream visibility of an item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Unlisted,
    Private,
}

/// Broadcast state of a video.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LiveStatus {
    #[default]
    None,
    Live,
    /// Scheduled livestream or premiere that has not started.
    Upcoming,
}

/// A video as reported by the video provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoItem {
    pub id: String,
    pub kind: ItemKind,
    pub title: String,
    pub url: String,
    pub channel: Option<String>,
    pub duration: Duration,
    pub thumbnails: Thumbnails,
    pub privacy: Privacy,
    pub live: LiveStatus,
}

impl VideoItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            url: format!("https://www.youtube.com/watch?v={id}"),
            id,
            kind: ItemKind::Video,
            title: title.into(),
            channel: None,
            duration: Duration::default(),
            thumbnails: Thumbnails::default(),
            privacy: Privacy::Public,
            live: LiveStatus::None,
        }
    }
}

/// Playlist header information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistInfo {
    pub id: String,
    pub title: String,
    pub url: String,
    pub owner: Option<String>,
    pub thumbnails: Thumbnails,
    /// Item count reported upstream, if known.
    pub total: Option<u32>,
}

/// One page of playlist items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistPage {
    pub info: PlaylistInfo,
    pub items: Vec<VideoItem>,
    /// Cursor for the following page, `None` on the last page.
    pub next_cursor: Option<String>,
}

/// The YouTube-like provider.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Maximum number of items returned per playlist page.
    fn page_size(&self) -> usize;

    async fn fetch_video(&self, url: &str) -> Result<VideoItem>;

    async fn fetch_playlist_page(&self, url: &str, cursor: Option<&str>) -> Result<PlaylistPage>;

    async fn search_videos(&self, query: &str, limit: usize) -> Result<Vec<VideoItem>>;
}

/// A catalog track as reported by the music catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogTrack {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub url: String,
    pub duration: Duration,
    pub thumbnails: Thumbnails,
}

/// Album or playlist flavor of a catalog collection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Album,
    Playlist,
}

/// An album or playlist with (a bounded prefix of) its tracks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogCollection {
    pub id: String,
    pub kind: CollectionKind,
    pub name: String,
    pub url: String,
    /// Album artist or playlist owner.
    pub creator: Option<String>,
    pub thumbnails: Thumbnails,
    /// Track count reported upstream.
    pub total: u32,
    pub tracks: Vec<CatalogTrack>,
}

/// The Spotify-like provider.
#[async_trait]
pub trait MusicCatalog: Send + Sync {
    async fn fetch_track(&self, url: &str) -> Result<CatalogTrack>;

    async fn fetch_album(&self, url: &str, limit: usize) -> Result<CatalogCollection>;

    async fn fetch_playlist(&self, url: &str, limit: usize) -> Result<CatalogCollection>;
}
