//! `YouTube` Data API response structures.

use std::collections::HashMap;

use jukebox_core::{Duration, ItemKind, LiveStatus, Privacy, Thumbnail, Thumbnails, VideoItem};
use serde::Deserialize;

/// Envelope shared by every `*.list` endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
    pub page_info: Option<PageInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub total_results: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiThumbnail {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

pub type ThumbnailSet = HashMap<String, ApiThumbnail>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub privacy_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceId {
    pub kind: String,
    pub video_id: Option<String>,
    pub playlist_id: Option<String>,
    pub channel_id: Option<String>,
}

// videos.list

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResource {
    pub id: String,
    pub snippet: Option<VideoSnippet>,
    pub content_details: Option<VideoContentDetails>,
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    pub title: String,
    pub channel_title: Option<String>,
    #[serde(default)]
    pub thumbnails: ThumbnailSet,
    pub live_broadcast_content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoContentDetails {
    pub duration: Option<String>,
}

// playlists.list

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistResource {
    pub id: String,
    pub snippet: Option<PlaylistSnippet>,
    pub content_details: Option<PlaylistContentDetails>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSnippet {
    pub title: String,
    pub channel_title: Option<String>,
    #[serde(default)]
    pub thumbnails: ThumbnailSet,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistContentDetails {
    pub item_count: Option<u32>,
}

// playlistItems.list

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemResource {
    pub snippet: Option<PlaylistItemSnippet>,
    pub status: Option<Status>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistItemSnippet {
    pub title: String,
    pub video_owner_channel_title: Option<String>,
    #[serde(default)]
    pub thumbnails: ThumbnailSet,
    pub resource_id: ResourceId,
}

// search.list

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResource {
    pub id: ResourceId,
    pub snippet: Option<VideoSnippet>,
}

pub fn thumbnails(set: &ThumbnailSet) -> Thumbnails {
    Thumbnails::new(
        set.values()
            .map(|t| Thumbnail::new(t.url.clone(), t.width.unwrap_or(0), t.height.unwrap_or(0)))
            .collect(),
    )
}

pub fn privacy(status: Option<&Status>) -> Privacy {
    match status.and_then(|s| s.privacy_status.as_deref()) {
        Some("private") => Privacy::Private,
        Some("unlisted") => Privacy::Unlisted,
        _ => Privacy::Public,
    }
}

pub fn live_status(value: Option<&str>) -> LiveStatus {
    match value {
        Some("live") => LiveStatus::Live,
        Some("upcoming") => LiveStatus::Upcoming,
        _ => LiveStatus::None,
    }
}

pub fn item_kind(kind: &str) -> ItemKind {
    match kind {
        "youtube#video" => ItemKind::Video,
        "youtube#playlist" => ItemKind::Playlist,
        "youtube#channel" => ItemKind::Channel,
        _ => ItemKind::Other,
    }
}

/// Titles from search snippets arrive HTML-escaped.
pub fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

impl From<VideoResource> for VideoItem {
    fn from(resource: VideoResource) -> Self {
        let mut item = Self::new(resource.id, "");
        if let Some(snippet) = resource.snippet {
            item.title = unescape_html(&snippet.title);
            item.channel = snippet.channel_title;
            item.thumbnails = thumbnails(&snippet.thumbnails);
            item.live = live_status(snippet.live_broadcast_content.as_deref());
        }
        if let Some(duration) = resource
            .content_details
            .and_then(|d| d.duration)
            .and_then(|d| Duration::parse_iso8601(&d))
        {
            item.duration = duration;
        }
        item.privacy = privacy(resource.status.as_ref());
        item
    }
}
