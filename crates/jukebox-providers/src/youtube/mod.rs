//! `YouTube` Data API v3 client.

pub mod types;

use std::collections::HashMap;

use async_trait::async_trait;
use jukebox_core::urls::{youtube_playlist_id, youtube_video_id};
use jukebox_core::{
    Error, HttpError, ItemKind, PlaylistInfo, PlaylistPage, Privacy, Result, VideoItem,
    VideoProvider,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::http::ApiClient;
use types::{
    ListResponse, PlaylistItemResource, PlaylistResource, SearchResource, VideoResource,
};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Items per playlist page; also the most IDs `videos.list` accepts.
pub const PAGE_SIZE: usize = 50;

/// `YouTube` provider backed by the Data API.
#[derive(Clone)]
pub struct YouTubeClient {
    api: ApiClient,
    key: String,
}

impl YouTubeClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new("YouTube")?,
            key: api_key.into(),
        })
    }

    async fn list<T>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<ListResponse<T>>
    where
        T: DeserializeOwned,
    {
        let mut all: Vec<(&str, &str)> = params.to_vec();
        all.push(("key", self.key.as_str()));
        let url = ApiClient::url(&format!("{API_BASE}/{endpoint}"), &all)?;

        self.api.get_json(&url, None).await.map_err(|e| match e {
            Error::Http(HttpError::StatusError { status: 400, message })
                if message.contains("keyInvalid") || message.contains("API key not valid") =>
            {
                Error::Unauthorized(format!("YouTube API key rejected: {message}"))
            }
            other => other,
        })
    }

    /// Full video resources for up to [`PAGE_SIZE`] IDs, keyed by ID.
    async fn videos_by_id(&self, ids: &[String]) -> Result<HashMap<String, VideoResource>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let joined = ids.join(",");
        let response: ListResponse<VideoResource> = self
            .list(
                "videos",
                &[("part", "snippet,contentDetails,status"), ("id", joined.as_str())],
            )
            .await?;
        Ok(response
            .items
            .into_iter()
            .map(|v| (v.id.clone(), v))
            .collect())
    }

    async fn playlist_info(&self, id: &str) -> Result<PlaylistInfo> {
        let response: ListResponse<PlaylistResource> = self
            .list("playlists", &[("part", "snippet,contentDetails"), ("id", id)])
            .await?;
        let playlist = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| Error::ContentNotAvailable(format!("Playlist {id} not found")))?;

        let (title, owner, thumbnails) = playlist.snippet.map_or_else(
            || (String::from("Untitled playlist"), None, jukebox_core::Thumbnails::default()),
            |s| (s.title, s.channel_title, types::thumbnails(&s.thumbnails)),
        );

        Ok(PlaylistInfo {
            url: format!("https://www.youtube.com/playlist?list={}", playlist.id),
            id: playlist.id,
            title,
            owner,
            thumbnails,
            total: playlist.content_details.and_then(|d| d.item_count),
        })
    }
}

/// Item for a playlist entry whose video could not be looked up, typically
/// because it was made private or deleted.
fn placeholder_item(entry: &PlaylistItemResource) -> Option<VideoItem> {
    let snippet = entry.snippet.as_ref()?;
    let mut item = VideoItem::new(
        snippet.resource_id.video_id.clone().unwrap_or_default(),
        types::unescape_html(&snippet.title),
    );
    item.kind = types::item_kind(&snippet.resource_id.kind);
    item.channel = snippet.video_owner_channel_title.clone();
    item.thumbnails = types::thumbnails(&snippet.thumbnails);
    item.privacy = match types::privacy(entry.status.as_ref()) {
        Privacy::Public if snippet.title == "Private video" || snippet.title == "Deleted video" => {
            Privacy::Private
        }
        other => other,
    };
    Some(item)
}

#[async_trait]
impl VideoProvider for YouTubeClient {
    fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    async fn fetch_video(&self, url: &str) -> Result<VideoItem> {
        let id = youtube_video_id(url)
            .ok_or_else(|| Error::InvalidArgument(format!("No video ID in {url}")))?;
        let mut found = self.videos_by_id(std::slice::from_ref(&id)).await?;
        found
            .remove(&id)
            .map(VideoItem::from)
            .ok_or_else(|| Error::ContentNotAvailable(format!("Video {id} not found")))
    }

    async fn fetch_playlist_page(&self, url: &str, cursor: Option<&str>) -> Result<PlaylistPage> {
        let id = youtube_playlist_id(url)
            .ok_or_else(|| Error::InvalidArgument(format!("No playlist ID in {url}")))?;
        let info = self.playlist_info(&id).await?;

        let page_size = PAGE_SIZE.to_string();
        let mut params = vec![
            ("part", "snippet,status"),
            ("playlistId", id.as_str()),
            ("maxResults", page_size.as_str()),
        ];
        if let Some(token) = cursor {
            params.push(("pageToken", token));
        }
        let page: ListResponse<PlaylistItemResource> = self.list("playlistItems", &params).await?;

        let ids: Vec<String> = page
            .items
            .iter()
            .filter_map(|e| e.snippet.as_ref()?.resource_id.video_id.clone())
            .collect();
        let mut details = self.videos_by_id(&ids).await?;
        debug!(
            "Playlist {id}: {} entries, {} with details",
            page.items.len(),
            details.len()
        );

        let items = page
            .items
            .iter()
            .filter_map(|entry| {
                let video_id = entry.snippet.as_ref()?.resource_id.video_id.as_ref()?;
                details
                    .remove(video_id)
                    .map(VideoItem::from)
                    .or_else(|| placeholder_item(entry))
            })
            .collect();

        Ok(PlaylistPage {
            info,
            items,
            next_cursor: page.next_page_token,
        })
    }

    async fn search_videos(&self, query: &str, limit: usize) -> Result<Vec<VideoItem>> {
        let max_results = limit.clamp(1, PAGE_SIZE).to_string();
        let response: ListResponse<SearchResource> = self
            .list(
                "search",
                &[
                    ("part", "snippet"),
                    ("type", "video"),
                    ("q", query),
                    ("maxResults", max_results.as_str()),
                ],
            )
            .await?;

        let ids: Vec<String> = response
            .items
            .iter()
            .filter_map(|r| r.id.video_id.clone())
            .collect();
        let mut details = self.videos_by_id(&ids).await?;

        // Keep the upstream ranking; details only enrich.
        Ok(response
            .items
            .into_iter()
            .map(|result| {
                let enriched = result
                    .id
                    .video_id
                    .as_ref()
                    .and_then(|id| details.remove(id))
                    .map(VideoItem::from);
                enriched.unwrap_or_else(|| {
                    let mut item = VideoItem::new(
                        result.id.video_id.clone().unwrap_or_default(),
                        result
                            .snippet
                            .as_ref()
                            .map(|s| types::unescape_html(&s.title))
                            .unwrap_or_default(),
                    );
                    item.kind = types::item_kind(&result.id.kind);
                    if item.kind != ItemKind::Video {
                        item.url = String::new();
                    }
                    item
                })
            })
            .collect())
    }
}
