//! In-memory providers and resource sources for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use jukebox_core::urls::youtube_video_id;
use jukebox_core::{
    AudioResource, CatalogCollection, CatalogTrack, CollectionKind, Error, MusicCatalog,
    PlaylistInfo, PlaylistPage, ResourceSource, Result, Thumbnails, VideoItem, VideoProvider,
};
use parking_lot::Mutex;

/// A public video with a three-minute duration.
pub fn video(id: &str, title: &str) -> VideoItem {
    let mut item = VideoItem::new(id, title);
    item.duration = jukebox_core::Duration::from_seconds(180);
    item
}

pub fn watch_url(id: &str) -> String {
    format!("https://www.youtube.com/watch?v={id}")
}

/// Video provider answering from fixed tables.
#[derive(Default)]
pub struct FakeVideos {
    videos: HashMap<String, VideoItem>,
    playlists: HashMap<String, (PlaylistInfo, Vec<VideoItem>)>,
    searches: HashMap<String, Vec<VideoItem>>,
    page_size: usize,
    delay: Option<Duration>,
    failure: Mutex<Option<fn() -> Error>>,
    calls: AtomicUsize,
}

impl FakeVideos {
    pub fn new() -> Self {
        Self {
            page_size: 50,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_video(mut self, item: VideoItem) -> Self {
        self.videos.insert(item.id.clone(), item);
        self
    }

    /// Register a playlist reachable at `https://www.youtube.com/playlist?list=<id>`.
    #[must_use]
    pub fn with_playlist(mut self, id: &str, title: &str, items: Vec<VideoItem>) -> Self {
        let info = PlaylistInfo {
            id: id.to_string(),
            title: title.to_string(),
            url: format!("https://www.youtube.com/playlist?list={id}"),
            owner: Some("Owner".to_string()),
            thumbnails: Thumbnails::default(),
            total: Some(items.len() as u32),
        };
        self.playlists.insert(id.to_string(), (info, items));
        self
    }

    /// Register results for a lowercase search string.
    #[must_use]
    pub fn with_search(mut self, query: &str, items: Vec<VideoItem>) -> Self {
        self.searches.insert(query.to_lowercase(), items);
        self
    }

    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every following call fail with the error built by `make`.
    pub fn fail_with(&self, make: fn() -> Error) {
        *self.failure.lock() = Some(make);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failure = *self.failure.lock();
        failure.map_or(Ok(()), |make| Err(make()))
    }
}

#[async_trait]
impl VideoProvider for FakeVideos {
    fn page_size(&self) -> usize {
        self.page_size
    }

    async fn fetch_video(&self, url: &str) -> Result<VideoItem> {
        self.enter().await?;
        youtube_video_id(url)
            .and_then(|id| self.videos.get(&id).cloned())
            .ok_or_else(|| Error::ContentNotAvailable(format!("no video at {url}")))
    }

    async fn fetch_playlist_page(&self, url: &str, cursor: Option<&str>) -> Result<PlaylistPage> {
        self.enter().await?;
        let id = jukebox_core::urls::youtube_playlist_id(url)
            .ok_or_else(|| Error::InvalidArgument(url.to_string()))?;
        let (info, items) = self
            .playlists
            .get(&id)
            .ok_or_else(|| Error::ContentNotAvailable(format!("no playlist {id}")))?;

        let page: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let start = page * self.page_size;
        let end = (start + self.page_size).min(items.len());
        Ok(PlaylistPage {
            info: info.clone(),
            items: items.get(start..end).map(<[VideoItem]>::to_vec).unwrap_or_default(),
            next_cursor: (end < items.len()).then(|| (page + 1).to_string()),
        })
    }

    async fn search_videos(&self, query: &str, limit: usize) -> Result<Vec<VideoItem>> {
        self.enter().await?;
        Ok(self
            .searches
            .get(&query.to_lowercase())
            .map(|items| items.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// Music catalog answering from fixed tables.
#[derive(Default)]
pub struct FakeCatalog {
    tracks: HashMap<String, CatalogTrack>,
    collections: HashMap<String, CatalogCollection>,
    failure: Option<fn() -> Error>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_track(mut self, track: CatalogTrack) -> Self {
        self.tracks.insert(track.url.clone(), track);
        self
    }

    #[must_use]
    pub fn with_collection(mut self, collection: CatalogCollection) -> Self {
        self.collections.insert(collection.url.clone(), collection);
        self
    }

    #[must_use]
    pub fn failing(mut self, make: fn() -> Error) -> Self {
        self.failure = Some(make);
        self
    }

    fn check(&self) -> Result<()> {
        self.failure.map_or(Ok(()), |make| Err(make()))
    }

    fn collection(&self, url: &str, kind: CollectionKind, limit: usize) -> Result<CatalogCollection> {
        self.check()?;
        let mut collection = self
            .collections
            .get(url)
            .filter(|c| c.kind == kind)
            .cloned()
            .ok_or_else(|| Error::ContentNotAvailable(url.to_string()))?;
        collection.tracks.truncate(limit);
        Ok(collection)
    }
}

pub fn catalog_track(id: &str, name: &str, artist: &str) -> CatalogTrack {
    CatalogTrack {
        id: id.to_string(),
        name: name.to_string(),
        artists: vec![artist.to_string()],
        url: format!("https://open.spotify.com/track/{id}"),
        duration: jukebox_core::Duration::from_seconds(200),
        thumbnails: Thumbnails::default(),
    }
}

#[async_trait]
impl MusicCatalog for FakeCatalog {
    async fn fetch_track(&self, url: &str) -> Result<CatalogTrack> {
        self.check()?;
        self.tracks
            .get(url)
            .cloned()
            .ok_or_else(|| Error::ContentNotAvailable(url.to_string()))
    }

    async fn fetch_album(&self, url: &str, limit: usize) -> Result<CatalogCollection> {
        self.collection(url, CollectionKind::Album, limit)
    }

    async fn fetch_playlist(&self, url: &str, limit: usize) -> Result<CatalogCollection> {
        self.collection(url, CollectionKind::Playlist, limit)
    }
}

/// Resource source producing small in-memory resources.
#[derive(Default)]
pub struct FakeSource {
    delay: Option<Duration>,
    fail: bool,
    opens: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub const fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceSource for FakeSource {
    async fn open(&self, url: &str) -> Result<AudioResource> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::ExtractionFailed(format!("cannot open {url}")));
        }
        Ok(AudioResource::buffered(url, Bytes::from_static(b"audio"), None))
    }
}
