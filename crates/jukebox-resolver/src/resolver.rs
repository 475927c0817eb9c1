//! Turning classified queries into tracks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use jukebox_core::deadline::{self, Stage};
use jukebox_core::{
    CatalogTrack, Config, Error, ItemKind, LiveStatus, MusicCatalog, Privacy, Provider,
    ResourceSource, Track, TrackInfo, TrackSnapshot, VideoItem, VideoProvider,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Failure, ItemError, ItemFailure, ResolveError};
use crate::search::{Search, Source, Subtype};
use crate::similarity;

/// Catalog members resolved at the same time.
const CATALOG_CONCURRENCY: usize = 5;

/// Title words that mark an alternate version of a song. Candidates carrying
/// one are skipped unless the query asks for it.
const UNWANTED_MODIFIERS: &[&str] = &["hour", "live", "sped", "remix", "reverb", "dampening"];

/// Collection details reported alongside its tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaylistMeta {
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    /// Number of tracks actually delivered.
    pub size: usize,
    pub owner: Option<String>,
    pub provider: Provider,
}

/// Outcome of a resolve call that was not aborted.
#[derive(Debug, Default)]
pub struct Resolution {
    pub items: Vec<Track>,
    pub errors: Vec<ItemFailure>,
    pub playlist: Option<PlaylistMeta>,
}

impl Resolution {
    fn single(track: Track) -> Self {
        Self {
            items: vec![track],
            ..Self::default()
        }
    }

    fn failed(subject: &str, error: ItemError) -> Self {
        Self {
            errors: vec![ItemFailure::new(subject, error)],
            ..Self::default()
        }
    }

    pub fn report(&self) -> ResolutionReport {
        ResolutionReport {
            items: self.items.iter().map(Track::snapshot).collect(),
            errors: self.errors.clone(),
            playlist: self.playlist.clone(),
        }
    }
}

/// Serializable view of a [`Resolution`].
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub items: Vec<TrackSnapshot>,
    pub errors: Vec<ItemFailure>,
    pub playlist: Option<PlaylistMeta>,
}

/// Fetches upstream items for a [`Search`] and converts them into tracks.
pub struct Resolver {
    videos: Arc<dyn VideoProvider>,
    catalog: Option<Arc<dyn MusicCatalog>>,
    resources: Arc<dyn ResourceSource>,
    threshold: f64,
    text_candidates: usize,
    fetch_timeout: Option<Duration>,
    prepare_timeout: Option<Duration>,
}

impl Resolver {
    pub fn new(
        videos: Arc<dyn VideoProvider>,
        resources: Arc<dyn ResourceSource>,
        config: &Config,
    ) -> Self {
        Self {
            videos,
            catalog: None,
            resources,
            threshold: config.levenshtein_threshold,
            text_candidates: config.text_candidates.max(1),
            fetch_timeout: config.timeouts.fetch_results(),
            prepare_timeout: config.timeouts.prepare_resource(),
        }
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn MusicCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Classify `raw` and resolve it.
    pub async fn resolve_query(
        &self,
        raw: &str,
        max_items: usize,
        added_by: &str,
    ) -> Result<Resolution, ResolveError> {
        let search = Search::classify(raw)?;
        self.resolve(&search, raw.trim(), max_items, added_by).await
    }

    /// Resolve a classified query into at most `max_items` tracks.
    ///
    /// Item-level problems are collected in [`Resolution::errors`]; only
    /// credential failures and upstream outages fail the call.
    pub async fn resolve(
        &self,
        search: &Search,
        raw: &str,
        max_items: usize,
        added_by: &str,
    ) -> Result<Resolution, ResolveError> {
        if max_items == 0 {
            return Ok(Resolution::default());
        }

        let outcome = match (search.source, search.subtype) {
            (Source::YouTube, Some(Subtype::Playlist)) => {
                self.resolve_playlist(raw, max_items, added_by).await
            }
            (Source::YouTube, _) => self.resolve_video(raw, added_by).await.map(Resolution::single),
            (Source::Spotify, Some(Subtype::Track)) => self
                .resolve_spotify_track(raw, added_by)
                .await
                .map(Resolution::single),
            (Source::Spotify, Some(kind @ (Subtype::Album | Subtype::Playlist))) => {
                self.resolve_catalog_collection(raw, kind, max_items, added_by)
                    .await
            }
            (Source::Spotify, _) => Err(Failure::Item(ItemError::Unknown(
                "Unsupported Spotify link".to_string(),
            ))),
            (Source::Text, _) => self.resolve_text(raw, added_by).await.map(Resolution::single),
        };

        match outcome {
            Ok(resolution) => {
                info!(
                    search = %search,
                    items = resolution.items.len(),
                    errors = resolution.errors.len(),
                    "Resolved query"
                );
                Ok(resolution)
            }
            Err(Failure::Item(error)) => {
                debug!(search = %search, query = raw, %error, "Query resolved to nothing");
                Ok(Resolution::failed(raw, error))
            }
            Err(Failure::Fatal(e)) => {
                warn!(search = %search, query = raw, "Resolution aborted: {e}");
                Err(ResolveError::Fatal(e))
            }
        }
    }

    /// Await an upstream call bounded by the fetch timeout.
    async fn fetch<T, F>(&self, fut: F) -> Result<T, Failure>
    where
        F: Future<Output = jukebox_core::Result<T>> + Send,
    {
        let outcome = deadline::guard(Stage::FetchResults, self.fetch_timeout, fut)
            .await
            .map_err(Error::from)?;
        Ok(outcome?)
    }

    fn catalog(&self) -> Result<&Arc<dyn MusicCatalog>, Failure> {
        self.catalog.as_ref().ok_or_else(|| {
            Failure::Fatal(Error::Config("Spotify credentials are not configured".into()))
        })
    }

    fn video_to_track(&self, item: VideoItem, added_by: &str) -> Result<Track, ItemError> {
        if item.kind != ItemKind::Video {
            return Err(ItemError::NotAVideo);
        }
        if item.privacy == Privacy::Private {
            return Err(ItemError::Private);
        }
        if item.live == LiveStatus::Upcoming {
            return Err(ItemError::Upcoming);
        }

        let thumbnail = item.thumbnails.best_url();
        let mut info = TrackInfo::new(item.id, item.title, item.url, added_by);
        info.duration = item.duration;
        info.thumbnail = thumbnail;
        Ok(Track::new(info, self.resources.clone(), self.prepare_timeout))
    }

    async fn resolve_video(&self, url: &str, added_by: &str) -> Result<Track, Failure> {
        let item = self.fetch(self.videos.fetch_video(url)).await?;
        Ok(self.video_to_track(item, added_by)?)
    }

    async fn resolve_playlist(
        &self,
        url: &str,
        max_items: usize,
        added_by: &str,
    ) -> Result<Resolution, Failure> {
        let pages = max_items.div_ceil(self.videos.page_size().max(1));
        let mut info = None;
        let mut raw_items = Vec::new();
        let mut errors = Vec::new();
        let mut cursor: Option<String> = None;

        for page_number in 0..pages {
            match self
                .fetch(self.videos.fetch_playlist_page(url, cursor.as_deref()))
                .await
            {
                Ok(page) => {
                    info.get_or_insert(page.info);
                    raw_items.extend(page.items);
                    cursor = page.next_cursor;
                }
                Err(Failure::Item(error)) if page_number > 0 => {
                    warn!(playlist = url, page = page_number, %error, "Stopped paging playlist");
                    errors.push(ItemFailure::new(
                        format!("{url} (page {})", page_number + 1),
                        error,
                    ));
                    break;
                }
                Err(failure) => return Err(failure),
            }
            if cursor.is_none() {
                break;
            }
        }

        raw_items.truncate(max_items);
        let mut items = Vec::with_capacity(raw_items.len());
        for item in raw_items {
            let subject = item.title.clone();
            match self.video_to_track(item, added_by) {
                Ok(track) => items.push(track),
                Err(error) => errors.push(ItemFailure::new(subject, error)),
            }
        }

        let playlist = info.map(|info| PlaylistMeta {
            thumbnail: info
                .thumbnails
                .best_url()
                .or_else(|| items.first().and_then(|t| t.info.thumbnail.clone())),
            title: info.title,
            url: info.url,
            size: items.len(),
            owner: info.owner,
            provider: Provider::YouTube,
        });

        Ok(Resolution {
            items,
            errors,
            playlist,
        })
    }

    async fn resolve_text(&self, query: &str, added_by: &str) -> Result<Track, Failure> {
        let candidates = self
            .fetch(self.videos.search_videos(query, self.text_candidates))
            .await?;

        let lowered = query.to_lowercase();
        let candidates: Vec<VideoItem> = candidates
            .into_iter()
            .filter(|c| !has_unrequested_modifier(&c.title, &lowered))
            .collect();

        let (best, score) = similarity::best_match(candidates, query, |c| c.title.as_str())
            .ok_or(ItemError::NoResults)?;
        debug!(query, title = %best.title, score, "Best text match");

        if score < self.threshold {
            return Err(ItemError::NoAcceptableResult.into());
        }
        Ok(self.video_to_track(best, added_by)?)
    }

    async fn resolve_spotify_track(&self, url: &str, added_by: &str) -> Result<Track, Failure> {
        let catalog = self.catalog()?;
        let track = self.fetch(catalog.fetch_track(url)).await?;
        self.resolve_catalog_track(track, added_by).await
    }

    /// Find a catalog track on the video provider by artist and name.
    async fn resolve_catalog_track(
        &self,
        track: CatalogTrack,
        added_by: &str,
    ) -> Result<Track, Failure> {
        let query = format!("{} {}", track.artists.join(" "), track.name);
        let mut resolved = self.resolve_text(query.trim(), added_by).await?;
        resolved.info.provider = Provider::Spotify;
        if resolved.info.thumbnail.is_none() {
            resolved.info.thumbnail = track.thumbnails.best_url();
        }
        Ok(resolved)
    }

    async fn resolve_catalog_collection(
        &self,
        url: &str,
        kind: Subtype,
        max_items: usize,
        added_by: &str,
    ) -> Result<Resolution, Failure> {
        let catalog = self.catalog()?;
        let collection = match kind {
            Subtype::Album => self.fetch(catalog.fetch_album(url, max_items)).await?,
            _ => self.fetch(catalog.fetch_playlist(url, max_items)).await?,
        };

        let outcomes: Vec<(String, Result<Track, Failure>)> =
            stream::iter(collection.tracks.iter().take(max_items).cloned())
                .map(move |track| async move {
                    let subject = format!("{} - {}", track.artists.join(", "), track.name);
                    (subject, self.resolve_catalog_track(track, added_by).await)
                })
                .buffered(CATALOG_CONCURRENCY)
                .collect()
                .await;

        let mut items = Vec::new();
        let mut errors = Vec::new();
        for (subject, outcome) in outcomes {
            match outcome {
                Ok(track) => items.push(track),
                Err(Failure::Item(error)) => errors.push(ItemFailure::new(subject, error)),
                Err(Failure::Fatal(e)) => return Err(Failure::Fatal(e)),
            }
        }

        let playlist = PlaylistMeta {
            title: collection.name,
            url: collection.url,
            thumbnail: collection.thumbnails.best_url(),
            size: items.len(),
            owner: collection.creator,
            provider: Provider::Spotify,
        };

        Ok(Resolution {
            items,
            errors,
            playlist: Some(playlist),
        })
    }
}

fn has_unrequested_modifier(title: &str, lowered_query: &str) -> bool {
    let title = title.to_lowercase();
    let words: Vec<&str> = title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    UNWANTED_MODIFIERS.iter().any(|modifier| {
        !lowered_query.contains(modifier) && words.iter().any(|w| w.starts_with(modifier))
    })
}
