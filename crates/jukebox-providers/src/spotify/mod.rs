//! Spotify Web API client.

mod auth;
pub mod types;

use async_trait::async_trait;
use jukebox_core::urls::{spotify_id, SpotifyPath};
use jukebox_core::{
    CatalogCollection, CatalogTrack, CollectionKind, Error, HttpError, MusicCatalog, Result,
};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

pub use auth::TokenStore;
use types::{AlbumObject, Paging, PlaylistEntry, PlaylistObject, TrackObject};

const API_BASE: &str = "https://api.spotify.com/v1";

/// Largest page the album tracks endpoint serves.
const ALBUM_PAGE: usize = 50;
/// Largest page the playlist tracks endpoint serves.
const PLAYLIST_PAGE: usize = 100;

/// Spotify catalog lookups with client-credentials auth.
#[derive(Clone)]
pub struct SpotifyClient {
    api: crate::http::ApiClient,
    tokens: TokenStore,
}

impl SpotifyClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        let api = crate::http::ApiClient::new("Spotify")?;
        let tokens = TokenStore::new(api.clone(), client_id.into(), client_secret.into());
        Ok(Self { api, tokens })
    }

    /// GET with the bearer token, refreshing it once if it was rejected.
    async fn get<R>(&self, url: &Url) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let token = self.tokens.access_token().await?;
        match self.api.get_json(url, Some(token.as_str())).await {
            Err(Error::Http(HttpError::StatusError { status: 401, .. })) => {
                info!("Spotify token rejected, refreshing");
                self.tokens.invalidate();
                let token = self.tokens.access_token().await?;
                self.api.get_json(url, Some(token.as_str())).await
            }
            Err(Error::Http(HttpError::StatusError { status: 404, .. })) => Err(
                Error::ContentNotAvailable(format!("Spotify has nothing at {}", url.path())),
            ),
            other => other,
        }
    }

    /// Follow `first` with further pages until `limit` items are held or the
    /// collection runs out.
    async fn collect_pages<T>(
        &self,
        first: Paging<T>,
        endpoint: &str,
        page_size: usize,
        limit: usize,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut next = first.next.is_some();
        let mut items = first.items;
        while next && items.len() < limit {
            let offset = items.len().to_string();
            let size = page_size.to_string();
            let url = crate::http::ApiClient::url(
                endpoint,
                &[("offset", offset.as_str()), ("limit", size.as_str())],
            )?;
            let page: Paging<T> = self.get(&url).await?;
            if page.items.is_empty() {
                break;
            }
            next = page.next.is_some();
            items.extend(page.items);
        }
        items.truncate(limit);
        Ok(items)
    }
}

fn require_id(url: &str, kind: SpotifyPath) -> Result<String> {
    spotify_id(url, kind)
        .ok_or_else(|| Error::InvalidArgument(format!("No Spotify {kind:?} ID in {url}")))
}

#[async_trait]
impl MusicCatalog for SpotifyClient {
    async fn fetch_track(&self, url: &str) -> Result<CatalogTrack> {
        let id = require_id(url, SpotifyPath::Track)?;
        let endpoint = crate::http::ApiClient::url(&format!("{API_BASE}/tracks/{id}"), &[])?;
        let track: TrackObject = self.get(&endpoint).await?;
        track
            .into_catalog(&[])
            .ok_or_else(|| Error::ContentNotAvailable(format!("Track {id} is not playable")))
    }

    async fn fetch_album(&self, url: &str, limit: usize) -> Result<CatalogCollection> {
        let id = require_id(url, SpotifyPath::Album)?;
        let endpoint = crate::http::ApiClient::url(&format!("{API_BASE}/albums/{id}"), &[])?;
        let album: AlbumObject = self.get(&endpoint).await?;

        let total = album.tracks.total;
        let tracks = self
            .collect_pages(
                album.tracks,
                &format!("{API_BASE}/albums/{id}/tracks"),
                ALBUM_PAGE,
                limit,
            )
            .await?;
        debug!("Album {id}: {} of {total} tracks", tracks.len());

        Ok(CatalogCollection {
            url: album
                .external_urls
                .and_then(|u| u.spotify)
                .unwrap_or_else(|| format!("https://open.spotify.com/album/{id}")),
            kind: CollectionKind::Album,
            name: album.name,
            creator: types::artist_line(&album.artists),
            thumbnails: types::thumbnails(&album.images),
            total,
            tracks: tracks
                .into_iter()
                .filter_map(|t| t.into_catalog(&album.images))
                .collect(),
            id: album.id,
        })
    }

    async fn fetch_playlist(&self, url: &str, limit: usize) -> Result<CatalogCollection> {
        let id = require_id(url, SpotifyPath::Playlist)?;
        let endpoint = crate::http::ApiClient::url(&format!("{API_BASE}/playlists/{id}"), &[])?;
        let playlist: PlaylistObject = self.get(&endpoint).await?;

        let total = playlist.tracks.total;
        let entries: Vec<PlaylistEntry> = self
            .collect_pages(
                playlist.tracks,
                &format!("{API_BASE}/playlists/{id}/tracks"),
                PLAYLIST_PAGE,
                limit,
            )
            .await?;
        debug!("Playlist {id}: {} of {total} entries", entries.len());

        Ok(CatalogCollection {
            url: playlist
                .external_urls
                .and_then(|u| u.spotify)
                .unwrap_or_else(|| format!("https://open.spotify.com/playlist/{id}")),
            kind: CollectionKind::Playlist,
            name: playlist.name,
            creator: playlist.owner.and_then(|o| o.display_name),
            thumbnails: types::thumbnails(&playlist.images),
            total,
            tracks: entries
                .into_iter()
                .filter_map(|e| e.track?.into_catalog(&[]))
                .collect(),
            id: playlist.id,
        })
    }
}
