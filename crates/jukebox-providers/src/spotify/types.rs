//! Spotify Web API response structures.

use jukebox_core::{CatalogTrack, Duration, Thumbnail, Thumbnails};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumRef {
    #[serde(default)]
    pub images: Vec<Image>,
}

/// Track object. Local files and unavailable tracks may lack an ID.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackObject {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    pub duration_ms: u64,
    pub external_urls: Option<ExternalUrls>,
    /// Absent on the simplified tracks embedded in an album.
    pub album: Option<AlbumRef>,
}

/// Paging envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub total: u32,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumObject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub images: Vec<Image>,
    pub external_urls: Option<ExternalUrls>,
    pub tracks: Paging<TrackObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistEntry {
    /// Null for tracks removed from the catalog.
    pub track: Option<TrackObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistObject {
    pub id: String,
    pub name: String,
    pub owner: Option<Owner>,
    #[serde(default)]
    pub images: Vec<Image>,
    pub external_urls: Option<ExternalUrls>,
    pub tracks: Paging<PlaylistEntry>,
}

pub fn thumbnails(images: &[Image]) -> Thumbnails {
    Thumbnails::new(
        images
            .iter()
            .map(|i| Thumbnail::new(i.url.clone(), i.width.unwrap_or(0), i.height.unwrap_or(0)))
            .collect(),
    )
}

pub fn artist_line(artists: &[ArtistRef]) -> Option<String> {
    (!artists.is_empty()).then(|| {
        artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    })
}

impl TrackObject {
    /// Convert into a catalog track, falling back to the album's artwork.
    /// Tracks without an ID cannot be looked up and are skipped.
    pub fn into_catalog(self, fallback_images: &[Image]) -> Option<CatalogTrack> {
        let id = self.id?;
        let images = self
            .album
            .as_ref()
            .map_or(fallback_images, |a| a.images.as_slice());
        Some(CatalogTrack {
            url: self
                .external_urls
                .and_then(|u| u.spotify)
                .unwrap_or_else(|| format!("https://open.spotify.com/track/{id}")),
            id,
            name: self.name,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
            duration: Duration::from_millis(self.duration_ms),
            thumbnails: thumbnails(images),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_track_conversion() {
        let json = r#"{
            "id": "4uLU6hMCjMI75M1A2tKUQC",
            "name": "Never Gonna Give You Up",
            "artists": [{"name": "Rick Astley"}],
            "duration_ms": 213573,
            "external_urls": {"spotify": "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"},
            "album": {"images": [{"url": "https://i.scdn.co/a.jpg", "width": 640, "height": 640}]}
        }"#;
        let track: TrackObject = serde_json::from_str(json).unwrap();
        let track = track.into_catalog(&[]).unwrap();

        assert_eq!(track.name, "Never Gonna Give You Up");
        assert_eq!(track.artists, ["Rick Astley"]);
        assert_eq!(track.duration.as_seconds(), 213);
        assert_eq!(track.thumbnails.best_url().as_deref(), Some("https://i.scdn.co/a.jpg"));
    }

    #[test]
    fn test_local_track_is_skipped() {
        let json = r#"{"id": null, "name": "local.mp3", "duration_ms": 1000}"#;
        let track: TrackObject = serde_json::from_str(json).unwrap();
        assert!(track.into_catalog(&[]).is_none());
    }

    #[test]
    fn test_album_track_uses_fallback_art() {
        let json = r#"{"id": "t1", "name": "Intro", "duration_ms": 60000}"#;
        let track: TrackObject = serde_json::from_str(json).unwrap();
        let fallback = [Image {
            url: "https://i.scdn.co/album.jpg".into(),
            width: None,
            height: None,
        }];
        let track = track.into_catalog(&fallback).unwrap();
        assert_eq!(track.url, "https://open.spotify.com/track/t1");
        assert!(!track.thumbnails.is_empty());
    }

    #[test]
    fn test_artist_line() {
        let artists = vec![
            ArtistRef { name: "A".into() },
            ArtistRef { name: "B".into() },
        ];
        assert_eq!(artist_line(&artists).as_deref(), Some("A, B"));
        assert_eq!(artist_line(&[]), None);
    }
}
