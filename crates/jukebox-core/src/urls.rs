//! Provider URL recognition and ID extraction.

use url::Url;

const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "www.youtube.com", "m.youtube.com", "music.youtube.com"];
const YOUTUBE_SHORT_HOSTS: &[&str] = &["youtu.be", "www.youtu.be"];
const SPOTIFY_HOSTS: &[&str] = &["open.spotify.com", "play.spotify.com"];

fn host_in(url: &Url, hosts: &[&str]) -> bool {
    url.host_str()
        .is_some_and(|h| hosts.iter().any(|known| h.eq_ignore_ascii_case(known)))
}

/// Host of a full `YouTube` site.
pub fn is_youtube(url: &Url) -> bool {
    host_in(url, YOUTUBE_HOSTS)
}

/// Host of the shortened-video `YouTube` domain.
pub fn is_youtube_short(url: &Url) -> bool {
    host_in(url, YOUTUBE_SHORT_HOSTS)
}

pub fn is_spotify(url: &Url) -> bool {
    host_in(url, SPOTIFY_HOSTS)
}

/// Value of a non-empty query parameter.
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, v)| k == name && !v.is_empty())
        .map(|(_, v)| v.into_owned())
}

/// Extract a video ID from a watch URL, a shortened URL or a shorts URL.
pub fn youtube_video_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    if is_youtube_short(&url) {
        return url
            .path_segments()?
            .find(|s| !s.is_empty())
            .map(String::from);
    }
    if !is_youtube(&url) {
        return None;
    }
    if let Some(id) = query_param(&url, "v") {
        return Some(id);
    }
    let mut segments = url.path_segments()?;
    match (segments.next(), segments.next()) {
        (Some("shorts" | "live" | "embed"), Some(id)) if !id.is_empty() => Some(id.to_string()),
        _ => None,
    }
}

/// Extract a playlist ID from the `list` parameter.
pub fn youtube_playlist_id(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    is_youtube(&url).then(|| query_param(&url, "list")).flatten()
}

/// Spotify item kind found at the start of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotifyPath {
    Track,
    Album,
    Playlist,
}

impl SpotifyPath {
    const fn segment(self) -> &'static str {
        match self {
            Self::Track => "track",
            Self::Album => "album",
            Self::Playlist => "playlist",
        }
    }

    /// Classify a Spotify URL by its `/<kind>/<id>` path, ignoring a
    /// leading locale segment.
    pub fn of(url: &Url) -> Option<Self> {
        kind_and_id(url).map(|(kind, _)| kind)
    }
}

fn kind_and_id(url: &Url) -> Option<(SpotifyPath, String)> {
    let mut segments = url.path_segments()?.filter(|s| !s.starts_with("intl-"));
    let (segment, id) = (segments.next()?, segments.next()?);
    if id.is_empty() {
        return None;
    }
    [SpotifyPath::Track, SpotifyPath::Album, SpotifyPath::Playlist]
        .into_iter()
        .find(|kind| kind.segment() == segment)
        .map(|kind| (kind, id.to_string()))
}

/// Extract the ID following `/<kind>/` in a Spotify URL.
pub fn spotify_id(raw: &str, kind: SpotifyPath) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    if !is_spotify(&url) {
        return None;
    }
    kind_and_id(&url)
        .filter(|(found, _)| *found == kind)
        .map(|(_, id)| id)
}
