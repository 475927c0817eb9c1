//! # jukebox-providers
//!
//! Metadata clients for the `YouTube` Data API and the Spotify Web API.

pub mod http;
pub mod spotify;
pub mod youtube;

pub use http::ApiClient;
pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;
