//! Runtime configuration.
//!
//! Loaded from `config.toml` in the platform config directory, with
//! credentials overridable from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::deadline::limit_from_secs;
use crate::{Error, Result};

const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Maximum number of queued tracks per room (0 = unlimited).
    pub max_queue_size: usize,
    /// Minimum similarity (0..1) a fuzzy text match must reach.
    pub levenshtein_threshold: f64,
    /// Upper bound on tracks produced by a single resolution.
    pub max_resolve_items: usize,
    /// Number of candidates requested from a text search.
    pub text_candidates: usize,
    pub timeouts: Timeouts,
    pub credentials: Credentials,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_queue_size: 0,
            levenshtein_threshold: 0.25,
            max_resolve_items: 100,
            text_candidates: 3,
            timeouts: Timeouts::default(),
            credentials: Credentials::default(),
        }
    }
}

/// Named timeouts in seconds, 0 meaning unlimited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Timeouts {
    pub connect: u64,
    pub fetch_results: u64,
    pub prepare_resource: u64,
    pub play: u64,
    /// Inactivity before an idle room leaves its voice channel.
    pub leave_voice: u64,
    /// Time an inactive room keeps its queue before it is forgotten.
    pub clear_queue: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: 10,
            fetch_results: 30,
            prepare_resource: 15,
            play: 10,
            leave_voice: 300,
            clear_queue: 900,
        }
    }
}

impl Timeouts {
    pub const fn connect(&self) -> Option<Duration> {
        limit_from_secs(self.connect)
    }

    pub const fn fetch_results(&self) -> Option<Duration> {
        limit_from_secs(self.fetch_results)
    }

    pub const fn prepare_resource(&self) -> Option<Duration> {
        limit_from_secs(self.prepare_resource)
    }

    pub const fn play(&self) -> Option<Duration> {
        limit_from_secs(self.play)
    }

    pub const fn leave_voice(&self) -> Option<Duration> {
        limit_from_secs(self.leave_voice)
    }

    pub const fn clear_queue(&self) -> Option<Duration> {
        limit_from_secs(self.clear_queue)
    }
}

/// Provider credentials.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Credentials {
    pub youtube_api_key: Option<String>,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("youtube_api_key", &mask(&self.youtube_api_key))
            .field("spotify_client_id", &mask(&self.spotify_client_id))
            .field("spotify_client_secret", &mask(&self.spotify_client_secret))
            .finish()
    }
}

impl Credentials {
    /// Whether both halves of the Spotify client credentials are present.
    pub const fn has_spotify(&self) -> bool {
        self.spotify_client_id.is_some() && self.spotify_client_secret.is_some()
    }
}

impl Config {
    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "jukebox").map(|d| d.config_dir().join(CONFIG_FILE))
    }

    /// Load from the default path, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        let config = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };
        config.with_env_overrides().validated()
    }

    /// Load from an explicit file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&text)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply `JUKEBOX_*` credential variables on top of the file values.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        if let Some(key) = var("JUKEBOX_YOUTUBE_API_KEY") {
            self.credentials.youtube_api_key = Some(key);
        }
        if let Some(id) = var("JUKEBOX_SPOTIFY_CLIENT_ID") {
            self.credentials.spotify_client_id = Some(id);
        }
        if let Some(secret) = var("JUKEBOX_SPOTIFY_CLIENT_SECRET") {
            self.credentials.spotify_client_secret = Some(secret);
        }
        self
    }

    /// Check ranges, returning the config unchanged when valid.
    pub fn validated(self) -> Result<Self> {
        if !(0.0..=1.0).contains(&self.levenshtein_threshold) {
            return Err(Error::Config(format!(
                "levenshtein_threshold must be within 0..1, got {}",
                self.levenshtein_threshold
            )));
        }
        if self.text_candidates == 0 {
            return Err(Error::Config("text_candidates must be at least 1".into()));
        }
        if self.max_resolve_items == 0 {
            return Err(Error::Config("max_resolve_items must be at least 1".into()));
        }
        Ok(self)
    }

    /// Number of items a resolution may produce given the current queue
    /// length, honoring both the queue cap and the per-call cap.
    pub fn resolve_budget(&self, queued: usize) -> usize {
        if self.max_queue_size == 0 {
            self.max_resolve_items
        } else {
            self.max_queue_size
                .saturating_sub(queued)
                .min(self.max_resolve_items)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validated().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r"
            max_queue_size = 50

            [timeouts]
            connect = 0
            ",
        )
        .unwrap();
        assert_eq!(config.max_queue_size, 50);
        assert_eq!(config.timeouts.connect(), None);
        assert_eq!(config.timeouts.play, Timeouts::default().play);
        assert_eq!(config.text_candidates, 3);
    }

    #[test]
    fn test_threshold_out_of_range() {
        let config = Config {
            levenshtein_threshold: 1.5,
            ..Config::default()
        };
        assert!(matches!(config.validated(), Err(Error::Config(_))));
    }

    #[test]
    fn test_resolve_budget() {
        let unlimited = Config::default();
        assert_eq!(unlimited.resolve_budget(1000), 100);

        let capped = Config {
            max_queue_size: 10,
            ..Config::default()
        };
        assert_eq!(capped.resolve_budget(4), 6);
        assert_eq!(capped.resolve_budget(10), 0);
        assert_eq!(capped.resolve_budget(12), 0);
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials {
            youtube_api_key: Some("secret".into()),
            ..Credentials::default()
        };
        let printed = format!("{creds:?}");
        assert!(!printed.contains("secret"));
        assert!(printed.contains("<redacted>"));
    }
}
