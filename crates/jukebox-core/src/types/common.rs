//! Common types shared across the workspace.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::fmt;

use serde::{Deserialize, Serialize};

/// Thumbnail image with URL and dimensions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thumbnail {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl Thumbnail {
    pub fn new(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width,
            height,
        }
    }
}

/// Collection of thumbnails at different resolutions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thumbnails(pub Vec<Thumbnail>);

impl Thumbnails {
    pub const fn new(thumbnails: Vec<Thumbnail>) -> Self {
        Self(thumbnails)
    }

    /// Get the best quality thumbnail (largest).
    pub fn best(&self) -> Option<&Thumbnail> {
        self.0.iter().max_by_key(|t| t.width * t.height)
    }

    /// URL of the best thumbnail, if any.
    pub fn best_url(&self) -> Option<String> {
        self.best().map(|t| t.url.clone())
    }

    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Duration in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Duration(pub u64);

impl Duration {
    pub const fn from_seconds(seconds: u64) -> Self {
        Self(seconds)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis / 1000)
    }

    pub const fn as_seconds(&self) -> u64 {
        self.0
    }

    /// Parse an ISO-8601 duration such as `PT1H2M3S` or `P1DT5M`.
    ///
    /// Only day and time designators are meaningful for media lengths;
    /// anything else yields `None`.
    pub fn parse_iso8601(text: &str) -> Option<Self> {
        let rest = text.strip_prefix('P')?;
        let mut total = 0u64;
        let mut number = String::new();
        let mut in_time = false;

        for c in rest.chars() {
            match c {
                '0'..='9' => number.push(c),
                'T' if number.is_empty() => in_time = true,
                'D' | 'H' | 'M' | 'S' => {
                    let value: u64 = number.parse().ok()?;
                    number.clear();
                    let unit = match (c, in_time) {
                        ('D', false) => 86_400,
                        ('H', true) => 3600,
                        ('M', true) => 60,
                        ('S', true) => 1,
                        _ => return None,
                    };
                    total = value.checked_mul(unit)?.checked_add(total)?;
                }
                _ => return None,
            }
        }

        number.is_empty().then_some(Self(total))
    }

    /// Format as MM:SS or HH:MM:SS.
    pub fn format(&self) -> String {
        let total_secs = self.0;
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{hours}:{minutes:02}:{seconds:02}")
        } else {
            format!("{minutes}:{seconds:02}")
        }
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl From<u64> for Duration {
    fn from(seconds: u64) -> Self {
        Self(seconds)
    }
}

impl From<Duration> for u64 {
    fn from(d: Duration) -> Self {
        d.0
    }
}

impl std::iter::Sum for Duration {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|d| d.0).sum())
    }
}

/// Content provider a track or search originates from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    YouTube,
    Spotify,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::YouTube => f.write_str("YouTube"),
            Self::Spotify => f.write_str("Spotify"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_format() {
        assert_eq!(Duration::from_seconds(65).format(), "1:05");
        assert_eq!(Duration::from_seconds(3661).format(), "1:01:01");
        assert_eq!(Duration::from_seconds(0).format(), "0:00");
    }

    #[test]
    fn test_parse_iso8601() {
        assert_eq!(Duration::parse_iso8601("PT3M20S"), Some(Duration(200)));
        assert_eq!(Duration::parse_iso8601("PT1H"), Some(Duration(3600)));
        assert_eq!(Duration::parse_iso8601("P1DT1S"), Some(Duration(86_401)));
        assert_eq!(Duration::parse_iso8601("P0D"), Some(Duration(0)));
        assert_eq!(Duration::parse_iso8601("PT5"), None);
        assert_eq!(Duration::parse_iso8601("3M"), None);
        assert_eq!(Duration::parse_iso8601("PT2Y"), None);
    }

    #[test]
    fn test_parse_iso8601_rejects_overflow() {
        assert_eq!(Duration::parse_iso8601("P99999999999999999D"), None);
        assert_eq!(Duration::parse_iso8601("P1DT18446744073709551615S"), None);
        assert_eq!(
            Duration::parse_iso8601("PT18446744073709551615S"),
            Some(Duration(u64::MAX))
        );
    }

    #[test]
    fn test_duration_sum() {
        let total: Duration = [Duration(30), Duration(45)].into_iter().sum();
        assert_eq!(total, Duration(75));
    }

    #[test]
    fn test_thumbnails_best() {
        let thumbs = Thumbnails::new(vec![
            Thumbnail::new("small", 100, 100),
            Thumbnail::new("large", 500, 500),
            Thumbnail::new("medium", 200, 200),
        ]);
        assert_eq!(thumbs.best().unwrap().url, "large");
        assert_eq!(thumbs.best_url().as_deref(), Some("large"));
    }
}
