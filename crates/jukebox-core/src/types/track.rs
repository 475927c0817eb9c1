//! Track type representing a single playable item.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{Duration, Provider};
use crate::deadline::{self, Detached, Stage};
use crate::resource::{AudioResource, ResourceSource};
use crate::{Error, Result};

/// Descriptive metadata of a track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackInfo {
    /// Provider item ID.
    pub id: String,
    pub title: String,
    /// URL the audio resource is built from.
    pub url: String,
    pub duration: Duration,
    pub thumbnail: Option<String>,
    pub provider: Provider,
    /// Who requested the track.
    pub added_by: String,
    pub added_at: DateTime<Utc>,
}

impl TrackInfo {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        added_by: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            duration: Duration::default(),
            thumbnail: None,
            provider: Provider::YouTube,
            added_by: added_by.into(),
            added_at: Utc::now(),
        }
    }
}

/// A queued track with a lazily constructed audio resource.
pub struct Track {
    uid: Uuid,
    pub info: TrackInfo,
    resource: Option<Arc<AudioResource>>,
    source: Arc<dyn ResourceSource>,
    prepare_timeout: Option<std::time::Duration>,
}

impl Track {
    pub fn new(
        info: TrackInfo,
        source: Arc<dyn ResourceSource>,
        prepare_timeout: Option<std::time::Duration>,
    ) -> Self {
        Self {
            uid: Uuid::new_v4(),
            info,
            resource: None,
            source,
            prepare_timeout,
        }
    }

    /// Identity of this queue entry, distinct even for repeated items.
    pub const fn uid(&self) -> Uuid {
        self.uid
    }

    pub const fn is_prepared(&self) -> bool {
        self.resource.is_some()
    }

    /// Build the audio resource, or return the one already built.
    ///
    /// Construction runs on its own task bounded by the prepare timeout. A
    /// construction that loses the race is left to finish and its resource
    /// is dropped as soon as it arrives.
    pub async fn prepare(&mut self) -> Result<Arc<AudioResource>> {
        if let Some(resource) = &self.resource {
            return Ok(resource.clone());
        }

        let source = self.source.clone();
        let url = self.info.url.clone();
        let built = deadline::guard_detached(Stage::PrepareResource, self.prepare_timeout, async move {
            source.open(&url).await
        })
        .await;

        match built {
            Ok(Ok(resource)) => {
                let resource = Arc::new(resource);
                debug!(track = %self.info.id, resource = %resource.id(), "Prepared track");
                self.resource = Some(resource.clone());
                Ok(resource)
            }
            Ok(Err(e)) => Err(e),
            Err(Detached::TimedOut(timed_out)) => Err(Error::Timeout(timed_out)),
            Err(Detached::Panicked(reason)) => Err(Error::Internal(reason)),
        }
    }

    /// Release the prepared resource, if any.
    pub fn unprepare(&mut self) {
        if let Some(resource) = self.resource.take() {
            debug!(track = %self.info.id, resource = %resource.id(), "Released track resource");
        }
    }

    /// Hand the prepared resource over to a player. The track is no longer
    /// prepared afterwards.
    pub fn consume(&mut self) -> Option<Arc<AudioResource>> {
        self.resource.take()
    }

    /// Side-effect free view for logging and display.
    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            uid: self.uid,
            info: self.info.clone(),
            prepared: self.is_prepared(),
        }
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("uid", &self.uid)
            .field("info", &self.info)
            .field("prepared", &self.is_prepared())
            .finish_non_exhaustive()
    }
}

/// Serializable view of a track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackSnapshot {
    pub uid: Uuid,
    #[serde(flatten)]
    pub info: TrackInfo,
    pub prepared: bool,
}
