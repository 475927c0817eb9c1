//! Timeout guards for suspension points.
//!
//! Every await that depends on something outside the process (voice
//! connection readiness, provider calls, resource preparation, playback
//! start) goes through one of these guards. A limit of `None` waits forever.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// A named suspension point with its own configured bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Connect,
    FetchResults,
    PrepareResource,
    Play,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connecting to the voice channel",
            Self::FetchResults => "fetching results",
            Self::PrepareResource => "preparing the audio resource",
            Self::Play => "starting playback",
        };
        f.write_str(name)
    }
}

/// A guarded future did not finish within its bound.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Timed out {stage} after {}s", limit.as_secs())]
pub struct TimedOut {
    pub stage: Stage,
    pub limit: Duration,
}

/// Convert a configured number of seconds into a limit, 0 meaning unlimited.
pub const fn limit_from_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

/// Await `fut`, giving up after `limit`.
///
/// On timeout the future is dropped in place, so this is only for futures
/// whose partial work is released by `Drop`.
pub async fn guard<F, T>(stage: Stage, limit: Option<Duration>, fut: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    match limit {
        None => Ok(fut.await),
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TimedOut { stage, limit }),
    }
}

/// Run `fut` on its own task and wait for it, giving up after `limit`.
///
/// The task is never aborted: when the bound is hit it keeps running in the
/// background and whatever it eventually produces is dropped on completion.
/// This is the acquire-then-abandon shape used for upstream calls that
/// cannot be cancelled cleanly.
pub async fn guard_detached<F, T>(
    stage: Stage,
    limit: Option<Duration>,
    fut: F,
) -> Result<T, Detached>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(fut);
    match guard(stage, limit, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join)) => Err(Detached::Panicked(join.to_string())),
        Err(timed_out) => Err(Detached::TimedOut(timed_out)),
    }
}

/// Failure of a detached guarded task.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Detached {
    #[error(transparent)]
    TimedOut(#[from] TimedOut),
    #[error("Background task failed: {0}")]
    Panicked(String),
}
