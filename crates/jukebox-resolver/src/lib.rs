//! # jukebox-resolver
//!
//! Classifies raw queries, fetches candidates from the content providers and
//! turns them into queueable tracks. Free-text lookups pick the candidate
//! whose title is closest to the query by normalized edit distance.

pub mod error;
pub mod resolver;
pub mod search;
pub mod similarity;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{ClassifyError, ItemError, ItemFailure, ResolveError};
pub use resolver::{PlaylistMeta, Resolution, ResolutionReport, Resolver};
pub use search::{Search, Source, Subtype};
