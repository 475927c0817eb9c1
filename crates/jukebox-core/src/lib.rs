//! # jukebox-core
//!
//! Core types, traits, configuration and error handling shared by the
//! Jukebox crates.

pub mod config;
pub mod deadline;
pub mod error;
pub mod provider;
pub mod resource;
pub mod types;
pub mod urls;

pub use config::{Config, Credentials, Timeouts};
pub use deadline::{Stage, TimedOut};
pub use error::{Error, HttpError, Result};
pub use provider::{
    CatalogCollection, CatalogTrack, CollectionKind, ItemKind, LiveStatus, MusicCatalog,
    PlaylistInfo, PlaylistPage, Privacy, VideoItem, VideoProvider,
};
pub use resource::{AudioBody, AudioResource, ResourceSource, StreamChunk};
pub use types::*;
