//! Core domain types for Jukebox.

pub mod common;
pub mod queue;
pub mod track;

pub use common::*;
pub use queue::{Queue, QueueFull};
pub use track::{Track, TrackInfo, TrackSnapshot};
