//! Queue management types.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::VecDeque;

use rand::seq::SliceRandom;
use thiserror::Error;
use uuid::Uuid;

use super::{Duration, Track, TrackSnapshot};

/// The queue already holds its configured maximum.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("The queue is full ({max_size} tracks)")]
pub struct QueueFull {
    pub max_size: usize,
}

/// Ordered tracks waiting to be played.
///
/// FIFO with insertion at arbitrary positions. Never holds more than
/// `max_size` tracks unless `max_size` is 0 (unlimited).
#[derive(Debug, Default)]
pub struct Queue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl Queue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    pub const fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Free slots, or `None` when unlimited.
    pub fn remaining_capacity(&self) -> Option<usize> {
        (self.max_size > 0).then(|| self.max_size.saturating_sub(self.items.len()))
    }

    fn is_full(&self) -> bool {
        self.remaining_capacity() == Some(0)
    }

    /// The next track to be played.
    pub fn head(&self) -> Option<&Track> {
        self.items.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    /// Append a track.
    pub fn push(&mut self, track: Track) -> Result<(), QueueFull> {
        if self.is_full() {
            return Err(QueueFull {
                max_size: self.max_size,
            });
        }
        self.items.push_back(track);
        Ok(())
    }

    /// Insert a track at `index`, clamped to the end of the queue.
    pub fn insert(&mut self, index: usize, track: Track) -> Result<(), QueueFull> {
        if self.is_full() {
            return Err(QueueFull {
                max_size: self.max_size,
            });
        }
        let index = index.min(self.items.len());
        self.items.insert(index, track);
        Ok(())
    }

    /// Insert tracks in order starting at `index` (appending when `None`).
    /// Tracks beyond the capacity are handed back.
    pub fn insert_all(&mut self, index: Option<usize>, tracks: Vec<Track>) -> Vec<Track> {
        let mut at = index.map_or(self.items.len(), |i| i.min(self.items.len()));
        let mut rejected = Vec::new();
        for track in tracks {
            if self.is_full() {
                rejected.push(track);
            } else {
                self.items.insert(at, track);
                at += 1;
            }
        }
        rejected
    }

    /// Remove and return the head of the queue.
    pub fn pop_front(&mut self) -> Option<Track> {
        self.items.pop_front()
    }

    /// Put a track back at the head. Always succeeds: the slot was just
    /// vacated by the caller's `pop_front`.
    pub fn restore_front(&mut self, track: Track) {
        self.items.push_front(track);
    }

    /// Remove the track at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        self.items.remove(index)
    }

    /// Remove every track whose uid is listed, returning how many were removed.
    pub fn remove_uids(&mut self, uids: &[Uuid]) -> usize {
        let before = self.items.len();
        self.items.retain(|t| !uids.contains(&t.uid()));
        before - self.items.len()
    }

    /// Shuffle the queue in place.
    pub fn shuffle(&mut self) {
        self.items.make_contiguous().shuffle(&mut rand::rng());
    }

    /// Remove everything, returning how many tracks were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        count
    }

    /// Sum of the queued track durations.
    pub fn total_duration(&self) -> Duration {
        self.items.iter().map(|t| t.info.duration).sum()
    }

    pub fn snapshot(&self) -> Vec<TrackSnapshot> {
        self.items.iter().map(Track::snapshot).collect()
    }
}
