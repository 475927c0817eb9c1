//! Playable audio resources and the seam that constructs them.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::Result;

/// A chunk of streamed audio data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Data(Bytes),
    Complete,
    Error(String),
}

/// Audio payload handed to a player.
pub enum AudioBody {
    /// Complete audio already in memory.
    Buffered(Bytes),
    /// Audio arriving as it is downloaded.
    Streaming(mpsc::Receiver<StreamChunk>),
}

impl fmt::Debug for AudioBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(data) => write!(f, "Buffered({} bytes)", data.len()),
            Self::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

/// A prepared audio resource.
///
/// Owns the background work producing its data; dropping the resource
/// aborts that work.
pub struct AudioResource {
    id: Uuid,
    source_url: String,
    mime_type: Option<String>,
    body: Mutex<Option<AudioBody>>,
    producer: Option<JoinHandle<()>>,
}

impl AudioResource {
    /// Resource backed by in-memory data.
    pub fn buffered(source_url: impl Into<String>, data: Bytes, mime_type: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_url: source_url.into(),
            mime_type,
            body: Mutex::new(Some(AudioBody::Buffered(data))),
            producer: None,
        }
    }

    /// Resource fed by a producer task through a chunk channel.
    pub fn streaming(
        source_url: impl Into<String>,
        rx: mpsc::Receiver<StreamChunk>,
        producer: JoinHandle<()>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_url: source_url.into(),
            mime_type: None,
            body: Mutex::new(Some(AudioBody::Streaming(rx))),
            producer: Some(producer),
        }
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Take the audio payload. Returns `None` once a player has taken it.
    pub fn take_body(&self) -> Option<AudioBody> {
        self.body.lock().take()
    }

    pub fn is_consumed(&self) -> bool {
        self.body.lock().is_none()
    }
}

impl fmt::Debug for AudioResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioResource")
            .field("id", &self.id)
            .field("source_url", &self.source_url)
            .field("mime_type", &self.mime_type)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

impl Drop for AudioResource {
    fn drop(&mut self) {
        if let Some(producer) = &self.producer {
            producer.abort();
        }
    }
}

/// Builds audio resources for track URLs.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    async fn open(&self, url: &str) -> Result<AudioResource>;
}
