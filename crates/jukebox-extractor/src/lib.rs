//! # jukebox-extractor
//!
//! Audio resources for `YouTube` videos, downloaded with yt-dlp.
//!
//! - Finished downloads are kept on disk and served from memory on replay
//! - Uncached audio streams to the player while yt-dlp is still running
//! - Dropping the resource kills the download

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use jukebox_core::urls::youtube_video_id;
use jukebox_core::{AudioResource, Error, ResourceSource, Result, StreamChunk};

const FORMAT_SELECTOR: &str = "251/250/140/bestaudio[ext=webm]/bestaudio[ext=m4a]/bestaudio";

const READ_BUFFER: usize = 64 * 1024;

/// Authentication passed to yt-dlp.
#[derive(Debug, Clone, Default)]
pub enum AuthMethod {
    /// Use cookies from an installed browser profile.
    BrowserCookies(String),
    /// Netscape-format cookies file.
    CookiesFile(PathBuf),
    #[default]
    None,
}

impl AuthMethod {
    fn to_args(&self) -> Vec<String> {
        match self {
            Self::BrowserCookies(browser) => {
                vec!["--cookies-from-browser".to_string(), browser.clone()]
            }
            Self::CookiesFile(path) => {
                vec!["--cookies".to_string(), path.display().to_string()]
            }
            Self::None => vec![],
        }
    }
}

/// [`ResourceSource`] running yt-dlp with a disk cache.
pub struct YtDlpSource {
    yt_dlp_path: PathBuf,
    cache_dir: PathBuf,
    auth_method: AuthMethod,
}

impl YtDlpSource {
    /// Use the bundled yt-dlp in the cache directory when present, otherwise
    /// whatever `yt-dlp` is on `PATH`.
    pub fn new() -> Self {
        let dirs = directories::ProjectDirs::from("", "", "jukebox");

        let yt_dlp_path = dirs
            .as_ref()
            .map(|d| d.cache_dir().join("yt-dlp"))
            .filter(|p| p.exists())
            .unwrap_or_else(|| PathBuf::from("yt-dlp"));

        let cache_dir = dirs
            .as_ref()
            .map_or_else(|| PathBuf::from(".cache/audio"), |d| d.cache_dir().join("audio"));

        Self::with_paths(yt_dlp_path, cache_dir)
    }

    pub fn with_paths(yt_dlp_path: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!("Failed to create audio cache at {cache_dir:?}: {e}");
        }
        Self {
            yt_dlp_path: yt_dlp_path.into(),
            cache_dir,
            auth_method: AuthMethod::default(),
        }
    }

    #[must_use]
    pub fn with_auth_method(mut self, auth_method: AuthMethod) -> Self {
        self.auth_method = auth_method;
        self
    }

    pub const fn auth_method(&self) -> &AuthMethod {
        &self.auth_method
    }

    /// Clear the disk cache.
    pub fn clear_cache(&self) {
        if let Err(e) = fs::remove_dir_all(&self.cache_dir) {
            warn!("Failed to clear cache: {e}");
        }
        let _ = fs::create_dir_all(&self.cache_dir);
        info!("Audio cache cleared");
    }

    pub fn is_cached(&self, video_id: &str) -> bool {
        fs::metadata(self.cache_path(video_id)).is_ok_and(|m| m.len() > 0)
    }

    fn cache_path(&self, video_id: &str) -> PathBuf {
        self.cache_dir.join(format!("{video_id}.audio"))
    }

    fn load_from_cache(&self, video_id: &str) -> Option<Vec<u8>> {
        let path = self.cache_path(video_id);
        match fs::read(&path) {
            Ok(data) if data.is_empty() => {
                let _ = fs::remove_file(&path);
                None
            }
            Ok(data) => Some(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Failed to read cache: {e}");
                None
            }
        }
    }

    fn args(&self, url: &str) -> Vec<String> {
        let mut args = self.auth_method.to_args();
        args.extend([
            "--no-warnings".to_string(),
            "--no-progress".to_string(),
            "--no-playlist".to_string(),
            "-f".to_string(),
            FORMAT_SELECTOR.to_string(),
            "-o".to_string(),
            "-".to_string(),
            url.to_string(),
        ]);
        args
    }
}

impl Default for YtDlpSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceSource for YtDlpSource {
    async fn open(&self, url: &str) -> Result<AudioResource> {
        let video_id = youtube_video_id(url)
            .ok_or_else(|| Error::InvalidArgument(format!("Not a YouTube video URL: {url}")))?;

        if let Some(data) = self.load_from_cache(&video_id) {
            let mime_type = detect_audio_mime(&data);
            info!("Cache hit for {video_id} ({} bytes, {mime_type})", data.len());
            return Ok(AudioResource::buffered(url, Bytes::from(data), Some(mime_type.to_string())));
        }

        info!("Cache miss, streaming {video_id}");
        let child = Command::new(&self.yt_dlp_path)
            .args(self.args(url))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::ExtractionFailed(format!("Failed to run {:?}: {e}", self.yt_dlp_path))
            })?;

        let (tx, rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel();
        let producer = tokio::spawn(pump(child, tx, ready_tx, self.cache_path(&video_id)));

        // The resource owns the producer from here on, so bailing out below
        // also stops the download.
        let resource = AudioResource::streaming(url, rx, producer);
        match ready_rx.await {
            Ok(Ok(())) => Ok(resource),
            Ok(Err(message)) => Err(Error::ExtractionFailed(message)),
            Err(_) => Err(Error::ExtractionFailed(
                "yt-dlp stopped before producing audio".to_string(),
            )),
        }
    }
}

/// Forward yt-dlp's stdout into `tx`, caching the full download on success.
/// `ready` fires with the first bytes or the first failure.
async fn pump(
    mut child: Child,
    tx: mpsc::Sender<StreamChunk>,
    ready: oneshot::Sender<std::result::Result<(), String>>,
    cache_path: PathBuf,
) {
    let mut ready = Some(ready);
    let fail = |ready: &mut Option<oneshot::Sender<_>>, message: String| {
        if let Some(ready) = ready.take() {
            let _ = ready.send(Err(message.clone()));
        }
        message
    };

    let Some(mut stdout) = child.stdout.take() else {
        fail(&mut ready, "Failed to capture yt-dlp stdout".to_string());
        return;
    };

    let mut all_data = Vec::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        match stdout.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                all_data.extend_from_slice(&buffer[..n]);
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(()));
                }
                if tx.send(StreamChunk::Data(Bytes::copy_from_slice(&buffer[..n]))).await.is_err() {
                    debug!("Receiver dropped, stopping yt-dlp");
                    let _ = child.kill().await;
                    return;
                }
            }
            Err(e) => {
                let message = fail(&mut ready, format!("Read error: {e}"));
                let _ = tx.send(StreamChunk::Error(message)).await;
                return;
            }
        }
    }

    let outcome = match child.wait().await {
        Ok(status) if status.success() && !all_data.is_empty() => Ok(()),
        Ok(status) if status.success() => Err("yt-dlp returned empty data".to_string()),
        Ok(status) => Err(format!("yt-dlp exited with code {:?}", status.code())),
        Err(e) => Err(format!("Failed to wait for yt-dlp: {e}")),
    };

    match outcome {
        Ok(()) => {
            save_to_cache(&cache_path, &all_data);
            let _ = tx.send(StreamChunk::Complete).await;
        }
        Err(message) => {
            let message = fail(&mut ready, message);
            warn!("{message}");
            let _ = tx.send(StreamChunk::Error(message)).await;
        }
    }
}

fn save_to_cache(path: &Path, data: &[u8]) {
    if let Err(e) = fs::write(path, data) {
        warn!("Failed to write cache: {e}");
    } else {
        debug!("Cached {} bytes to {path:?}", data.len());
    }
}

/// Detect audio MIME type from magic bytes.
fn detect_audio_mime(data: &[u8]) -> &'static str {
    if data.len() < 12 {
        return "audio/unknown";
    }
    if data.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return "audio/webm";
    }
    if &data[4..8] == b"ftyp" {
        return "audio/mp4";
    }
    if data.starts_with(b"ID3") || (data[0] == 0xFF && (data[1] & 0xE0) == 0xE0) {
        return "audio/mpeg";
    }
    if data.starts_with(b"OggS") {
        return "audio/ogg";
    }
    "audio/unknown"
}
