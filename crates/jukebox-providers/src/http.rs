//! Shared HTTP client for provider APIs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use jukebox_core::{Error, HttpError, Result};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of attempts for retryable failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_RETRY_DELAY_MS: u64 = 500;

/// Requests allowed per one-minute window before blocking ourselves.
const DEFAULT_REQUESTS_PER_MINUTE: u32 = 100;

/// Cache entry with expiration.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug)]
struct RateLimitState {
    /// Time when we can make requests again (if rate limited).
    blocked_until: Option<Instant>,
    /// Number of requests made in the current window.
    request_count: u32,
    /// Window start for request counting.
    window_start: Option<Instant>,
    /// Budget per window.
    per_minute: u32,
}

impl RateLimitState {
    const fn new(per_minute: u32) -> Self {
        Self {
            blocked_until: None,
            request_count: 0,
            window_start: None,
            per_minute,
        }
    }

    fn is_blocked(&self) -> bool {
        self.blocked_until.is_some_and(|until| Instant::now() < until)
    }

    fn block_for(&mut self, duration: Duration) {
        self.blocked_until = Some(Instant::now() + duration);
    }

    fn check_and_increment(&mut self) -> bool {
        let now = Instant::now();

        let window_duration = Duration::from_secs(60);
        match self.window_start {
            Some(start) if now.duration_since(start) <= window_duration => {}
            _ => {
                self.window_start = Some(now);
                self.request_count = 0;
            }
        }

        if self.request_count >= self.per_minute {
            return false;
        }

        self.request_count += 1;
        true
    }
}

/// JSON-over-HTTP client with retries, a self-imposed request budget and a
/// short-lived response cache.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    /// Provider name used in logs and errors.
    name: &'static str,
    cache: Arc<DashMap<String, CacheEntry<Vec<u8>>>>,
    cache_ttl: Duration,
    rate_limit_state: Arc<RwLock<RateLimitState>>,
}

impl ApiClient {
    /// Create a client for one provider.
    pub fn new(name: &'static str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("jukebox/", env!("CARGO_PKG_VERSION")))
            .timeout(DEFAULT_TIMEOUT)
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            name,
            cache: Arc::new(DashMap::new()),
            cache_ttl: Duration::from_secs(300),
            rate_limit_state: Arc::new(RwLock::new(RateLimitState::new(
                DEFAULT_REQUESTS_PER_MINUTE,
            ))),
        })
    }

    /// Set the cache TTL for responses. Zero disables caching.
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the per-minute request budget.
    pub fn with_request_budget(self, per_minute: u32) -> Self {
        *self.rate_limit_state.write() = RateLimitState::new(per_minute);
        self
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Build a URL with query parameters.
    pub fn url(base: &str, params: &[(&str, &str)]) -> Result<Url> {
        Url::parse_with_params(base, params)
            .map_err(|e| Error::Http(HttpError::InvalidUrl(format!("{base}: {e}"))))
    }

    /// GET a JSON document, retrying transient failures.
    ///
    /// A retryable failure that survives every attempt is reported as
    /// [`Error::Unavailable`].
    pub async fn get_json<R>(&self, url: &Url, bearer: Option<&str>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let cache_key = Self::cache_key(url);

        if let Some(cached) = self.get_cached(&cache_key) {
            debug!("{} cache hit for {}", self.name, url.path());
            return serde_json::from_slice(&cached).map_err(|e| Error::Parse(e.to_string()));
        }

        self.acquire_budget()?;

        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_millis(BASE_RETRY_DELAY_MS * 2u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
                debug!("Retry attempt {attempt} for {} after {delay:?}", url.path());
            }

            match self.do_get(url, bearer).await {
                Ok(response_bytes) => {
                    let parsed = serde_json::from_slice(&response_bytes).map_err(|e| {
                        Error::Parse(format!("Failed to parse {} response: {e}", self.name))
                    })?;
                    self.set_cached(cache_key, response_bytes);
                    return Ok(parsed);
                }
                Err(e) => {
                    warn!("{} request to {} failed (attempt {attempt}): {e}", self.name, url.path());

                    if let Error::RateLimited { retry_after_secs } = &e {
                        self.rate_limit_state
                            .write()
                            .block_for(Duration::from_secs(retry_after_secs.unwrap_or(60)));
                    }

                    if !e.is_retryable() {
                        return Err(e);
                    }

                    last_error = Some(e);
                }
            }
        }

        Err(Error::Unavailable(format!(
            "{} did not respond successfully after {MAX_RETRIES} attempts: {}",
            self.name,
            last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string())
        )))
    }

    /// POST a form with basic auth and parse the JSON reply. Not cached and
    /// not retried.
    pub async fn post_form<R>(
        &self,
        url: &str,
        form: &[(&str, &str)],
        basic_auth: (&str, &str),
    ) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(url)
            .basic_auth(basic_auth.0, Some(basic_auth.1))
            .form(form)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Unauthorized(format!("{} rejected credentials: {message}", self.name)));
        }
        let bytes = Self::read_success(response).await?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Parse(e.to_string()))
    }

    fn acquire_budget(&self) -> Result<()> {
        {
            let state = self.rate_limit_state.read();
            if state.is_blocked() {
                return Err(Error::RateLimited {
                    retry_after_secs: state
                        .blocked_until
                        .map(|until| until.duration_since(Instant::now()).as_secs()),
                });
            }
        }

        let mut state = self.rate_limit_state.write();
        if !state.check_and_increment() {
            state.block_for(Duration::from_secs(60));
            return Err(Error::RateLimited {
                retry_after_secs: Some(60),
            });
        }
        Ok(())
    }

    async fn do_get(&self, url: &Url, bearer: Option<&str>) -> Result<Vec<u8>> {
        let mut request = self.http.get(url.clone());
        if let Some(token) = bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::InvalidArgument(format!("Invalid bearer token: {e}")))?;
            request = request.header(AUTHORIZATION, value);
        }

        let response = request.send().await.map_err(|e| self.map_send_error(&e))?;
        Self::read_success(response).await
    }

    fn map_send_error(&self, e: &reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Http(HttpError::Timeout)
        } else if e.is_connect() {
            Error::Http(HttpError::ConnectionFailed(e.to_string()))
        } else {
            Error::Network(format!("{}: {e}", self.name))
        }
    }

    async fn read_success(response: reqwest::Response) -> Result<Vec<u8>> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());

            return Err(Error::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Http(HttpError::StatusError {
                status: status.as_u16(),
                message,
            }));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Error::Network(format!("Failed to read response body: {e}")))
    }

    fn cache_key(url: &Url) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }

    fn get_cached(&self, key: &str) -> Option<Vec<u8>> {
        let entry = self.cache.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.cache.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    fn set_cached(&self, key: String, value: Vec<u8>) {
        if self.cache_ttl.is_zero() {
            return;
        }
        self.cache.insert(key, CacheEntry::new(value, self.cache_ttl));

        // Cleanup expired entries occasionally
        if self.cache.len() > 100 {
            self.cache.retain(|_, entry| !entry.is_expired());
        }
    }

    /// Clear the cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Get the number of cached entries.
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}
