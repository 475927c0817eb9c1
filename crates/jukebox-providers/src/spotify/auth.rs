//! Client-credentials token handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jukebox_core::{Error, Result};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::types::TokenResponse;
use crate::http::ApiClient;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Remaining lifetime under which a background refresh is started.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Token {
    value: String,
    expires_at: Instant,
}

impl Token {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn is_expiring(&self) -> bool {
        Instant::now() + REFRESH_MARGIN >= self.expires_at
    }
}

/// Shared bearer token for the Web API.
///
/// A token close to expiry is still handed out while a detached task fetches
/// its replacement. Concurrent refreshes are possible and harmless; the last
/// one to finish wins.
#[derive(Clone)]
pub struct TokenStore {
    api: ApiClient,
    client_id: String,
    client_secret: String,
    token: Arc<Mutex<Option<Token>>>,
    refreshing: Arc<AtomicBool>,
}

impl TokenStore {
    pub fn new(api: ApiClient, client_id: String, client_secret: String) -> Self {
        Self {
            api,
            client_id,
            client_secret,
            token: Arc::new(Mutex::new(None)),
            refreshing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A usable bearer token, fetching one first when none is held.
    pub async fn access_token(&self) -> Result<String> {
        let current = self.token.lock().clone();
        match current {
            Some(token) if !token.is_expired() => {
                if token.is_expiring() {
                    self.refresh_in_background();
                }
                Ok(token.value)
            }
            _ => self.refresh().await,
        }
    }

    /// Forget the held token after the API rejected it.
    pub fn invalidate(&self) {
        self.token.lock().take();
    }

    fn refresh_in_background(&self) {
        if self.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }
        let store = self.clone();
        tokio::spawn(async move {
            if let Err(e) = store.refresh().await {
                warn!("Background Spotify token refresh failed: {e}");
            }
            store.refreshing.store(false, Ordering::Release);
        });
    }

    async fn refresh(&self) -> Result<String> {
        debug!("Requesting Spotify access token");
        let response: TokenResponse = self
            .api
            .post_form(
                TOKEN_URL,
                &[("grant_type", "client_credentials")],
                (self.client_id.as_str(), self.client_secret.as_str()),
            )
            .await?;

        if !response.token_type.eq_ignore_ascii_case("bearer") {
            return Err(Error::Parse(format!(
                "Unexpected token type {}",
                response.token_type
            )));
        }

        self.store(response.access_token.clone(), Duration::from_secs(response.expires_in));
        Ok(response.access_token)
    }

    fn store(&self, value: String, lifetime: Duration) {
        *self.token.lock() = Some(Token {
            value,
            expires_at: Instant::now() + lifetime,
        });
    }
}
