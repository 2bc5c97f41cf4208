//! OAuth access tokens for the activity API.
//!
//! Policy: cache-aside with an expiry check. A cached token that stays valid
//! for at least [`EXPIRY_SKEW_SECS`] more seconds is reused without touching
//! the network. Otherwise the refresh token (the rotated one from the cache
//! when available, else the configured one) is exchanged once, and the new
//! token set is written back to the cache.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{ClientCredentials, JournalConfig};
use crate::error::AuthError;
use crate::store::write_private;

/// Cached tokens expiring sooner than this are refreshed.
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// Short-lived bearer credential.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCredential {
    token: String,
    expires_at: Option<i64>,
}

impl AccessCredential {
    pub fn new(token: impl Into<String>, expires_at: Option<i64>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Unix seconds, when the token endpoint reported one.
    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }

    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl std::fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// On-disk token cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

impl TokenSet {
    /// Usable at `now` with the skew margin to spare.
    pub fn is_fresh(&self, now: i64) -> bool {
        !self.access_token.is_empty()
            && self
                .expires_at
                .is_some_and(|expires| expires - EXPIRY_SKEW_SECS > now)
    }
}

/// Token endpoint response. Every field optional so a missing one is
/// reported by name.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
}

/// Exchanges the refresh token for access tokens.
pub struct CredentialProvider {
    client: Client,
    token_url: String,
    credentials: ClientCredentials,
    cache_path: PathBuf,
}

impl CredentialProvider {
    pub fn new(config: &JournalConfig, credentials: ClientCredentials) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AuthError::Transport {
                details: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            token_url: config.endpoints.token_url.clone(),
            credentials,
            cache_path: config.journal.token_cache.clone(),
        })
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Cached token if still fresh, else a newly exchanged one.
    pub async fn obtain_access_credential(&self) -> Result<AccessCredential, AuthError> {
        self.obtain_at(Utc::now().timestamp()).await
    }

    /// [`obtain_access_credential`](Self::obtain_access_credential) against
    /// an explicit clock.
    pub async fn obtain_at(&self, now: i64) -> Result<AccessCredential, AuthError> {
        let cached = self.load_cache();
        if let Some(tokens) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            info!(
                "Using cached access token (expires in {}s)",
                tokens.expires_at.unwrap_or(now) - now
            );
            return Ok(AccessCredential::new(&tokens.access_token, tokens.expires_at));
        }

        let refresh_token = cached
            .as_ref()
            .and_then(|t| t.refresh_token.as_deref())
            .filter(|t| !t.is_empty())
            .unwrap_or(self.credentials.refresh_token.as_str())
            .to_string();

        let tokens = self.exchange(&refresh_token, now).await?;
        self.store_cache(&tokens);
        info!("Access token refreshed");
        Ok(AccessCredential::new(tokens.access_token, tokens.expires_at))
    }

    async fn exchange(&self, refresh_token: &str, now: i64) -> Result<TokenSet, AuthError> {
        debug!("Exchanging refresh token at {}", self.token_url);
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Transport {
                details: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AuthError::Transport {
            details: format!("Body download error: {}", e),
        })?;

        if !status.is_success() {
            return Err(AuthError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| AuthError::Decode {
            details: e.to_string(),
        })?;
        let access_token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingField {
                field: "access_token",
            })?;

        Ok(TokenSet {
            access_token,
            refresh_token: parsed
                .refresh_token
                .or_else(|| Some(refresh_token.to_string())),
            expires_at: parsed
                .expires_at
                .or_else(|| parsed.expires_in.map(|secs| now + secs)),
        })
    }

    fn load_cache(&self) -> Option<TokenSet> {
        let bytes = match fs::read(&self.cache_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Ignoring unreadable token cache {}: {}", self.cache_path.display(), e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                warn!("Ignoring corrupt token cache {}: {}", self.cache_path.display(), e);
                None
            }
        }
    }

    fn store_cache(&self, tokens: &TokenSet) {
        let result = serde_json::to_vec_pretty(tokens)
            .map_err(std::io::Error::other)
            .and_then(|json| write_private(&self.cache_path, &json));
        match result {
            Ok(()) => debug!("Saved tokens to {}", self.cache_path.display()),
            Err(e) => warn!("Failed to save token cache {}: {}", self.cache_path.display(), e),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
