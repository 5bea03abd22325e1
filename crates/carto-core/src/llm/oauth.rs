//! OAuth bearer-token cache for the Anthropic provider.
//!
//! The cache holds the current access/refresh token pair plus its expiry.
//! Token state is component state (one cache per gateway), protected by a
//! single async mutex held across the refresh exchange, so an expired
//! token triggers exactly one refresh no matter how many callers race.

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::OauthCredentials;
use crate::error::{CartoError, CartoResult};

/// Production token endpoint.
const TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";

/// Public OAuth client id for CLI-style token refresh.
const CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";

/// Refresh the access token this many milliseconds before its stated
/// expiry, so an in-flight request never rides an about-to-expire token.
const EXPIRY_MARGIN_MS: i64 = 60_000;

/// Wire shape of a refresh exchange response.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
    /// Lifetime of the new access token, in seconds.
    expires_in: i64,
}

/// Cached bearer credentials with single-flight refresh.
pub struct TokenCache {
    state: Mutex<OauthCredentials>,
    http: reqwest::Client,
    token_url: String,
}

impl TokenCache {
    /// Create a cache seeded with stored credentials.
    pub fn new(credentials: OauthCredentials, http: reqwest::Client) -> Self {
        Self {
            state: Mutex::new(credentials),
            http,
            token_url: TOKEN_URL.into(),
        }
    }

    /// Create a cache pointed at a different token endpoint (tests).
    pub fn with_token_url(
        credentials: OauthCredentials,
        http: reqwest::Client,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            state: Mutex::new(credentials),
            http,
            token_url: token_url.into(),
        }
    }

    /// Return a valid access token, refreshing it first when expired.
    ///
    /// The mutex is held across the refresh exchange: racing callers queue
    /// on the lock, and whichever one finds the token expired performs the
    /// single refresh. Everyone behind it re-checks the expiry and sees the
    /// fresh token.
    pub async fn bearer(&self) -> CartoResult<String> {
        let mut state = self.state.lock().await;

        if state.expires_at > now_ms() + EXPIRY_MARGIN_MS {
            return Ok(state.access_token.clone());
        }

        tracing::debug!("access token expired, refreshing");
        let refreshed = self.exchange(&state.refresh_token).await?;

        state.access_token = refreshed.access_token;
        state.refresh_token = refreshed.refresh_token;
        state.expires_at = now_ms() + refreshed.expires_in * 1000;

        Ok(state.access_token.clone())
    }

    /// Exchange the refresh token for a new access/refresh pair.
    async fn exchange(&self, refresh_token: &str) -> CartoResult<RefreshResponse> {
        let body = serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
            "client_id": CLIENT_ID,
        });

        let response = self
            .http
            .post(&self.token_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CartoError::Llm {
                message: format!("token refresh request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CartoError::Llm {
                message: format!("token refresh failed: HTTP {status}: {body}"),
            });
        }

        response.json().await.map_err(|e| CartoError::Llm {
            message: format!("token refresh response malformed: {e}"),
        })
    }

    /// Snapshot of the current refresh token (persisted by the caller
    /// after a run so the rotated token survives restarts).
    pub async fn credentials(&self) -> OauthCredentials {
        self.state.lock().await.clone()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(expires_at: i64) -> OauthCredentials {
        OauthCredentials {
            access_token: "at-old".into(),
            refresh_token: "rt-old".into(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_valid_token_returned_without_refresh() {
        let cache = TokenCache::new(creds(now_ms() + 3_600_000), reqwest::Client::new());
        let token = cache.bearer().await.expect("bearer");
        assert_eq!(token, "at-old");
    }

    #[tokio::test]
    async fn test_expired_token_refresh_failure_surfaces() {
        // Point at a closed port so the refresh attempt fails fast.
        let cache = TokenCache::with_token_url(
            creds(0),
            reqwest::Client::new(),
            "http://127.0.0.1:9/token",
        );
        let err = cache.bearer().await.expect_err("refresh should fail");
        assert!(err.to_string().starts_with("llm: "));
    }
}
