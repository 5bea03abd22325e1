//! Provider-agnostic LLM gateway.
//!
//! One gateway instance is shared by every concurrent caller in a run. A
//! process-wide semaphore (default 10 permits) bounds in-flight requests;
//! callers suspend on acquisition and are admitted in arrival order.
//! Per-batch bounds in the analyzers compose with this one.
//!
//! The gateway never retries: transport failures, non-2xx responses (with
//! the vendor body surfaced), missing text blocks, and JSON-extraction
//! failures are all reported to the caller, which decides whether to drop
//! the unit or abort.

pub mod json;
pub mod oauth;
mod provider;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{LlmConfig, OauthCredentials};
use crate::error::{CartoError, CartoResult};

/// Which model class a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// High-volume per-chunk summaries.
    Fast,
    /// Per-module and system-wide synthesis.
    Deep,
}

/// A text-completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt.
    pub system: String,
    /// User prompt.
    pub prompt: String,
    /// Completion token budget.
    pub max_tokens: u32,
    /// Fast or deep model class.
    pub tier: ModelTier,
}

/// Shared, bounded text-completion client.
pub struct LlmGateway {
    config: LlmConfig,
    http: reqwest::Client,
    semaphore: Semaphore,
    oauth: Option<oauth::TokenCache>,
    endpoint: String,
}

impl LlmGateway {
    /// Build a gateway from configuration.
    ///
    /// No request timeout is set here: LLM latency can be minutes, and the
    /// caller's cancellation token is the backstop.
    pub fn new(config: &LlmConfig) -> CartoResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CartoError::Llm {
                message: format!("HTTP client construction failed: {e}"),
            })?;

        let oauth = config
            .oauth
            .clone()
            .map(|credentials| oauth::TokenCache::new(credentials, http.clone()));

        Ok(Self {
            endpoint: provider::endpoint(config),
            config: config.clone(),
            semaphore: Semaphore::new(config.max_concurrent.max(1)),
            oauth,
            http,
        })
    }

    /// Gateway with an injected OAuth cache (tests point the cache at a
    /// local token endpoint).
    pub fn with_oauth_cache(config: &LlmConfig, cache: oauth::TokenCache) -> CartoResult<Self> {
        let mut gateway = Self::new(config)?;
        gateway.oauth = Some(cache);
        Ok(gateway)
    }

    /// Run one completion. Suspends on the gateway semaphore, honors
    /// cancellation at both the acquisition and the HTTP await.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> CartoResult<String> {
        let _permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CartoError::Cancelled),
            permit = self.semaphore.acquire() => permit.map_err(|_| CartoError::Llm {
                message: "gateway semaphore closed".into(),
            })?,
        };

        let bearer = match &self.oauth {
            Some(cache) => Some(tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CartoError::Cancelled),
                token = cache.bearer() => token?,
            }),
            None => None,
        };

        let model = provider::model_for(&self.config, request.tier);
        let body = provider::build_body(&self.config, request, &model);

        let builder = self.http.post(&self.endpoint).json(&body);
        let builder = provider::apply_headers(&self.config, builder, bearer.as_deref())?;

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CartoError::Cancelled),
            result = builder.send() => result.map_err(|e| CartoError::Llm {
                message: format!("request to {} failed: {e}", self.endpoint),
            })?,
        };

        let status = response.status();
        let text = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CartoError::Cancelled),
            body = response.text() => body.map_err(|e| CartoError::Llm {
                message: format!("reading response body failed: {e}"),
            })?,
        };

        if !status.is_success() {
            return Err(CartoError::Llm {
                message: format!("HTTP {status} from {}: {text}", provider_name(&self.config)),
            });
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| CartoError::Llm {
                message: format!("response is not JSON: {e}"),
            })?;

        provider::parse_text(self.config.provider, &parsed)
    }

    /// Run a completion and extract the first balanced JSON object from it.
    pub async fn complete_json(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> CartoResult<serde_json::Value> {
        let text = self.complete(request, cancel).await?;
        json::extract_json(&text)
    }

    /// Snapshot of the (possibly rotated) OAuth credentials, for callers
    /// that persist them between runs.
    pub async fn oauth_credentials(&self) -> Option<OauthCredentials> {
        match &self.oauth {
            Some(cache) => Some(cache.credentials().await),
            None => None,
        }
    }

    /// Permits currently available on the gateway semaphore.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

fn provider_name(config: &LlmConfig) -> &'static str {
    config.provider.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmProvider;

    #[test]
    fn test_gateway_construction() {
        let config = LlmConfig {
            api_key: Some("sk-test".into()),
            ..LlmConfig::default()
        };
        let gateway = LlmGateway::new(&config).expect("gateway");
        assert_eq!(gateway.available_permits(), 10);
    }

    #[test]
    fn test_gateway_custom_bound() {
        let config = LlmConfig {
            api_key: Some("sk-test".into()),
            max_concurrent: 2,
            ..LlmConfig::default()
        };
        let gateway = LlmGateway::new(&config).expect("gateway");
        assert_eq!(gateway.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let config = LlmConfig {
            provider: LlmProvider::Ollama,
            base_url: Some("http://127.0.0.1:9".into()),
            ..LlmConfig::default()
        };
        let gateway = LlmGateway::new(&config).expect("gateway");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let request = CompletionRequest {
            system: String::new(),
            prompt: "x".into(),
            max_tokens: 16,
            tier: ModelTier::Fast,
        };
        let err = gateway
            .complete(&request, &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, CartoError::Cancelled));
    }
}
