//! Provider-specific request shaping and response parsing.
//!
//! One closed enum covers every supported provider; adding a provider
//! means extending the match arms here and the default-model table below.
//! No dynamic loading, no per-provider trait objects.

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{CartoError, CartoResult};

use super::{CompletionRequest, ModelTier};

/// Default Anthropic API host when no base URL is configured.
const ANTHROPIC_DEFAULT_BASE: &str = "https://api.anthropic.com";

/// Messages API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Beta flag required when authenticating with an OAuth bearer token.
const ANTHROPIC_OAUTH_BETA: &str = "oauth-2025-04-20";

/// Resolve the completion endpoint for a provider.
pub(super) fn endpoint(config: &LlmConfig) -> String {
    let base = config
        .base_url
        .as_deref()
        .unwrap_or(ANTHROPIC_DEFAULT_BASE)
        .trim_end_matches('/');

    match config.provider {
        LlmProvider::Anthropic => format!("{base}/v1/messages"),
        // OpenAI-compatible bases include their version prefix
        // (e.g. https://openrouter.ai/api/v1).
        LlmProvider::OpenAi | LlmProvider::OpenRouter => format!("{base}/chat/completions"),
        LlmProvider::Ollama => format!("{base}/api/generate"),
    }
}

/// Resolve the model identifier for a tier, with provider defaults.
pub(super) fn model_for(config: &LlmConfig, tier: ModelTier) -> String {
    let configured = match tier {
        ModelTier::Fast => config.fast_model.as_deref(),
        ModelTier::Deep => config.deep_model.as_deref(),
    };
    if let Some(model) = configured {
        return model.to_string();
    }

    let default = match (config.provider, tier) {
        (LlmProvider::Anthropic, ModelTier::Fast) => "claude-3-5-haiku-latest",
        (LlmProvider::Anthropic, ModelTier::Deep) => "claude-sonnet-4-20250514",
        (LlmProvider::OpenAi, ModelTier::Fast) => "gpt-4o-mini",
        (LlmProvider::OpenAi, ModelTier::Deep) => "gpt-4o",
        (LlmProvider::OpenRouter, ModelTier::Fast) => "anthropic/claude-3.5-haiku",
        (LlmProvider::OpenRouter, ModelTier::Deep) => "anthropic/claude-sonnet-4",
        (LlmProvider::Ollama, _) => "llama3.1",
    };
    default.to_string()
}

/// Build the request body for a provider.
pub(super) fn build_body(
    config: &LlmConfig,
    request: &CompletionRequest,
    model: &str,
) -> serde_json::Value {
    match config.provider {
        LlmProvider::Anthropic => serde_json::json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "system": request.system,
            "messages": [{ "role": "user", "content": request.prompt }],
        }),
        LlmProvider::OpenAi | LlmProvider::OpenRouter => serde_json::json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
        }),
        LlmProvider::Ollama => serde_json::json!({
            "model": model,
            "prompt": format!("{}\n\n{}", request.system, request.prompt),
            "stream": false,
            "options": { "num_predict": request.max_tokens },
        }),
    }
}

/// Attach provider auth headers to a request builder.
///
/// `bearer` is the resolved OAuth access token when the Anthropic provider
/// runs in bearer mode; `None` selects static-key auth.
pub(super) fn apply_headers(
    config: &LlmConfig,
    builder: reqwest::RequestBuilder,
    bearer: Option<&str>,
) -> CartoResult<reqwest::RequestBuilder> {
    match config.provider {
        LlmProvider::Anthropic => {
            let builder = builder.header("anthropic-version", ANTHROPIC_VERSION);
            if let Some(token) = bearer {
                Ok(builder
                    .header("Authorization", format!("Bearer {token}"))
                    .header("anthropic-beta", ANTHROPIC_OAUTH_BETA))
            } else {
                let key = config.api_key.as_deref().ok_or_else(|| CartoError::Config {
                    details: "anthropic provider has neither API key nor OAuth credentials".into(),
                })?;
                Ok(builder.header("x-api-key", key))
            }
        }
        LlmProvider::OpenAi | LlmProvider::OpenRouter => {
            let key = config.api_key.as_deref().ok_or_else(|| CartoError::Config {
                details: format!("provider {} requires an API key", config.provider.as_str()),
            })?;
            Ok(builder.header("Authorization", format!("Bearer {key}")))
        }
        LlmProvider::Ollama => Ok(builder),
    }
}

/// Pull the completion text out of a provider response body.
pub(super) fn parse_text(provider: LlmProvider, body: &serde_json::Value) -> CartoResult<String> {
    let text = match provider {
        LlmProvider::Anthropic => body
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            })
            .and_then(|b| b.get("text"))
            .and_then(|t| t.as_str()),
        LlmProvider::OpenAi | LlmProvider::OpenRouter => body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str()),
        LlmProvider::Ollama => body.get("response").and_then(|t| t.as_str()),
    };

    text.map(str::to_string).ok_or_else(|| CartoError::Llm {
        message: format!(
            "{} response missing text block",
            provider.as_str()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: LlmProvider, base: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: Some("k".into()),
            base_url: base.map(str::to_string),
            ..LlmConfig::default()
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "be terse".into(),
            prompt: "hello".into(),
            max_tokens: 256,
            tier: ModelTier::Fast,
        }
    }

    #[test]
    fn test_endpoints() {
        assert_eq!(
            endpoint(&config(LlmProvider::Anthropic, None)),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(
            endpoint(&config(LlmProvider::OpenRouter, Some("https://openrouter.ai/api/v1"))),
            "https://openrouter.ai/api/v1/chat/completions"
        );
        assert_eq!(
            endpoint(&config(LlmProvider::Ollama, Some("http://localhost:11434/"))),
            "http://localhost:11434/api/generate"
        );
    }

    #[test]
    fn test_model_defaults_and_overrides() {
        let mut c = config(LlmProvider::Anthropic, None);
        assert_eq!(model_for(&c, ModelTier::Fast), "claude-3-5-haiku-latest");
        c.deep_model = Some("claude-opus-4".into());
        assert_eq!(model_for(&c, ModelTier::Deep), "claude-opus-4");
    }

    #[test]
    fn test_anthropic_body_shape() {
        let body = build_body(&config(LlmProvider::Anthropic, None), &request(), "m");
        assert_eq!(body["system"], "be terse");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 256);
    }

    #[test]
    fn test_openai_body_shape() {
        let body = build_body(&config(LlmProvider::OpenAi, None), &request(), "m");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[test]
    fn test_ollama_body_shape() {
        let body = build_body(&config(LlmProvider::Ollama, None), &request(), "m");
        assert_eq!(body["stream"], false);
        assert!(body["prompt"].as_str().map(|p| p.contains("hello")).unwrap_or(false));
    }

    #[test]
    fn test_parse_anthropic_text() {
        let body = serde_json::json!({
            "content": [
                { "type": "thinking", "thinking": "..." },
                { "type": "text", "text": "answer" },
            ]
        });
        assert_eq!(parse_text(LlmProvider::Anthropic, &body).expect("text"), "answer");
    }

    #[test]
    fn test_parse_missing_text_block() {
        let body = serde_json::json!({ "content": [] });
        let err = parse_text(LlmProvider::Anthropic, &body).expect_err("should fail");
        assert!(err.to_string().contains("missing text block"));
    }

    #[test]
    fn test_parse_openai_and_ollama() {
        let openai = serde_json::json!({
            "choices": [{ "message": { "content": "a" } }]
        });
        assert_eq!(parse_text(LlmProvider::OpenAi, &openai).expect("text"), "a");

        let ollama = serde_json::json!({ "response": "b" });
        assert_eq!(parse_text(LlmProvider::Ollama, &ollama).expect("text"), "b");
    }
}
