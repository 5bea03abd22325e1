//! Configuration for the indexing pipeline.
//!
//! The embedding CLI/front-end owns flag parsing and credential files; this
//! crate only defines the typed configuration it consumes, with compiled-in
//! defaults for every tunable. Per-project source settings come from
//! `{root}/.carto/sources.yaml` when present.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CartoError, CartoResult};

/// Which completion provider the gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic messages endpoint (default). Static API key or OAuth
    /// bearer token.
    Anthropic,
    /// OpenAI-style chat-completion endpoint.
    OpenAi,
    /// OpenRouter (OpenAI-compatible body).
    OpenRouter,
    /// Local text-generation endpoint.
    Ollama,
}

impl Default for LlmProvider {
    fn default() -> Self {
        Self::Anthropic
    }
}

impl LlmProvider {
    /// Returns the provider identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
        }
    }
}

/// OAuth bearer credentials for the Anthropic provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthCredentials {
    /// Current access token.
    pub access_token: String,
    /// Refresh token exchanged when the access token expires.
    pub refresh_token: String,
    /// Unix epoch milliseconds at which `access_token` expires.
    pub expires_at: i64,
}

/// LLM gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Which provider to use.
    #[serde(default)]
    pub provider: LlmProvider,

    /// Static API key. Required for `openai`/`openrouter`; one of key or
    /// oauth is required for `anthropic`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// OAuth bearer credentials (Anthropic only).
    #[serde(default)]
    pub oauth: Option<OauthCredentials>,

    /// Base URL. Required for every provider except `anthropic`.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Fast-tier model identifier (per-chunk atom summaries).
    #[serde(default)]
    pub fast_model: Option<String>,

    /// Deep-tier model identifier (module and system synthesis).
    #[serde(default)]
    pub deep_model: Option<String>,

    /// Process-wide ceiling on in-flight gateway requests.
    #[serde(default = "LlmConfig::default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            api_key: None,
            oauth: None,
            base_url: None,
            fast_model: None,
            deep_model: None,
            max_concurrent: Self::default_max_concurrent(),
        }
    }
}

impl LlmConfig {
    fn default_max_concurrent() -> usize {
        10
    }
}

/// Vector memory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the memory service.
    #[serde(default = "StoreConfig::default_base_url")]
    pub base_url: String,

    /// Optional API key, sent as `X-API-Key`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "StoreConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            api_key: None,
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

impl StoreConfig {
    fn default_base_url() -> String {
        "http://localhost:8900".into()
    }

    fn default_timeout_secs() -> u64 {
        30
    }
}

/// Git history mining configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// How far back to look, in days.
    #[serde(default = "HistoryConfig::default_window_days")]
    pub window_days: i64,

    /// Maximum commits collected per file.
    #[serde(default = "HistoryConfig::default_max_commits")]
    pub max_commits: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_days: Self::default_window_days(),
            max_commits: Self::default_max_commits(),
        }
    }
}

impl HistoryConfig {
    fn default_window_days() -> i64 {
        180
    }

    fn default_max_commits() -> usize {
        50
    }
}

/// Top-level configuration for an indexing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CartoConfig {
    /// LLM gateway settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Memory store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Git history settings.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Per-batch concurrency bound for atom and module-analysis fan-out.
    /// Composes with `llm.max_concurrent`.
    #[serde(default = "CartoConfig::default_batch_concurrent")]
    pub batch_concurrent: usize,
}

impl CartoConfig {
    fn default_batch_concurrent() -> usize {
        4
    }

    /// Validate configuration before the pipeline starts. Errors here are
    /// the only ones surfaced ahead of phase 1.
    pub fn validate(&self) -> CartoResult<()> {
        match self.llm.provider {
            LlmProvider::Anthropic => {
                if self.llm.api_key.is_none() && self.llm.oauth.is_none() {
                    return Err(CartoError::Config {
                        details: "anthropic provider requires an API key or OAuth credentials"
                            .into(),
                    });
                }
            }
            LlmProvider::OpenAi | LlmProvider::OpenRouter | LlmProvider::Ollama => {
                if self.llm.base_url.is_none() {
                    return Err(CartoError::Config {
                        details: format!(
                            "provider {} requires a base URL",
                            self.llm.provider.as_str()
                        ),
                    });
                }
            }
        }

        if let Some(url) = &self.llm.base_url {
            validate_url("llm.base_url", url)?;
        }
        validate_url("store.base_url", &self.store.base_url)?;

        if self.llm.max_concurrent == 0 {
            return Err(CartoError::Config {
                details: "llm.max_concurrent must be at least 1".into(),
            });
        }
        if self.batch_concurrent == 0 {
            return Err(CartoError::Config {
                details: "batch_concurrent must be at least 1".into(),
            });
        }

        Ok(())
    }
}

fn validate_url(field: &str, url: &str) -> CartoResult<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(CartoError::Config {
            details: format!("{field}: invalid base URL {url:?}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Per-project source settings: .carto/sources.yaml
// ---------------------------------------------------------------------------

/// Raw shape of `.carto/sources.yaml`.
#[derive(Debug, Deserialize)]
struct SourcesFile {
    #[serde(default)]
    sources: HashMap<String, HashMap<String, SettingValue>>,
}

/// A setting may be a scalar or a list; lists are joined with commas
/// before reaching a source.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SettingValue {
    One(String),
    Many(Vec<String>),
}

impl SettingValue {
    fn flatten(self) -> String {
        match self {
            Self::One(s) => s,
            Self::Many(items) => items.join(","),
        }
    }
}

/// Load per-source settings from `{root}/.carto/sources.yaml`.
///
/// Returns an empty map when the file is absent. Sources never read
/// environment variables directly; everything they need arrives through
/// these maps.
pub fn load_source_settings(
    root: &Path,
) -> CartoResult<HashMap<String, HashMap<String, String>>> {
    let path = root.join(".carto").join("sources.yaml");
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content = std::fs::read_to_string(&path)?;
    let parsed: SourcesFile = serde_yaml::from_str(&content).map_err(|e| CartoError::Config {
        details: format!("invalid sources.yaml at {}: {e}", path.display()),
    })?;

    Ok(parsed
        .sources
        .into_iter()
        .map(|(name, settings)| {
            let flat = settings
                .into_iter()
                .map(|(k, v)| (k, v.flatten()))
                .collect();
            (name, flat)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CartoConfig::default();
        assert_eq!(config.llm.max_concurrent, 10);
        assert_eq!(config.batch_concurrent, 4);
        assert_eq!(config.history.max_commits, 50);
        assert_eq!(config.history.window_days, 180);
        assert_eq!(config.llm.provider, LlmProvider::Anthropic);
    }

    #[test]
    fn test_validate_requires_credentials() {
        let config = CartoConfig::default();
        assert!(config.validate().is_err());

        let mut config = CartoConfig::default();
        config.llm.api_key = Some("sk-test".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_non_default_provider_needs_base_url() {
        let mut config = CartoConfig::default();
        config.llm.provider = LlmProvider::Ollama;
        assert!(config.validate().is_err());

        config.llm.base_url = Some("http://localhost:11434".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = CartoConfig::default();
        config.llm.api_key = Some("sk-test".into());
        config.store.base_url = "localhost:8900".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_source_settings_missing_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let settings = load_source_settings(dir.path()).expect("load");
        assert!(settings.is_empty());
    }

    #[test]
    fn test_load_source_settings_joins_lists() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let carto_dir = dir.path().join(".carto");
        std::fs::create_dir_all(&carto_dir).expect("mkdir");
        std::fs::write(
            carto_dir.join("sources.yaml"),
            "sources:\n  docs:\n    urls:\n      - https://a.example/guide\n      - https://b.example/api\n    token: t123\n",
        )
        .expect("write");

        let settings = load_source_settings(dir.path()).expect("load");
        let docs = settings.get("docs").expect("docs source");
        assert_eq!(
            docs.get("urls").map(String::as_str),
            Some("https://a.example/guide,https://b.example/api")
        );
        assert_eq!(docs.get("token").map(String::as_str), Some("t123"));
    }
}
