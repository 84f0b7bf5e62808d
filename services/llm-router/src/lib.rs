use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ai_agent::{ChatCompletionsClient, LanguageModelClient, ModelOptions};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Groq,
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Groq => "groq",
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
        }
    }

    /// OpenAI-compatible base URL for the provider.
    pub fn base_url(&self) -> &'static str {
        match self {
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
        }
    }

    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::Groq => "GROQ_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::Gemini => "GOOGLE_API_KEY",
        }
    }

    pub fn default_model(&self, tier: ModelTier) -> &'static str {
        match (self, tier) {
            (Provider::Groq, ModelTier::Reasoning) => "llama-3.3-70b-versatile",
            (Provider::Groq, ModelTier::Classifier) => "llama-3.1-8b-instant",
            (Provider::OpenAi, ModelTier::Reasoning) => "gpt-4o",
            (Provider::OpenAi, ModelTier::Classifier) => "gpt-4o-mini",
            (Provider::Gemini, _) => "gemini-1.5-flash",
        }
    }
}

impl FromStr for Provider {
    type Err = RouterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Provider::Groq),
            "openai" => Ok(Provider::OpenAi),
            "gemini" | "google" => Ok(Provider::Gemini),
            other => Err(RouterError::UnknownProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasoning drives the agent loop; the classifier tier only emits intent labels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Reasoning,
    Classifier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub reasoning_model: Option<String>,
    #[serde(default)]
    pub classifier_model: Option<String>,
    #[serde(default = "RouterConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl RouterConfig {
    fn default_request_timeout_ms() -> u64 {
        DEFAULT_REQUEST_TIMEOUT_MS
    }

    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    /// Builds a config from process environment variables.
    pub fn from_env() -> Result<Self, RouterError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RouterError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let provider = match get("CONCIERGE_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => Provider::default(),
        };
        let request_timeout_ms = match get("CONCIERGE_REQUEST_TIMEOUT_MS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| RouterError::InvalidSetting {
                    key: "CONCIERGE_REQUEST_TIMEOUT_MS",
                    value: raw,
                })?,
            None => DEFAULT_REQUEST_TIMEOUT_MS,
        };
        Ok(Self {
            provider,
            base_url: get("CONCIERGE_BASE_URL"),
            api_key: get(provider.api_key_var()),
            reasoning_model: get("CONCIERGE_REASONING_MODEL"),
            classifier_model: get("CONCIERGE_CLASSIFIER_MODEL"),
            request_timeout_ms,
        })
    }

    pub fn model_for(&self, tier: ModelTier) -> &str {
        let configured = match tier {
            ModelTier::Reasoning => self.reasoning_model.as_deref(),
            ModelTier::Classifier => self.classifier_model.as_deref(),
        };
        configured.unwrap_or_else(|| self.provider.default_model(tier))
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.base_url())
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            base_url: None,
            api_key: None,
            reasoning_model: None,
            classifier_model: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no API key for provider {provider}; set {env_var}")]
    MissingApiKey {
        provider: Provider,
        env_var: &'static str,
    },
    #[error("unknown model provider '{0}'")]
    UnknownProvider(String),
    #[error("invalid value '{value}' for {key}")]
    InvalidSetting { key: &'static str, value: String },
    #[error("failed to build inference client: {0:#}")]
    Client(#[source] anyhow::Error),
}

#[derive(Clone)]
pub struct LlmRouter {
    config: RouterConfig,
    reasoning: Arc<ChatCompletionsClient>,
    classifier: Arc<ChatCompletionsClient>,
}

impl LlmRouter {
    pub fn new(config: RouterConfig) -> Result<Self, RouterError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(RouterError::MissingApiKey {
                provider: config.provider,
                env_var: config.provider.api_key_var(),
            })?;
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let build = |tier: ModelTier| {
            ChatCompletionsClient::new(
                config.base_url(),
                api_key.clone(),
                config.model_for(tier),
                timeout,
            )
            .map(Arc::new)
            .map_err(RouterError::Client)
        };
        let reasoning = build(ModelTier::Reasoning)?;
        let classifier = build(ModelTier::Classifier)?;

        info!(
            target: "llm_router",
            provider = %config.provider,
            reasoning = config.model_for(ModelTier::Reasoning),
            classifier = config.model_for(ModelTier::Classifier),
            "model router ready"
        );

        Ok(Self {
            config,
            reasoning,
            classifier,
        })
    }

    pub fn route(&self, tier: ModelTier) -> Arc<dyn LanguageModelClient> {
        match tier {
            ModelTier::Reasoning => self.reasoning.clone(),
            ModelTier::Classifier => self.classifier.clone(),
        }
    }

    /// Temperature-zero request options pinned to the tier's model.
    pub fn options_for(&self, tier: ModelTier) -> ModelOptions {
        let model = self.config.model_for(tier).to_string();
        match tier {
            ModelTier::Reasoning => ModelOptions::default().with_model(model),
            ModelTier::Classifier => ModelOptions::deterministic(Some(model)),
        }
    }

    pub fn provider(&self) -> Provider {
        self.config.provider
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }
}
