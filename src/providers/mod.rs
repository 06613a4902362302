//! Translation provider adapters.
//!
//! Every backend (Gemini, GLM, OpenAI-compatible chat, Google Translate and
//! the identity mock) implements [`TranslationProvider`], so the orchestrator
//! can walk a fallback chain without knowing which API sits behind each entry.
//!
//! # Architecture
//!
//! - `prompt`: numbered-line prompt rendering and response parsing
//! - `gemini`: Gemini `generateContent`
//! - `chat`: OpenAI-style chat completions (GLM and OpenAI-compatible)
//! - `google`: Google Translate v2
//! - `mock`: identity provider that never fails

pub mod chat;
pub mod gemini;
pub mod google;
pub mod mock;
pub mod prompt;

pub use chat::ChatCompletionsProvider;
pub use gemini::GeminiProvider;
pub use google::GoogleTranslateProvider;
pub use mock::MockProvider;

use crate::config::Config;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Identifier of a translation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Gemini,
    Glm,
    #[serde(rename = "openai")]
    OpenAi,
    Google,
    Mock,
}

impl ProviderId {
    /// Automatic-mode priority; Mock is always last.
    pub const PRIORITY: [ProviderId; 5] = [
        ProviderId::Gemini,
        ProviderId::Glm,
        ProviderId::OpenAi,
        ProviderId::Google,
        ProviderId::Mock,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::Glm => "glm",
            ProviderId::OpenAi => "openai",
            ProviderId::Google => "google",
            ProviderId::Mock => "mock",
        }
    }

    /// Comma-separated list of recognised names, for error messages.
    pub fn allowed_names() -> String {
        Self::PRIORITY
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderId::Gemini),
            "glm" => Ok(ProviderId::Glm),
            "openai" => Ok(ProviderId::OpenAi),
            "google" => Ok(ProviderId::Google),
            "mock" => Ok(ProviderId::Mock),
            other => Err(other.to_string()),
        }
    }
}

/// Which backend actually served a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallMeta {
    pub provider: String,
    pub model: String,
    pub endpoint_type: String,
}

/// A complete translation of one batch.
///
/// `translations.len()` always equals the number of texts sent; short answers
/// surface as [`ProviderError::Partial`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCallResult {
    pub translations: Vec<String>,
    pub char_count: usize,
    pub meta: CallMeta,
}

impl ProviderCallResult {
    /// Zero-cost result for an empty request
    pub fn empty(provider: &str, model: &str, endpoint_type: &str) -> Self {
        Self {
            translations: Vec::new(),
            char_count: 0,
            meta: CallMeta {
                provider: provider.to_string(),
                model: model.to_string(),
                endpoint_type: endpoint_type.to_string(),
            },
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateOptions {
    /// Target language name used in prompts (e.g., "Korean")
    pub target_language: String,
    /// Target language code used by MT APIs (e.g., "ko")
    pub target_code: String,
    /// Model override; `None` uses the provider's default model
    pub model: Option<String>,
}

impl TranslateOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            target_language: config.target_language.clone(),
            target_code: config.target_code.clone(),
            model: None,
        }
    }

    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: Some(model.to_string()),
            ..self.clone()
        }
    }
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            target_language: "Korean".to_string(),
            target_code: "ko".to_string(),
            model: None,
        }
    }
}

/// Uniform contract implemented by every backend.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Ordered models to try; the first entry is the default model.
    fn models(&self) -> Vec<String>;

    /// Translate `texts` in order.
    ///
    /// An empty `texts` returns an empty success without a network call.
    async fn translate(
        &self,
        texts: &[String],
        options: &TranslateOptions,
    ) -> Result<ProviderCallResult, ProviderError>;
}

/// The providers available to one process, keyed by id.
///
/// Built once at start-up and handed to the orchestrator; only providers
/// whose credentials are present are registered, plus the identity mock.
#[derive(Default)]
pub struct ProviderTable {
    providers: BTreeMap<ProviderId, Box<dyn TranslationProvider>>,
}

impl ProviderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct every credentialed provider from configuration.
    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        let mut table = Self::new();

        if let Some(provider) = GeminiProvider::from_config(config, client.clone()) {
            table.insert(Box::new(provider));
        }
        if let Some(provider) = ChatCompletionsProvider::glm(config, client.clone()) {
            table.insert(Box::new(provider));
        }
        if let Some(provider) = ChatCompletionsProvider::openai(config, client.clone()) {
            table.insert(Box::new(provider));
        }
        if let Some(provider) = GoogleTranslateProvider::from_config(config, client) {
            table.insert(Box::new(provider));
        }
        table.insert(Box::new(MockProvider::new()));

        debug!("Registered providers: {:?}", table.ids());
        table
    }

    pub fn insert(&mut self, provider: Box<dyn TranslationProvider>) {
        self.providers.insert(provider.id(), provider);
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, provider: impl TranslationProvider + 'static) -> Self {
        self.insert(Box::new(provider));
        self
    }

    pub fn get(&self, id: ProviderId) -> Option<&dyn TranslationProvider> {
        self.providers.get(&id).map(|p| p.as_ref())
    }

    pub fn contains(&self, id: ProviderId) -> bool {
        self.providers.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.keys().copied().collect()
    }
}
