//! Google Translate API v2 adapter.
//!
//! Plain machine translation: no prompt, no model list. The API key travels
//! as the `key` query parameter and texts are sent as repeated `q` values in
//! a JSON body.

use crate::batch::char_len_sum;
use crate::config::Config;
use crate::error::ProviderError;
use crate::providers::{
    CallMeta, ProviderCallResult, ProviderId, TranslateOptions, TranslationProvider,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const ENDPOINT_TYPE: &str = "translate_v2";
const MODEL: &str = "nmt";
const SOURCE_LANGUAGE: &str = "en";

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a [String],
    source: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

#[derive(Debug, Clone)]
pub struct GoogleTranslateProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleTranslateProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Google Translate adapter, if `GOOGLE_TRANSLATE_API_KEY` is set
    pub fn from_config(config: &Config, client: reqwest::Client) -> Option<Self> {
        let api_key = config.google_translate_api_key.as_ref()?;
        Some(Self::new(client, &config.google_translate_api_url, api_key))
    }
}

#[async_trait]
impl TranslationProvider for GoogleTranslateProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Google
    }

    fn models(&self) -> Vec<String> {
        vec![MODEL.to_string()]
    }

    async fn translate(
        &self,
        texts: &[String],
        options: &TranslateOptions,
    ) -> Result<ProviderCallResult, ProviderError> {
        if texts.is_empty() {
            return Ok(ProviderCallResult::empty("google", MODEL, ENDPOINT_TYPE));
        }

        debug!("google: translating {} entries to {}", texts.len(), options.target_code);

        let request = TranslateRequest {
            q: texts,
            source: SOURCE_LANGUAGE,
            target: &options.target_code,
            format: "text",
        };

        let response = self
            .client
            .post(&self.base_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(ProviderId::Google, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e.without_url()));
            return Err(ProviderError::api(ProviderId::Google, status.as_u16(), body));
        }

        let parsed: TranslateResponse = response.json().await.map_err(|e| ProviderError::Parse {
            provider: ProviderId::Google,
            message: e.without_url().to_string(),
        })?;

        let mut slots: Vec<Option<String>> = parsed
            .data
            .translations
            .into_iter()
            .map(|t| Some(t.translated_text))
            .take(texts.len())
            .collect();
        let char_count = char_len_sum(texts);

        let meta = CallMeta {
            provider: "google".to_string(),
            model: MODEL.to_string(),
            endpoint_type: ENDPOINT_TYPE.to_string(),
        };

        if slots.len() == texts.len() {
            return Ok(ProviderCallResult {
                translations: slots.into_iter().flatten().collect(),
                char_count,
                meta,
            });
        }

        if slots.is_empty() {
            return Err(ProviderError::Parse {
                provider: ProviderId::Google,
                message: "response contained no translations".to_string(),
            });
        }

        slots.resize(texts.len(), None);
        Err(ProviderError::Partial {
            provider: ProviderId::Google,
            meta,
            translations: slots,
            char_count,
        })
    }
}
