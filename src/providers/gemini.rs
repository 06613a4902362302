use crate::config::Config;
use crate::error::ProviderError;
use crate::providers::prompt::{
    build_system_prompt, build_user_prompt, into_call_result, parse_numbered_response,
};
use crate::providers::{
    CallMeta, ProviderCallResult, ProviderId, TranslateOptions, TranslationProvider,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const ENDPOINT_TYPE: &str = "generate_content";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Gemini `generateContent` adapter with an ordered model list.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    models: Vec<String>,
}

impl GeminiProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        models: Vec<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            models,
        }
    }

    /// Gemini adapter, if `GEMINI_API_KEY` is set
    pub fn from_config(config: &Config, client: reqwest::Client) -> Option<Self> {
        let api_key = config.gemini_api_key.as_ref()?;
        Some(Self::new(
            client,
            &config.gemini_api_url,
            api_key,
            config.gemini_models.clone(),
        ))
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

fn build_request(texts: &[String], options: &TranslateOptions) -> GenerateContentRequest {
    GenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: build_system_prompt(&options.target_language),
            }],
        },
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: build_user_prompt(texts, &options.target_language),
            }],
        }],
        generation_config: GenerationConfig { temperature: 0.2 },
    }
}

/// Concatenate the text parts of the first candidate
fn response_text(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().map(|p| p.text).collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl TranslationProvider for GeminiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn models(&self) -> Vec<String> {
        self.models.clone()
    }

    async fn translate(
        &self,
        texts: &[String],
        options: &TranslateOptions,
    ) -> Result<ProviderCallResult, ProviderError> {
        let Some(model) = options
            .model
            .clone()
            .or_else(|| self.models.first().cloned())
        else {
            return Err(ProviderError::NotConfigured {
                provider: ProviderId::Gemini,
                message: "no Gemini models configured".to_string(),
            });
        };

        if texts.is_empty() {
            return Ok(ProviderCallResult::empty("gemini", &model, ENDPOINT_TYPE));
        }

        debug!("gemini: sending {} entries to {}", texts.len(), model);

        let response = self
            .client
            .post(self.endpoint(&model))
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(texts, options))
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(ProviderId::Gemini, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e.without_url()));
            return Err(ProviderError::api(ProviderId::Gemini, status.as_u16(), body));
        }

        let parsed: GenerateContentResponse =
            response.json().await.map_err(|e| ProviderError::Parse {
                provider: ProviderId::Gemini,
                message: e.without_url().to_string(),
            })?;

        let text = response_text(parsed).ok_or_else(|| ProviderError::Parse {
            provider: ProviderId::Gemini,
            message: "response contained no candidate text".to_string(),
        })?;

        let slots = parse_numbered_response(&text, texts.len());
        let meta = CallMeta {
            provider: "gemini".to_string(),
            model,
            endpoint_type: ENDPOINT_TYPE.to_string(),
        };
        into_call_result(ProviderId::Gemini, meta, texts, slots)
    }
}
