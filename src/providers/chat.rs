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

const ENDPOINT_TYPE: &str = "chat_completions";

/// OpenAI-style Chat Completion request
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
}

/// Check if a model is a reasoning model that doesn't support temperature
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("gpt-5")
        || model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat-completions adapter shared by GLM and OpenAI-compatible endpoints.
#[derive(Debug, Clone)]
pub struct ChatCompletionsProvider {
    id: ProviderId,
    label: String,
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsProvider {
    pub fn new(
        id: ProviderId,
        label: impl Into<String>,
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// GLM (Zhipu) adapter, if `GLM_API_KEY` is set
    pub fn glm(config: &Config, client: reqwest::Client) -> Option<Self> {
        let api_key = config.glm_api_key.as_ref()?;
        Some(Self::new(
            ProviderId::Glm,
            "glm",
            client,
            &config.glm_api_url,
            api_key,
            &config.glm_model,
        ))
    }

    /// OpenAI-compatible adapter, if `OPENAI_API_KEY` is set
    pub fn openai(config: &Config, client: reqwest::Client) -> Option<Self> {
        let api_key = config.openai_api_key.as_ref()?;
        Some(Self::new(
            ProviderId::OpenAi,
            &config.openai_provider_name,
            client,
            &config.openai_api_url,
            api_key,
            &config.openai_model,
        ))
    }

    fn build_request(&self, texts: &[String], options: &TranslateOptions, model: &str) -> ChatRequest {
        // Reasoning models need higher token limits and don't support temperature
        let is_reasoning = is_reasoning_model(model);
        let budget = 256 + 200 * texts.len() as u32;

        let (max_tokens, max_completion_tokens) = match self.id {
            ProviderId::OpenAi => (None, Some(if is_reasoning { 16000 } else { budget })),
            _ => (Some(budget), None),
        };

        ChatRequest {
            model: model.to_string(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: build_system_prompt(&options.target_language),
                },
                Message {
                    role: "user".to_string(),
                    content: build_user_prompt(texts, &options.target_language),
                },
            ],
            max_tokens,
            max_completion_tokens,
            temperature: if is_reasoning { None } else { Some(0.3) },
            reasoning_effort: if is_reasoning {
                Some("low".to_string())
            } else {
                None
            },
        }
    }
}

#[async_trait]
impl TranslationProvider for ChatCompletionsProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn models(&self) -> Vec<String> {
        vec![self.model.clone()]
    }

    async fn translate(
        &self,
        texts: &[String],
        options: &TranslateOptions,
    ) -> Result<ProviderCallResult, ProviderError> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        if texts.is_empty() {
            return Ok(ProviderCallResult::empty(&self.label, model, ENDPOINT_TYPE));
        }

        let request = self.build_request(texts, options, model);
        debug!("{}: sending {} entries to {}", self.id, texts.len(), model);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.id, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e.without_url()));
            return Err(ProviderError::api(self.id, status.as_u16(), body));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| ProviderError::Parse {
            provider: self.id,
            message: e.without_url().to_string(),
        })?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Parse {
                provider: self.id,
                message: "response contained no choices".to_string(),
            })?;

        let slots = parse_numbered_response(&content, texts.len());
        let meta = CallMeta {
            provider: self.label.clone(),
            model: model.to_string(),
            endpoint_type: ENDPOINT_TYPE.to_string(),
        };
        into_call_result(self.id, meta, texts, slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use wiremock::{
        matchers::{body_string_contains, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn create_provider(id: ProviderId, server_uri: &str, model: &str) -> ChatCompletionsProvider {
        ChatCompletionsProvider::new(
            id,
            id.as_str(),
            reqwest::Client::new(),
            format!("{}/v1/chat/completions", server_uri),
            "test-key",
            model,
        )
    }

    fn create_chat_response(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [
                {
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": content
                    },
                    "finish_reason": "stop"
                }
            ]
        })
    }

    // ==================== Request Structure Tests ====================

    #[test]
    fn test_openai_request_uses_max_completion_tokens() {
        let provider = create_provider(ProviderId::OpenAi, "http://localhost", "gpt-4o-mini");
        let request =
            provider.build_request(&strings(&["Add flag"]), &TranslateOptions::default(), "gpt-4o-mini");

        let json = serde_json::to_string(&request).expect("Should serialize");
        assert!(json.contains("max_completion_tokens"));
        assert!(!json.contains("\"max_tokens\""));
        assert!(json.contains("0.3"));
        assert!(!json.contains("reasoning_effort"));
        assert!(json.contains("1. Add flag"));
    }

    #[test]
    fn test_openai_reasoning_model_request() {
        let provider = create_provider(ProviderId::OpenAi, "http://localhost", "gpt-5-mini");
        let request =
            provider.build_request(&strings(&["Test"]), &TranslateOptions::default(), "gpt-5-mini");

        let json = serde_json::to_string(&request).expect("Should serialize");
        assert!(json.contains("16000"));
        assert!(json.contains("reasoning_effort"));
        assert!(!json.contains("temperature"));
    }

    #[test]
    fn test_glm_request_uses_max_tokens() {
        let provider = create_provider(ProviderId::Glm, "http://localhost", "glm-4-flash");
        let request =
            provider.build_request(&strings(&["a", "b"]), &TranslateOptions::default(), "glm-4-flash");

        let json = serde_json::to_string(&request).expect("Should serialize");
        assert!(json.contains("\"max_tokens\":656"));
        assert!(!json.contains("max_completion_tokens"));
    }

    #[test]
    fn test_is_reasoning_model() {
        assert!(is_reasoning_model("gpt-5-mini"));
        assert!(is_reasoning_model("o1-preview"));
        assert!(is_reasoning_model("o4-mini"));
        assert!(!is_reasoning_model("gpt-4o-mini"));
        assert!(!is_reasoning_model("glm-4-flash"));
    }

    // ==================== Constructor Tests ====================

    #[test]
    fn test_constructors_require_credentials() {
        let config = Config::default();
        assert!(ChatCompletionsProvider::glm(&config, reqwest::Client::new()).is_none());
        assert!(ChatCompletionsProvider::openai(&config, reqwest::Client::new()).is_none());

        let config = Config {
            openai_api_key: Some("sk".to_string()),
            openai_provider_name: "openrouter".to_string(),
            ..Config::default()
        };
        let provider = ChatCompletionsProvider::openai(&config, reqwest::Client::new())
            .expect("Should build");
        assert_eq!(provider.id(), ProviderId::OpenAi);
        assert_eq!(provider.label, "openrouter");
        assert_eq!(provider.models(), vec!["gpt-4o-mini"]);
    }

    // ==================== translate Tests ====================

    #[tokio::test]
    async fn test_translate_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_string_contains("Korean"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(create_chat_response("1. 플래그 추가\n2. 충돌 수정")),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = create_provider(ProviderId::Glm, &mock_server.uri(), "glm-4-flash");
        let result = provider
            .translate(&strings(&["Add flag", "Fix crash"]), &TranslateOptions::default())
            .await
            .expect("Should succeed");

        assert_eq!(result.translations, vec!["플래그 추가", "충돌 수정"]);
        assert_eq!(result.char_count, 17);
        assert_eq!(result.meta.provider, "glm");
        assert_eq!(result.meta.model, "glm-4-flash");
        assert_eq!(result.meta.endpoint_type, "chat_completions");
    }

    #[tokio::test]
    async fn test_translate_empty_input_skips_api_call() {
        let provider = create_provider(
            ProviderId::OpenAi,
            "http://invalid-url-should-not-be-called.test",
            "gpt-4o-mini",
        );

        let result = provider
            .translate(&[], &TranslateOptions::default())
            .await
            .expect("Should succeed without a request");

        assert!(result.translations.is_empty());
        assert_eq!(result.char_count, 0);
    }

    #[tokio::test]
    async fn test_translate_model_override() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_string_contains("gpt-4.1-mini"))
            .respond_with(ResponseTemplate::new(200).set_body_json(create_chat_response("1. 하나")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = create_provider(ProviderId::OpenAi, &mock_server.uri(), "gpt-4o-mini");
        let result = provider
            .translate(
                &strings(&["one"]),
                &TranslateOptions::default().with_model("gpt-4.1-mini"),
            )
            .await
            .expect("Should succeed");

        assert_eq!(result.meta.model, "gpt-4.1-mini");
    }

    #[tokio::test]
    async fn test_translate_partial_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(create_chat_response("1. 하나\n3. 셋")),
            )
            .mount(&mock_server)
            .await;

        let provider = create_provider(ProviderId::OpenAi, &mock_server.uri(), "gpt-4o-mini");
        let err = provider
            .translate(&strings(&["one", "two", "three"]), &TranslateOptions::default())
            .await
            .unwrap_err();

        match err {
            ProviderError::Partial { translations, .. } => {
                assert_eq!(
                    translations,
                    vec![Some("하나".to_string()), None, Some("셋".to_string())]
                );
            }
            other => panic!("expected partial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_translate_empty_choices_is_parse_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&mock_server)
            .await;

        let provider = create_provider(ProviderId::OpenAi, &mock_server.uri(), "gpt-4o-mini");
        let err = provider
            .translate(&strings(&["one"]), &TranslateOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn test_translate_classifies_http_errors() {
        let cases = [
            (401, r#"{"error": {"message": "Invalid API key"}}"#, ErrorKind::Auth),
            (400, r#"{"error": {"message": "Bad request"}}"#, ErrorKind::Client),
            (429, r#"{"error": {"message": "Rate limit reached"}}"#, ErrorKind::RateLimit),
            (
                429,
                r#"{"error": {"message": "You exceeded your current quota", "type": "insufficient_quota"}}"#,
                ErrorKind::Quota,
            ),
            (500, "Internal Server Error", ErrorKind::Server),
        ];

        for (status, body, expected) in cases {
            let mock_server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/chat/completions"))
                .respond_with(ResponseTemplate::new(status).set_body_string(body))
                .expect(1)
                .mount(&mock_server)
                .await;

            let provider = create_provider(ProviderId::OpenAi, &mock_server.uri(), "gpt-4o-mini");
            let err = provider
                .translate(&strings(&["one"]), &TranslateOptions::default())
                .await
                .unwrap_err();

            assert_eq!(err.kind(), expected, "status {} body {}", status, body);
            assert!(err.to_string().contains(&status.to_string()));
        }
    }

    #[tokio::test]
    async fn test_translate_network_error() {
        let provider = create_provider(ProviderId::OpenAi, "http://127.0.0.1:1", "gpt-4o-mini");
        let err = provider
            .translate(&strings(&["one"]), &TranslateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Network { .. }));
        assert!(err.is_retryable());
    }
}
