use crate::batch::BatchLimits;
use crate::providers::ProviderId;
use crate::retry::RetryConfig;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODELS: &[&str] =
    &["gemini-2.5-flash", "gemini-2.5-flash-lite", "gemini-2.0-flash"];
pub const DEFAULT_GLM_API_URL: &str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";
pub const DEFAULT_GLM_MODEL: &str = "glm-4-flash";
pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GOOGLE_TRANSLATE_API_URL: &str =
    "https://translation.googleapis.com/language/translate/v2";

#[derive(Debug, Clone)]
pub struct Config {
    // Engine selection
    pub translation_engine: Option<String>,
    pub fallback_chain: Option<String>,
    pub target_language: String,
    pub target_code: String,

    // Gemini
    pub gemini_api_key: Option<String>,
    pub gemini_api_url: String,
    pub gemini_models: Vec<String>,

    // GLM (Zhipu)
    pub glm_api_key: Option<String>,
    pub glm_api_url: String,
    pub glm_model: String,

    // OpenAI-compatible
    pub openai_api_key: Option<String>,
    pub openai_api_url: String,
    pub openai_model: String,
    pub openai_provider_name: String,

    // Google Translate
    pub google_translate_api_key: Option<String>,
    pub google_translate_api_url: String,

    // Batching and pacing
    pub batch_size: usize,
    pub batch_max_chars: usize,
    pub batch_delay_ms: u64,
    pub max_retries: u32,
    pub timeout_secs: u64,

    // Quality gates
    pub quality_threshold: f64,
    pub retranslate_quality_threshold: f64,

    // Debug log
    pub debug_log: bool,
    pub debug_log_text: bool,
    pub debug_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            translation_engine: None,
            fallback_chain: None,
            target_language: "Korean".to_string(),
            target_code: "ko".to_string(),
            gemini_api_key: None,
            gemini_api_url: DEFAULT_GEMINI_API_URL.to_string(),
            gemini_models: DEFAULT_GEMINI_MODELS.iter().map(|m| m.to_string()).collect(),
            glm_api_key: None,
            glm_api_url: DEFAULT_GLM_API_URL.to_string(),
            glm_model: DEFAULT_GLM_MODEL.to_string(),
            openai_api_key: None,
            openai_api_url: DEFAULT_OPENAI_API_URL.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_provider_name: "openai".to_string(),
            google_translate_api_key: None,
            google_translate_api_url: DEFAULT_GOOGLE_TRANSLATE_API_URL.to_string(),
            batch_size: 20,
            batch_max_chars: 4000,
            batch_delay_ms: 1000,
            max_retries: 3,
            timeout_secs: 60,
            quality_threshold: 0.05,
            retranslate_quality_threshold: 0.10,
            debug_log: false,
            debug_log_text: false,
            debug_dir: PathBuf::from("logs/translation"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key/value source (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            // Engine selection (validated when the engine is selected)
            translation_engine: get("TRANSLATION_ENGINE"),
            fallback_chain: get("TRANSLATION_FALLBACK_CHAIN"),
            target_language: get("TRANSLATION_TARGET_LANGUAGE")
                .unwrap_or(defaults.target_language),
            target_code: get("TRANSLATION_TARGET_CODE").unwrap_or(defaults.target_code),

            // Gemini
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_api_url: get("GEMINI_API_URL").unwrap_or(defaults.gemini_api_url),
            gemini_models: get("GEMINI_MODELS")
                .map(|v| split_list(&v))
                .filter(|models| !models.is_empty())
                .unwrap_or(defaults.gemini_models),

            // GLM
            glm_api_key: get("GLM_API_KEY"),
            glm_api_url: get("GLM_API_URL").unwrap_or(defaults.glm_api_url),
            glm_model: get("GLM_MODEL").unwrap_or(defaults.glm_model),

            // OpenAI-compatible
            openai_api_key: get("OPENAI_API_KEY"),
            openai_api_url: get("OPENAI_API_URL").unwrap_or(defaults.openai_api_url),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openai_provider_name: get("OPENAI_PROVIDER_NAME")
                .unwrap_or(defaults.openai_provider_name),

            // Google Translate
            google_translate_api_key: get("GOOGLE_TRANSLATE_API_KEY"),
            google_translate_api_url: get("GOOGLE_TRANSLATE_API_URL")
                .unwrap_or(defaults.google_translate_api_url),

            // Batching and pacing
            batch_size: parse_or(get("TRANSLATION_BATCH_SIZE"), "TRANSLATION_BATCH_SIZE", defaults.batch_size)?,
            batch_max_chars: parse_or(
                get("TRANSLATION_BATCH_MAX_CHARS"),
                "TRANSLATION_BATCH_MAX_CHARS",
                defaults.batch_max_chars,
            )?,
            batch_delay_ms: parse_or(
                get("TRANSLATION_BATCH_DELAY_MS"),
                "TRANSLATION_BATCH_DELAY_MS",
                defaults.batch_delay_ms,
            )?,
            max_retries: parse_or(get("TRANSLATION_MAX_RETRIES"), "TRANSLATION_MAX_RETRIES", defaults.max_retries)?
                .max(1),
            timeout_secs: parse_or(get("TRANSLATION_TIMEOUT_SECS"), "TRANSLATION_TIMEOUT_SECS", defaults.timeout_secs)?,

            // Quality gates
            quality_threshold: parse_or(
                get("TRANSLATION_QUALITY_THRESHOLD"),
                "TRANSLATION_QUALITY_THRESHOLD",
                defaults.quality_threshold,
            )?,
            retranslate_quality_threshold: parse_or(
                get("RETRANSLATE_QUALITY_THRESHOLD"),
                "RETRANSLATE_QUALITY_THRESHOLD",
                defaults.retranslate_quality_threshold,
            )?,

            // Debug log
            debug_log: get("TRANSLATION_DEBUG_LOG").map(|v| is_truthy(&v)).unwrap_or(false),
            debug_log_text: get("TRANSLATION_DEBUG_LOG_TEXT")
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
            debug_dir: get("TRANSLATION_DEBUG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.debug_dir),
        })
    }

    /// Whether credentials for `provider` are present. Mock needs none.
    pub fn has_credentials(&self, provider: ProviderId) -> bool {
        match provider {
            ProviderId::Gemini => self.gemini_api_key.is_some(),
            ProviderId::Glm => self.glm_api_key.is_some(),
            ProviderId::OpenAi => self.openai_api_key.is_some(),
            ProviderId::Google => self.google_translate_api_key.is_some(),
            ProviderId::Mock => true,
        }
    }

    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits::new(self.batch_size, self.batch_max_chars)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn retry_config(&self) -> RetryConfig {
        let retry = RetryConfig::translation()
            .with_attempt_timeout(Duration::from_secs(self.timeout_secs.max(1)));
        RetryConfig {
            max_attempts: self.max_retries.max(1),
            ..retry
        }
    }
}

/// Split a comma- or whitespace-separated list, dropping empty entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .parse()
            .with_context(|| format!("{} has an invalid value: '{}'", key, v)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // ==================== Defaults ====================

    #[test]
    fn test_defaults_without_environment() {
        let config = Config::from_lookup(lookup_from(&[])).expect("Should load");

        assert!(config.translation_engine.is_none());
        assert!(config.fallback_chain.is_none());
        assert_eq!(config.target_language, "Korean");
        assert_eq!(config.target_code, "ko");
        assert_eq!(config.gemini_models.len(), 3);
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.batch_delay_ms, 1000);
        assert!((config.quality_threshold - 0.05).abs() < f64::EPSILON);
        assert!((config.retranslate_quality_threshold - 0.10).abs() < f64::EPSILON);
        assert!(!config.debug_log);
        assert!(!config.debug_log_text);
    }

    #[test]
    fn test_only_mock_credentialed_by_default() {
        let config = Config::default();
        assert!(config.has_credentials(ProviderId::Mock));
        assert!(!config.has_credentials(ProviderId::Gemini));
        assert!(!config.has_credentials(ProviderId::Glm));
        assert!(!config.has_credentials(ProviderId::OpenAi));
        assert!(!config.has_credentials(ProviderId::Google));
    }

    // ==================== Parsing ====================

    #[test]
    fn test_reads_credentials_and_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("TRANSLATION_ENGINE", "gemini"),
            ("GEMINI_API_KEY", "g-key"),
            ("GEMINI_MODELS", "gemini-a, gemini-b"),
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-5-mini"),
            ("TRANSLATION_BATCH_SIZE", "5"),
            ("TRANSLATION_QUALITY_THRESHOLD", "0.2"),
            ("TRANSLATION_DEBUG_LOG", "TRUE"),
        ]))
        .expect("Should load");

        assert_eq!(config.translation_engine.as_deref(), Some("gemini"));
        assert_eq!(config.gemini_api_key.as_deref(), Some("g-key"));
        assert_eq!(config.gemini_models, vec!["gemini-a", "gemini-b"]);
        assert_eq!(config.openai_model, "gpt-5-mini");
        assert_eq!(config.batch_size, 5);
        assert!((config.quality_threshold - 0.2).abs() < f64::EPSILON);
        assert!(config.debug_log);
        assert!(config.has_credentials(ProviderId::Gemini));
        assert!(config.has_credentials(ProviderId::OpenAi));
    }

    #[test]
    fn test_blank_credentials_count_as_absent() {
        let config = Config::from_lookup(lookup_from(&[
            ("GLM_API_KEY", "   "),
            ("GOOGLE_TRANSLATE_API_KEY", ""),
        ]))
        .expect("Should load");

        assert!(!config.has_credentials(ProviderId::Glm));
        assert!(!config.has_credentials(ProviderId::Google));
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[("TRANSLATION_BATCH_SIZE", "many")]));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("TRANSLATION_BATCH_SIZE"));
        assert!(err.contains("many"));
    }

    #[test]
    fn test_zero_retries_clamped_to_one() {
        let config = Config::from_lookup(lookup_from(&[("TRANSLATION_MAX_RETRIES", "0")]))
            .expect("Should load");
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.retry_config().max_attempts, 1);
    }

    #[test]
    fn test_retry_config_uses_timeout() {
        let config = Config::from_lookup(lookup_from(&[("TRANSLATION_TIMEOUT_SECS", "7")]))
            .expect("Should load");
        let retry = config.retry_config();
        assert_eq!(retry.attempt_timeout, Duration::from_secs(7));
        assert_eq!(retry.max_attempts, 3);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("gemini, glm  openai,,mock"), vec!["gemini", "glm", "openai", "mock"]);
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_is_truthy() {
        for v in ["1", "true", "Yes", "ON"] {
            assert!(is_truthy(v), "{} should be truthy", v);
        }
        for v in ["0", "false", "no", "off", "maybe"] {
            assert!(!is_truthy(v), "{} should not be truthy", v);
        }
    }

    // ==================== Environment ====================

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        std::env::set_var("TRANSLATION_TARGET_CODE", "ja");
        std::env::set_var("TRANSLATION_BATCH_DELAY_MS", "0");

        let config = Config::from_env().expect("Should load");

        std::env::remove_var("TRANSLATION_TARGET_CODE");
        std::env::remove_var("TRANSLATION_BATCH_DELAY_MS");

        assert_eq!(config.target_code, "ja");
        assert_eq!(config.batch_delay(), Duration::ZERO);
    }
}
