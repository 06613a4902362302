use crate::batch::char_len_sum;
use crate::error::ProviderError;
use crate::providers::{
    CallMeta, ProviderCallResult, ProviderId, TranslateOptions, TranslationProvider,
};
use async_trait::async_trait;

const IDENTITY: &str = "identity";

/// Identity provider: returns every text unchanged and never fails.
///
/// Always the last entry of a fallback chain, so a run finishes even when
/// every real backend is down.
#[derive(Debug, Clone, Default)]
pub struct MockProvider;

impl MockProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Mock
    }

    fn models(&self) -> Vec<String> {
        vec![IDENTITY.to_string()]
    }

    async fn translate(
        &self,
        texts: &[String],
        _options: &TranslateOptions,
    ) -> Result<ProviderCallResult, ProviderError> {
        Ok(ProviderCallResult {
            translations: texts.to_vec(),
            char_count: char_len_sum(texts),
            meta: CallMeta {
                provider: "mock".to_string(),
                model: IDENTITY.to_string(),
                endpoint_type: IDENTITY.to_string(),
            },
        })
    }
}
