use crate::debug_log::{DebugLogger, EventKind};
use crate::error::{ErrorKind, ProviderError};
use crate::providers::{ProviderCallResult, ProviderId, TranslateOptions, TranslationProvider};
use crate::retry::{with_retry_classified, RetryConfig};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Per-run memory shared by every batch of one top-level call.
///
/// Records `(provider, model)` pairs that reported quota exhaustion so later
/// batches skip them without spending a request.
#[derive(Debug, Default, Clone)]
pub struct RunContext {
    exhausted: HashSet<(ProviderId, String)>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_exhausted(&mut self, provider: ProviderId, model: &str) {
        if self.exhausted.insert((provider, model.to_string())) {
            info!("{} model {} marked exhausted for this run", provider, model);
        }
    }

    pub fn is_exhausted(&self, provider: ProviderId, model: &str) -> bool {
        self.exhausted.contains(&(provider, model.to_string()))
    }

    /// True when every listed model of `provider` is exhausted
    pub fn all_exhausted(&self, provider: ProviderId, models: &[String]) -> bool {
        models.iter().all(|m| self.is_exhausted(provider, m))
    }

    pub fn exhausted_count(&self) -> usize {
        self.exhausted.len()
    }
}

/// Result of walking one provider's models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    Completed(ProviderCallResult),
    /// Every model is out of quota; move on to the next provider
    Exhausted,
}

/// Try `models` of `provider` in order, each through the retry controller.
///
/// Models already exhausted in `ctx` are skipped. A quota failure marks the
/// model exhausted and moves to the next one; any other failure is returned
/// unchanged. `correlation` prefixes the debug-log keys of each attempt.
#[allow(clippy::too_many_arguments)]
pub async fn run_model_chain(
    provider: &dyn TranslationProvider,
    models: &[String],
    texts: &[String],
    options: &TranslateOptions,
    ctx: &mut RunContext,
    retry: &RetryConfig,
    logger: &DebugLogger,
    correlation: &str,
) -> Result<ChainOutcome, ProviderError> {
    let id = provider.id();

    for model in models {
        if ctx.is_exhausted(id, model) {
            debug!("{}: skipping exhausted model {}", id, model);
            continue;
        }

        let model_options = options.with_model(model);
        let operation_name = format!("{} {}", id, model);

        let result = with_retry_classified(
            retry,
            &operation_name,
            |attempt| {
                let key = attempt_key(id, model, correlation, attempt);
                let model_options = &model_options;
                async move {
                    logger.request(
                        &key,
                        json!({
                            "provider": id,
                            "model": model,
                            "attempt": attempt + 1,
                            "count": texts.len(),
                            "texts": texts,
                        }),
                    );
                    let result = provider.translate(texts, model_options).await;
                    match &result {
                        Ok(call) => {
                            logger.finish(
                                EventKind::ProviderSuccess,
                                &key,
                                json!({
                                    "provider": id,
                                    "model": call.meta.model,
                                    "endpoint_type": call.meta.endpoint_type,
                                    "char_count": call.char_count,
                                    "translations": call.translations,
                                }),
                            );
                        }
                        Err(e) => {
                            logger.finish(
                                EventKind::ProviderError,
                                &key,
                                error_fields(model, e),
                            );
                        }
                    }
                    result
                }
            },
            |attempt, timeout| {
                // The attempt future was dropped before it could log its own failure
                let error = ProviderError::Timeout {
                    provider: id,
                    timeout,
                };
                logger.finish(
                    EventKind::ProviderError,
                    &attempt_key(id, model, correlation, attempt),
                    error_fields(model, &error),
                );
                error
            },
        )
        .await;

        match result {
            Ok(call) => return Ok(ChainOutcome::Completed(call)),
            Err(e) if e.kind() == ErrorKind::Quota => {
                warn!("{} model {} is out of quota: {}", id, model, e);
                ctx.mark_exhausted(id, model);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(ChainOutcome::Exhausted)
}

fn attempt_key(id: ProviderId, model: &str, correlation: &str, attempt: u32) -> String {
    format!("{}:{}:{}:{}", id, model, correlation, attempt)
}

/// Debug-log fields for a failed attempt.
///
/// Response bodies go under `response_body` so the logger summarises them
/// like any other text.
fn error_fields(model: &str, error: &ProviderError) -> Value {
    let mut fields = json!({
        "provider": error.provider(),
        "model": model,
        "kind": error.kind(),
    });
    match error {
        ProviderError::Api { status, body, .. } => {
            fields["status"] = json!(status);
            fields["response_body"] = json!(body);
        }
        other => {
            fields["error"] = json!(other.to_string());
        }
    }
    fields
}
