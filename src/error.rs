//! Error taxonomy for provider calls and orchestration.
//!
//! Every failed provider call is mapped onto an [`ErrorKind`], which decides
//! whether the retry controller tries again, the model chain switches models,
//! or the orchestrator escalates to the next provider.

use crate::providers::{CallMeta, ProviderId};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Classification of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing credentials
    Auth,
    /// Daily/account quota reached, or the requested model is unavailable
    Quota,
    /// Transient per-minute rate limiting
    RateLimit,
    /// Backend-side failure, overload or timeout
    Server,
    /// Malformed request
    Client,
    /// Response shape was not what we expected
    Parse,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Quota => "quota",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Server => "server",
            ErrorKind::Client => "client",
            ErrorKind::Parse => "parse",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Whether another attempt against the same provider and model can help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit | ErrorKind::Server | ErrorKind::Unknown
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body markers for account-level or daily quota exhaustion.
///
/// A 429 carrying one of these is a `Quota` error; a bare 429 is a `RateLimit`.
const QUOTA_MARKERS: &[&str] = &[
    "exceeded your current quota",
    "quota exceeded",
    "quotaexceeded",
    "perday",
    "per day",
    "per_day",
    "daily limit",
    "insufficient_quota",
    "billing",
    "insufficient balance",
    "余额不足",
    "\"1113\"",
];

/// Body markers that, next to the word "model", mean the model cannot be served.
const MODEL_UNAVAILABLE_MARKERS: &[&str] = &[
    "not found",
    "not supported",
    "unavailable",
    "does not exist",
];

/// Body markers for sustained overload (503-style) responses.
const OVERLOAD_MARKERS: &[&str] = &["overloaded", "unavailable", "try again later"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Map an HTTP status and response body onto an [`ErrorKind`].
///
/// The status alone is ambiguous for 429 (rate limit vs. quota) and for
/// 400/404 (bad request vs. retired model), so the body is inspected too.
pub fn classify(status: u16, body: &str) -> ErrorKind {
    let lower = body.to_lowercase();

    match status {
        401 | 403 => ErrorKind::Auth,
        429 => {
            if contains_any(&lower, QUOTA_MARKERS) {
                ErrorKind::Quota
            } else {
                ErrorKind::RateLimit
            }
        }
        400 | 404 if lower.contains("model") && contains_any(&lower, MODEL_UNAVAILABLE_MARKERS) => {
            ErrorKind::Quota
        }
        408 => ErrorKind::Server,
        400..=499 => ErrorKind::Client,
        500..=599 => ErrorKind::Server,
        _ => ErrorKind::Unknown,
    }
}

/// Failure of a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} API error ({status}, {kind}): {body}")]
    Api {
        provider: ProviderId,
        status: u16,
        kind: ErrorKind,
        body: String,
    },

    #[error("{provider} request timed out after {timeout:?}")]
    Timeout {
        provider: ProviderId,
        timeout: Duration,
    },

    #[error("failed to reach {provider}: {message}")]
    Network {
        provider: ProviderId,
        message: String,
    },

    #[error("failed to parse {provider} response: {message}")]
    Parse {
        provider: ProviderId,
        message: String,
    },

    /// The provider answered, but with fewer translations than requested.
    ///
    /// `translations` is aligned with the request; `None` marks a missing item.
    #[error("{provider} returned {} of {} translations", received_count(.translations), .translations.len())]
    Partial {
        provider: ProviderId,
        meta: CallMeta,
        translations: Vec<Option<String>>,
        char_count: usize,
    },

    #[error("{provider} is not configured: {message}")]
    NotConfigured {
        provider: ProviderId,
        message: String,
    },
}

fn received_count(translations: &[Option<String>]) -> usize {
    translations.iter().filter(|t| t.is_some()).count()
}

impl ProviderError {
    /// Build an API error, classifying it from status and body.
    pub fn api(provider: ProviderId, status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let kind = classify(status, &body);
        ProviderError::Api {
            provider,
            status,
            kind,
            body,
        }
    }

    /// Convert a transport-level reqwest error.
    ///
    /// The URL is dropped from the message since some backends take their
    /// API key as a query parameter.
    pub fn from_reqwest(provider: ProviderId, error: reqwest::Error) -> Self {
        let error = error.without_url();
        if error.is_decode() {
            ProviderError::Parse {
                provider,
                message: error.to_string(),
            }
        } else {
            ProviderError::Network {
                provider,
                message: error.to_string(),
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Api { kind, .. } => *kind,
            ProviderError::Timeout { .. } => ErrorKind::Server,
            ProviderError::Network { .. } => ErrorKind::Unknown,
            ProviderError::Parse { .. } | ProviderError::Partial { .. } => ErrorKind::Parse,
            ProviderError::NotConfigured { .. } => ErrorKind::Auth,
        }
    }

    pub fn provider(&self) -> ProviderId {
        match self {
            ProviderError::Api { provider, .. }
            | ProviderError::Timeout { provider, .. }
            | ProviderError::Network { provider, .. }
            | ProviderError::Parse { provider, .. }
            | ProviderError::Partial { provider, .. }
            | ProviderError::NotConfigured { provider, .. } => *provider,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Server-class failure that signals the backend is overloaded or hanging.
    ///
    /// Consecutive overloads let the retry controller give up early.
    pub fn is_overload(&self) -> bool {
        match self {
            ProviderError::Timeout { .. } => true,
            ProviderError::Api {
                status, kind, body, ..
            } => {
                *kind == ErrorKind::Server
                    && (*status == 503
                        || *status == 529
                        || contains_any(&body.to_lowercase(), OVERLOAD_MARKERS))
            }
            _ => false,
        }
    }
}

/// Errors surfaced to the caller of the orchestration engine.
///
/// Provider failures never appear here: the identity provider at the end of
/// every fallback chain cannot fail, so only configuration problems are fatal.
/// `NoProviderAvailable` is reachable only with a hand-built provider table
/// that leaves the identity provider out.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("invalid translation engine '{value}': expected one of {allowed}")]
    InvalidEngine { value: String, allowed: String },

    #[error("unknown provider '{name}' in fallback chain: expected one of {allowed}")]
    UnknownProvider { name: String, allowed: String },

    #[error("debug log error: {0}")]
    DebugLog(#[from] std::io::Error),

    #[error("no provider produced a translation for {len} entries at offset {offset}")]
    NoProviderAvailable { offset: usize, len: usize },
}
