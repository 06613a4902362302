//! Changelog translation engine.
//!
//! Turns ordered lists of short English changelog entries into translations
//! by walking a fallback chain of LLM and machine-translation providers. The
//! run never fails because a provider is down: the chain always ends with an
//! identity provider, and degraded batches are visible in the provenance.

pub mod batch;
pub mod config;
pub mod debug_log;
pub mod error;
pub mod fallback;
pub mod merge;
pub mod model_chain;
pub mod orchestrator;
pub mod providers;
pub mod quality;
pub mod retry;

pub use error::{ErrorKind, ProviderError, TranslateError};
pub use model_chain::RunContext;
pub use orchestrator::{
    BatchProvenance, Orchestrator, TranslatedEntry, TranslationEntry, TranslationOutcome,
};
pub use providers::{ProviderId, ProviderTable, TranslationProvider};
