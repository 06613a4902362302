//! Opt-in JSONL audit trail of a translation run.
//!
//! Each event is one JSON object per line in
//! `{dir}/translation-debug-{session}.jsonl`. Text-bearing fields are reduced
//! to a preview, a short hash and a length unless verbatim text logging is
//! switched on; credential fields are always replaced.

use crate::config::Config;
use crate::error::TranslateError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, warn};

/// Characters kept in a redacted preview
pub const PREVIEW_CHARS: usize = 40;
/// Hex characters kept from the SHA-256 digest
pub const HASH_CHARS: usize = 12;

const TEXT_KEYS: &[&str] = &[
    "text",
    "texts",
    "source",
    "sources",
    "original",
    "translated",
    "translations",
    "prompt",
    "body",
    "request_body",
    "response_body",
];

const CREDENTIAL_KEYS: &[&str] = &["api_key", "key", "authorization", "token", "secret", "password"];

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RunStart,
    RunEnd,
    RunError,
    ProviderRequest,
    ProviderSuccess,
    ProviderError,
    Fallback,
    QualityCheck,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RunStart => "run_start",
            EventKind::RunEnd => "run_end",
            EventKind::RunError => "run_error",
            EventKind::ProviderRequest => "provider_request",
            EventKind::ProviderSuccess => "provider_success",
            EventKind::ProviderError => "provider_error",
            EventKind::Fallback => "fallback",
            EventKind::QualityCheck => "quality_check",
        }
    }
}

/// The record that was written, or nothing when logging is off.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DebugEvent(Option<Value>);

impl DebugEvent {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.as_ref().and_then(|v| v.get(key))
    }

    pub fn as_value(&self) -> Option<&Value> {
        self.0.as_ref()
    }
}

struct Sink {
    file: File,
    pending: HashMap<String, Instant>,
}

pub struct DebugLogger {
    sink: Option<Mutex<Sink>>,
    path: Option<PathBuf>,
    session: String,
    log_text: bool,
}

impl DebugLogger {
    /// A logger that records nothing
    pub fn disabled() -> Self {
        Self {
            sink: None,
            path: None,
            session: String::new(),
            log_text: false,
        }
    }

    /// Open a session file under `dir`, creating the directory if needed.
    pub fn open(dir: &Path, session: &str, log_text: bool) -> Result<Self, TranslateError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("translation-debug-{}.jsonl", session));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Translation debug log: {}", path.display());

        Ok(Self {
            sink: Some(Mutex::new(Sink {
                file,
                pending: HashMap::new(),
            })),
            path: Some(path),
            session: session.to_string(),
            log_text,
        })
    }

    /// Disabled unless `TRANSLATION_DEBUG_LOG` is on
    pub fn from_config(config: &Config) -> Result<Self, TranslateError> {
        if !config.debug_log {
            return Ok(Self::disabled());
        }
        Self::open(&config.debug_dir, &new_session_id(), config.debug_log_text)
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// Record a standalone event
    pub fn event(&self, kind: EventKind, fields: Value) -> DebugEvent {
        self.write(kind, fields, |_| None)
    }

    /// Record a `provider_request` and start timing `correlation`
    pub fn request(&self, correlation: &str, fields: Value) -> DebugEvent {
        self.write(EventKind::ProviderRequest, fields, |pending| {
            pending.insert(correlation.to_string(), Instant::now());
            None
        })
    }

    /// Record the end of a request, adding `duration_ms` when it was timed
    pub fn finish(&self, kind: EventKind, correlation: &str, fields: Value) -> DebugEvent {
        self.write(kind, fields, |pending| {
            pending
                .remove(correlation)
                .map(|started| started.elapsed().as_millis() as u64)
        })
    }

    fn write<F>(&self, kind: EventKind, fields: Value, timing: F) -> DebugEvent
    where
        F: FnOnce(&mut HashMap<String, Instant>) -> Option<u64>,
    {
        let Some(sink) = &self.sink else {
            return DebugEvent::empty();
        };
        let mut sink = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut record = Map::new();
        record.insert("ts".to_string(), json!(Utc::now().to_rfc3339()));
        record.insert("session".to_string(), json!(self.session));
        record.insert("event".to_string(), json!(kind.as_str()));

        match redact(fields, self.log_text) {
            Value::Object(map) => record.extend(map),
            Value::Null => {}
            other => {
                record.insert("data".to_string(), other);
            }
        }

        if let Some(duration_ms) = timing(&mut sink.pending) {
            record.insert("duration_ms".to_string(), json!(duration_ms));
        }

        let record = Value::Object(record);
        if let Err(e) = writeln!(sink.file, "{}", record) {
            warn!("Failed to write translation debug log: {}", e);
        }

        DebugEvent(Some(record))
    }
}

fn new_session_id() -> String {
    format!(
        "{}-{}",
        Utc::now().format("%Y%m%dT%H%M%S%.3fZ"),
        std::process::id()
    )
}

/// Preview, short hash and length of a text
pub fn summarize_text(text: &str) -> Value {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    json!({
        "preview": text.chars().take(PREVIEW_CHARS).collect::<String>(),
        "hash": &digest[..HASH_CHARS],
        "length": text.chars().count(),
    })
}

/// Replace credentials everywhere and, unless `log_text`, summarize text fields.
pub fn redact(value: Value, log_text: bool) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let lower = key.to_ascii_lowercase();
                    let value = if CREDENTIAL_KEYS.contains(&lower.as_str()) {
                        json!(REDACTED)
                    } else if !log_text && TEXT_KEYS.contains(&lower.as_str()) {
                        summarize_value(value)
                    } else {
                        redact(value, log_text)
                    };
                    (key, value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| redact(v, log_text)).collect()),
        other => other,
    }
}

fn summarize_value(value: Value) -> Value {
    match value {
        Value::String(text) => summarize_text(&text),
        Value::Array(items) => Value::Array(items.into_iter().map(summarize_value).collect()),
        other => redact(other, false),
    }
}
