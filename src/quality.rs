//! Batch-level translation quality gate.
//!
//! Flags entries whose translation is blank, or that came back identical to a
//! source long enough that an echo cannot be a legitimate translation. A batch
//! fails the gate when the share of flagged entries is strictly above the
//! threshold.

use serde::Serialize;
use std::fmt;

/// Sources shorter than this may legitimately stay untranslated
pub const MIN_SUBSTANTIAL_CHARS: usize = 20;
/// Minimum whitespace-separated words for a substantial source
pub const MIN_SUBSTANTIAL_WORDS: usize = 3;
/// Minimum share of alphabetic characters among non-whitespace characters
pub const MIN_ALPHABETIC_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningReason {
    /// Translation is empty, whitespace-only or missing
    Blank,
    /// Translation equals a substantial source
    Untranslated,
}

impl fmt::Display for WarningReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningReason::Blank => f.write_str("blank translation"),
            WarningReason::Untranslated => f.write_str("translation identical to source"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityWarning {
    /// Index within the assessed batch
    pub index: usize,
    pub reason: WarningReason,
}

/// Outcome of gating one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityVerdict {
    pub warning_count: usize,
    pub total: usize,
    pub ratio: f64,
    pub is_poor_quality: bool,
    pub warnings: Vec<QualityWarning>,
}

impl QualityVerdict {
    /// Indices of flagged entries, ascending
    pub fn flagged_indices(&self) -> Vec<usize> {
        self.warnings.iter().map(|w| w.index).collect()
    }
}

/// Whether an untranslated echo of `source` should count as a failure.
pub fn is_substantial(source: &str) -> bool {
    let trimmed = source.trim();
    if trimmed.chars().count() < MIN_SUBSTANTIAL_CHARS {
        return false;
    }
    if trimmed.split_whitespace().count() < MIN_SUBSTANTIAL_WORDS {
        return false;
    }

    let (alphabetic, visible) = trimmed
        .chars()
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(alpha, total), c| {
            (alpha + usize::from(c.is_alphabetic()), total + 1)
        });

    visible > 0 && alphabetic as f64 / visible as f64 >= MIN_ALPHABETIC_RATIO
}

/// Check a single pair
pub fn check_pair(source: &str, translation: Option<&str>) -> Option<WarningReason> {
    let translation = translation.map(str::trim).unwrap_or("");
    if translation.is_empty() {
        return Some(WarningReason::Blank);
    }
    if translation == source.trim() && is_substantial(source) {
        return Some(WarningReason::Untranslated);
    }
    None
}

/// Gate a batch. Missing translations count as blank; an empty batch passes.
pub fn assess<S: AsRef<str>>(sources: &[String], translations: &[S], threshold: f64) -> QualityVerdict {
    let warnings: Vec<QualityWarning> = sources
        .iter()
        .enumerate()
        .filter_map(|(index, source)| {
            let translation = translations.get(index).map(|t| t.as_ref());
            check_pair(source, translation).map(|reason| QualityWarning { index, reason })
        })
        .collect();

    let total = sources.len();
    let ratio = if total == 0 {
        0.0
    } else {
        warnings.len() as f64 / total as f64
    };

    QualityVerdict {
        warning_count: warnings.len(),
        total,
        ratio,
        is_poor_quality: ratio > threshold,
        warnings,
    }
}
