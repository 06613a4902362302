//! Numbered-line prompt format shared by the LLM adapters.
//!
//! Texts are sent as `1. ...`, `2. ...` lines and the model is asked to
//! answer with the same numbering, which lets us realign answers even when a
//! line is dropped.

use crate::batch::char_len_sum;
use crate::error::ProviderError;
use crate::providers::{CallMeta, ProviderCallResult, ProviderId};
use regex::Regex;
use std::sync::OnceLock;

static NUMBERED_LINE_REGEX: OnceLock<Regex> = OnceLock::new();

/// Build the system prompt for changelog translation
pub fn build_system_prompt(target_language: &str) -> String {
    format!(
        r#"You are a professional technical translator. Translate software changelog entries from English to {}.

## Translation Rules

### DO NOT translate:
- Code spans and anything inside backticks (e.g., `--verbose`, `useEffect`)
- URLs and links
- File paths (e.g., src/main.rs, ~/.config/app.toml)
- CLI commands, flags and environment variables
- Product, library and API names

### Remove before translating:
- Conventional-commit prefixes such as "feat:", "fix(parser):", "chore!:", "docs:"

### Formatting:
- Preserve markdown formatting
- Keep each entry on a single line

### Output format:
- Answer with exactly one line per entry, numbered exactly as in the input ("1. ...", "2. ...")
- Output only the numbered translations, with no commentary"#,
        target_language
    )
}

/// Build the user prompt listing the numbered entries
pub fn build_user_prompt(texts: &[String], target_language: &str) -> String {
    let numbered = texts
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. {}", i + 1, t.replace('\n', " ")))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Translate the following {} changelog entries to {}:\n\n{}",
        texts.len(),
        target_language,
        numbered
    )
}

fn numbered_line_regex() -> &'static Regex {
    NUMBERED_LINE_REGEX.get_or_init(|| Regex::new(r"^\s*(\d+)\s*[.):\]]\s?(.*)$").unwrap())
}

fn content_lines(response: &str) -> Vec<&str> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .collect()
}

/// Parse a numbered-line answer into `expected` slots.
///
/// Numbered lines are placed by their number. If that does not fill every
/// slot, a plain newline split is tried and accepted when it yields exactly
/// `expected` lines. Otherwise whatever could be aligned is returned, with
/// `None` for each missing entry.
pub fn parse_numbered_response(response: &str, expected: usize) -> Vec<Option<String>> {
    let regex = numbered_line_regex();
    let lines = content_lines(response);
    let mut slots: Vec<Option<String>> = vec![None; expected];

    for line in &lines {
        if let Some(cap) = regex.captures(line) {
            let Ok(number) = cap[1].parse::<usize>() else {
                continue;
            };
            let content = cap[2].trim();
            if number >= 1 && number <= expected && slots[number - 1].is_none() && !content.is_empty() {
                slots[number - 1] = Some(content.to_string());
            }
        }
    }

    if slots.iter().all(Option::is_some) {
        return slots;
    }

    // Newline-split fallback
    let split: Vec<String> = lines
        .iter()
        .map(|line| match regex.captures(line) {
            Some(cap) => cap[2].trim().to_string(),
            None => line.to_string(),
        })
        .filter(|line| !line.is_empty())
        .collect();

    if split.len() == expected {
        return split.into_iter().map(Some).collect();
    }

    if slots.iter().any(Option::is_some) {
        return slots;
    }

    if split.len() < expected {
        for (slot, line) in slots.iter_mut().zip(split) {
            *slot = Some(line);
        }
    }
    slots
}

/// Turn parsed slots into a complete result or a typed failure.
///
/// All slots filled is a success; some filled is [`ProviderError::Partial`];
/// none filled is [`ProviderError::Parse`].
pub fn into_call_result(
    provider: ProviderId,
    meta: CallMeta,
    texts: &[String],
    slots: Vec<Option<String>>,
) -> Result<ProviderCallResult, ProviderError> {
    let char_count = char_len_sum(texts);
    let received = slots.iter().filter(|s| s.is_some()).count();

    if received == texts.len() && slots.len() == texts.len() {
        return Ok(ProviderCallResult {
            translations: slots.into_iter().flatten().collect(),
            char_count,
            meta,
        });
    }

    if received == 0 {
        return Err(ProviderError::Parse {
            provider,
            message: format!("no usable translations for {} entries", texts.len()),
        });
    }

    Err(ProviderError::Partial {
        provider,
        meta,
        translations: slots,
        char_count,
    })
}
