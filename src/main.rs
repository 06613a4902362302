//! Translate changelog entries read from a JSON file.
//!
//! Usage:
//!   changelog-translate <input.json> [output.json]
//!
//! The input is either an array of `{"original": "..."}` entries or an object
//! mapping a version label to such an array. Output goes to `output.json`, or
//! stdout when no path is given.

use anyhow::{Context, Result};
use changelog_translate::config::Config;
use changelog_translate::orchestrator::{
    BatchProvenance, Orchestrator, TranslatedEntry, TranslationEntry,
};
use changelog_translate::RunContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Input {
    Entries(Vec<TranslationEntry>),
    Groups(BTreeMap<String, Vec<TranslationEntry>>),
}

#[derive(Debug, Serialize)]
struct GroupOutput {
    label: String,
    entries: Vec<TranslatedEntry>,
    provenance: Vec<BatchProvenance>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in CI)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("changelog_translate=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(input_path) = args.get(1) else {
        anyhow::bail!("Usage: {} <input.json> [output.json]", args[0]);
    };
    let output_path = args.get(2);

    let config = Config::from_env()?;
    let orchestrator = Orchestrator::from_config(&config, reqwest::Client::new())?;

    let raw = fs::read_to_string(input_path)
        .with_context(|| format!("Failed to read {}", input_path))?;
    let input: Input = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", input_path))?;

    let mut ctx = RunContext::new();
    let output = match input {
        Input::Entries(entries) => {
            info!("Translating {} entries", entries.len());
            let run = orchestrator.translate_entries(&entries, &mut ctx).await?;
            serde_json::to_string_pretty(&run)?
        }
        Input::Groups(groups) => {
            info!("Translating {} version groups", groups.len());
            let groups: Vec<(String, Vec<String>)> = groups
                .into_iter()
                .map(|(label, entries)| {
                    (label, entries.into_iter().map(|e| e.original).collect())
                })
                .collect();
            let outcomes = orchestrator.translate_groups(&groups, &mut ctx).await?;

            let output: Vec<GroupOutput> = groups
                .into_iter()
                .zip(outcomes)
                .map(|((label, originals), group)| GroupOutput {
                    label,
                    entries: originals
                        .into_iter()
                        .zip(group.outcome.translations)
                        .map(|(original, translated)| TranslatedEntry {
                            original,
                            translated,
                        })
                        .collect(),
                    provenance: group.outcome.provenance,
                })
                .collect();
            serde_json::to_string_pretty(&output)?
        }
    };

    match output_path {
        Some(path) => {
            fs::write(path, output).with_context(|| format!("Failed to write {}", path))?;
            info!("Wrote translations to {}", path);
        }
        None => println!("{}", output),
    }

    if ctx.exhausted_count() > 0 {
        info!("{} models ran out of quota during this run", ctx.exhausted_count());
    }
    Ok(())
}
