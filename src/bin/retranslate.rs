//! Re-translate blank or untranslated entries of an existing translation file.
//!
//! Usage:
//!   retranslate <translations.json> [--dry-run]
//!
//! The file holds an array of `{"original": "...", "translated": "..."}` and is
//! rewritten in place unless `--dry-run` is given. Batches are gated with
//! `RETRANSLATE_QUALITY_THRESHOLD` (default 0.10); the identity provider is
//! never used, so entries that cannot be improved keep their current value.

use anyhow::{Context, Result};
use changelog_translate::config::Config;
use changelog_translate::orchestrator::{Orchestrator, TranslatedEntry};
use changelog_translate::RunContext;
use std::fs;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("changelog_translate=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let dry_run = args.iter().any(|arg| arg == "--dry-run");
    let Some(path) = args.iter().skip(1).find(|arg| !arg.starts_with("--")) else {
        anyhow::bail!("Usage: {} <translations.json> [--dry-run]", args[0]);
    };

    let config = Config::from_env()?;
    let orchestrator = Orchestrator::from_config(&config, reqwest::Client::new())?;

    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let entries: Vec<TranslatedEntry> =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path))?;

    info!("Checking {} entries from {}", entries.len(), path);
    let outcome = orchestrator
        .retranslate(&entries, &mut RunContext::new())
        .await;

    println!(
        "Flagged {} entries, re-translated {}",
        outcome.flagged, outcome.retranslated
    );

    if dry_run {
        info!("Dry run, leaving {} untouched", path);
        return Ok(());
    }

    if outcome.retranslated > 0 {
        let json = serde_json::to_string_pretty(&outcome.entries)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path))?;
        info!("Updated {}", path);
    }
    Ok(())
}
