//! Batch-by-batch translation across the fallback chain.
//!
//! # Flow
//!
//! 1. Texts are split into batches ([`crate::batch`]).
//! 2. Each batch walks the attempt order (primary, then fallbacks). Every
//!    provider runs its model chain through the retry controller.
//! 3. A complete answer passes through the quality gate; a poor one is
//!    remembered and the next provider is tried.
//! 4. A partial answer is completed by one supplementary call for the missing
//!    entries only, then accepted.
//! 5. Results are reassembled in input order with per-batch provenance.
//!
//! Batches run strictly one after another with a pause in between, since
//! every backend is rate limited.

use crate::batch::{BatchLimits, TranslationRequest};
use crate::config::Config;
use crate::debug_log::{DebugLogger, EventKind};
use crate::error::{ProviderError, TranslateError};
use crate::fallback::{select_primary_engine, FallbackChain};
use crate::merge::{extract_missing, finalize, missing_indices, splice};
use crate::model_chain::{run_model_chain, ChainOutcome, RunContext};
use crate::providers::{ProviderCallResult, ProviderId, ProviderTable, TranslateOptions};
use crate::quality::{assess, check_pair, QualityVerdict};
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// One source string handed in by the changelog pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationEntry {
    pub original: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatedEntry {
    pub original: String,
    pub translated: String,
}

/// Where one batch's translations came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProvenance {
    pub offset: usize,
    pub len: usize,
    /// Provider that produced the batch; `mock` flags a degraded run
    pub engine: ProviderId,
    /// Provider label as reported by the adapter (e.g. "openrouter")
    pub provider: String,
    pub model: String,
    pub char_count: usize,
    /// Share of flagged entries, when the batch went through the gate
    pub quality_ratio: Option<f64>,
    /// Identity output, a gated candidate, or source-text defaults were used
    pub degraded: bool,
    /// Provider that filled the gaps of a partial answer
    pub supplemented_by: Option<ProviderId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationOutcome {
    /// Same length and order as the input
    pub translations: Vec<String>,
    pub provenance: Vec<BatchProvenance>,
}

impl TranslationOutcome {
    pub fn is_degraded(&self) -> bool {
        self.provenance.iter().any(|p| p.degraded)
    }
}

/// Output of [`Orchestrator::translate_entries`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedRun {
    pub entries: Vec<TranslatedEntry>,
    pub provenance: Vec<BatchProvenance>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupOutcome {
    pub label: String,
    pub outcome: TranslationOutcome,
}

/// Output of [`Orchestrator::retranslate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetranslateOutcome {
    pub entries: Vec<TranslatedEntry>,
    /// Entries whose translation was replaced
    pub retranslated: usize,
    /// Entries flagged by the sweep gate
    pub flagged: usize,
    pub provenance: Vec<BatchProvenance>,
}

/// Result of completing a partial answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialRecovery {
    pub translations: Vec<String>,
    pub supplemented_by: Option<ProviderId>,
    /// Positions that fell back to their source text
    pub defaulted: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Primary,
    Sweep,
}

impl Pass {
    fn as_str(&self) -> &'static str {
        match self {
            Pass::Primary => "translate",
            Pass::Sweep => "retranslate",
        }
    }
}

/// A complete answer that failed the gate, kept in case nothing better turns up.
struct GatedCandidate {
    engine: ProviderId,
    call: ProviderCallResult,
    ratio: f64,
}

struct BatchResult {
    translations: Vec<String>,
    provenance: BatchProvenance,
    /// Positions holding source text because nothing translated them
    defaulted: Vec<usize>,
}

impl BatchResult {
    fn from_call(
        offset: usize,
        engine: ProviderId,
        call: ProviderCallResult,
        quality_ratio: Option<f64>,
        degraded: bool,
    ) -> Self {
        let provenance = BatchProvenance {
            offset,
            len: call.translations.len(),
            engine,
            provider: call.meta.provider,
            model: call.meta.model,
            char_count: call.char_count,
            quality_ratio,
            degraded,
            supplemented_by: None,
        };
        Self {
            translations: call.translations,
            provenance,
            defaulted: Vec::new(),
        }
    }
}

pub struct Orchestrator {
    providers: ProviderTable,
    chain: FallbackChain,
    primary: ProviderId,
    logger: DebugLogger,
    options: TranslateOptions,
    retry: RetryConfig,
    limits: BatchLimits,
    batch_delay: Duration,
    quality_threshold: f64,
    retranslate_threshold: f64,
}

impl Orchestrator {
    pub fn new(
        providers: ProviderTable,
        chain: FallbackChain,
        primary: ProviderId,
        logger: DebugLogger,
    ) -> Self {
        let defaults = Config::default();
        Self {
            providers,
            chain,
            primary,
            logger,
            options: TranslateOptions::default(),
            retry: defaults.retry_config(),
            limits: defaults.batch_limits(),
            batch_delay: defaults.batch_delay(),
            quality_threshold: defaults.quality_threshold,
            retranslate_threshold: defaults.retranslate_quality_threshold,
        }
    }

    /// Build everything a run needs from configuration.
    ///
    /// Fails fast on an invalid engine, an unknown chain entry or an
    /// unwritable debug log directory.
    pub fn from_config(config: &Config, client: reqwest::Client) -> Result<Self, TranslateError> {
        let chain = FallbackChain::build(config)?;
        let primary = select_primary_engine(config, &chain)?;
        let logger = DebugLogger::from_config(config)?;
        let providers = ProviderTable::from_config(config, client);

        if !providers.contains(primary) {
            warn!(
                "Primary engine {} has no credentials; falling back along {:?}",
                primary,
                chain.providers()
            );
        }
        info!("Translation engine: {} (chain: {:?})", primary, chain.providers());

        Ok(Self::new(providers, chain, primary, logger)
            .with_options(TranslateOptions::from_config(config))
            .with_retry(config.retry_config())
            .with_limits(config.batch_limits())
            .with_batch_delay(config.batch_delay())
            .with_thresholds(config.quality_threshold, config.retranslate_quality_threshold))
    }

    pub fn with_options(mut self, options: TranslateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Gate thresholds for the primary path and the re-translation sweep
    pub fn with_thresholds(mut self, quality: f64, retranslate: f64) -> Self {
        self.quality_threshold = quality;
        self.retranslate_threshold = retranslate;
        self
    }

    pub fn primary(&self) -> ProviderId {
        self.primary
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    pub fn logger(&self) -> &DebugLogger {
        &self.logger
    }

    fn threshold(&self, pass: Pass) -> f64 {
        match pass {
            Pass::Primary => self.quality_threshold,
            Pass::Sweep => self.retranslate_threshold,
        }
    }

    /// Translate `texts`, returning one translation per input in order.
    ///
    /// `ctx` carries exhausted models between batches and should live exactly
    /// as long as one logical run.
    pub async fn translate(
        &self,
        texts: &[String],
        ctx: &mut RunContext,
    ) -> Result<TranslationOutcome, TranslateError> {
        let request = TranslationRequest::new(texts.to_vec(), self.limits);
        let batches = request.batches();
        let order = self.chain.attempt_order(self.primary);

        info!(
            "Translating {} entries in {} batches (primary: {})",
            request.len(),
            batches.len(),
            self.primary
        );
        self.logger.event(
            EventKind::RunStart,
            json!({
                "count": request.len(),
                "batches": batches.len(),
                "primary": self.primary,
                "chain": order,
                "target": self.options.target_code,
            }),
        );

        let mut translations = Vec::with_capacity(request.len());
        let mut provenance = Vec::with_capacity(batches.len());

        for (i, batch) in batches.iter().enumerate() {
            if i > 0 && !self.batch_delay.is_zero() {
                sleep(self.batch_delay).await;
            }
            debug!(
                "Batch {}/{}: {} entries at offset {}",
                i + 1,
                batches.len(),
                batch.len(),
                batch.offset
            );

            let result = self
                .translate_batch(batch.texts, batch.offset, &order, Pass::Primary, ctx)
                .await?;
            translations.extend(result.translations);
            provenance.push(result.provenance);
        }

        let degraded = provenance.iter().filter(|p| p.degraded).count();
        if degraded > 0 {
            warn!("{} of {} batches were degraded", degraded, provenance.len());
        }
        self.logger.event(
            EventKind::RunEnd,
            json!({
                "count": translations.len(),
                "batches": provenance.len(),
                "degraded_batches": degraded,
                "exhausted_models": ctx.exhausted_count(),
            }),
        );

        Ok(TranslationOutcome {
            translations,
            provenance,
        })
    }

    /// [`translate`](Self::translate) over pipeline entries
    pub async fn translate_entries(
        &self,
        entries: &[TranslationEntry],
        ctx: &mut RunContext,
    ) -> Result<TranslatedRun, TranslateError> {
        let texts: Vec<String> = entries.iter().map(|e| e.original.clone()).collect();
        let outcome = self.translate(&texts, ctx).await?;

        let entries = texts
            .into_iter()
            .zip(outcome.translations)
            .map(|(original, translated)| TranslatedEntry {
                original,
                translated,
            })
            .collect();

        Ok(TranslatedRun {
            entries,
            provenance: outcome.provenance,
        })
    }

    /// Translate several labelled groups (e.g. one per release) in one run.
    ///
    /// All groups share `ctx`, so a model exhausted while translating one
    /// group is not retried for the next.
    pub async fn translate_groups(
        &self,
        groups: &[(String, Vec<String>)],
        ctx: &mut RunContext,
    ) -> Result<Vec<GroupOutcome>, TranslateError> {
        let mut outcomes = Vec::with_capacity(groups.len());
        for (label, texts) in groups {
            info!("Translating group {} ({} entries)", label, texts.len());
            let outcome = self.translate(texts, ctx).await?;
            outcomes.push(GroupOutcome {
                label: label.clone(),
                outcome,
            });
        }
        Ok(outcomes)
    }

    /// Re-translate blank or echoed entries of an existing translation.
    ///
    /// Each batch is gated against the sweep threshold; only batches that fail
    /// it have their flagged entries sent again, and the identity provider is
    /// never used. A replacement is kept only if it passes the per-entry
    /// check, otherwise the previous value stays.
    pub async fn retranslate(
        &self,
        entries: &[TranslatedEntry],
        ctx: &mut RunContext,
    ) -> RetranslateOutcome {
        let sources: Vec<String> = entries.iter().map(|e| e.original.clone()).collect();
        let mut current: Vec<String> = entries.iter().map(|e| e.translated.clone()).collect();
        let threshold = self.threshold(Pass::Sweep);
        let order: Vec<ProviderId> = self
            .chain
            .attempt_order(self.primary)
            .into_iter()
            .filter(|id| *id != ProviderId::Mock)
            .collect();

        self.logger.event(
            EventKind::RunStart,
            json!({ "pass": Pass::Sweep.as_str(), "count": entries.len(), "chain": order }),
        );

        let mut retranslated = 0;
        let mut flagged_total = 0;
        let mut provenance = Vec::new();
        let mut sent_any = false;

        for batch in crate::batch::create_batches(&sources, self.limits) {
            let range = batch.offset..batch.offset + batch.len();
            let verdict = assess(batch.texts, &current[range.clone()], threshold);
            self.log_quality(None, batch.offset, threshold, &verdict, Pass::Sweep);

            if !verdict.is_poor_quality {
                continue;
            }

            let flagged = verdict.flagged_indices();
            flagged_total += flagged.len();
            let flagged_sources = extract_missing(batch.texts, &flagged);
            info!(
                "Re-translating {} of {} entries at offset {} (ratio {:.2})",
                flagged.len(),
                batch.len(),
                batch.offset,
                verdict.ratio
            );

            if sent_any && !self.batch_delay.is_zero() {
                sleep(self.batch_delay).await;
            }
            sent_any = true;

            match self
                .translate_batch(&flagged_sources, batch.offset, &order, Pass::Sweep, ctx)
                .await
            {
                Ok(result) => {
                    for (k, &local) in flagged.iter().enumerate() {
                        let index = batch.offset + local;
                        if result.defaulted.contains(&k) {
                            continue;
                        }
                        let Some(candidate) = result.translations.get(k) else {
                            continue;
                        };
                        if check_pair(&sources[index], Some(candidate.as_str())).is_none() {
                            current[index] = candidate.clone();
                            retranslated += 1;
                        }
                    }
                    provenance.push(result.provenance);
                }
                Err(e) => {
                    warn!(
                        "Re-translation failed for batch at offset {}, keeping previous values: {}",
                        batch.offset, e
                    );
                }
            }
        }

        self.logger.event(
            EventKind::RunEnd,
            json!({
                "pass": Pass::Sweep.as_str(),
                "flagged": flagged_total,
                "retranslated": retranslated,
            }),
        );

        RetranslateOutcome {
            entries: sources
                .into_iter()
                .zip(current)
                .map(|(original, translated)| TranslatedEntry {
                    original,
                    translated,
                })
                .collect(),
            retranslated,
            flagged: flagged_total,
            provenance,
        }
    }

    async fn translate_batch(
        &self,
        texts: &[String],
        offset: usize,
        order: &[ProviderId],
        pass: Pass,
        ctx: &mut RunContext,
    ) -> Result<BatchResult, TranslateError> {
        let threshold = self.threshold(pass);
        let correlation = offset.to_string();
        let mut best: Option<GatedCandidate> = None;
        let mut last_failure: Option<(ProviderId, String)> = None;

        for &id in order {
            let Some(provider) = self.providers.get(id) else {
                debug!("{} is not available, skipping", id);
                continue;
            };

            if id == ProviderId::Mock {
                if let Some(candidate) = best.take() {
                    warn!(
                        "Every provider failed the quality gate for offset {}; keeping {} output (ratio {:.2})",
                        offset, candidate.engine, candidate.ratio
                    );
                    return Ok(BatchResult::from_call(
                        offset,
                        candidate.engine,
                        candidate.call,
                        Some(candidate.ratio),
                        true,
                    ));
                }
            }

            if let Some((from, reason)) = last_failure.take() {
                self.log_fallback(from, id, &reason, offset, texts.len());
            }

            let models = provider.models();
            let outcome = run_model_chain(
                provider,
                &models,
                texts,
                &self.options,
                ctx,
                &self.retry,
                &self.logger,
                &correlation,
            )
            .await;

            match outcome {
                Ok(ChainOutcome::Completed(call)) if id == ProviderId::Mock => {
                    warn!("Batch at offset {} returned untranslated (identity provider)", offset);
                    return Ok(BatchResult::from_call(offset, id, call, None, true));
                }
                Ok(ChainOutcome::Completed(call)) => {
                    let verdict = assess(texts, &call.translations, threshold);
                    self.log_quality(
                        Some((id, call.meta.model.as_str())),
                        offset,
                        threshold,
                        &verdict,
                        pass,
                    );

                    if !verdict.is_poor_quality {
                        return Ok(BatchResult::from_call(
                            offset,
                            id,
                            call,
                            Some(verdict.ratio),
                            false,
                        ));
                    }

                    warn!(
                        "{} output for offset {} failed the quality gate ({} of {} flagged)",
                        id, offset, verdict.warning_count, verdict.total
                    );
                    if best.as_ref().map_or(true, |b| verdict.ratio < b.ratio) {
                        best = Some(GatedCandidate {
                            engine: id,
                            call,
                            ratio: verdict.ratio,
                        });
                    }
                    last_failure = Some((id, "poor_quality".to_string()));
                }
                Ok(ChainOutcome::Exhausted) => {
                    info!("{}: every model is exhausted for this run", id);
                    last_failure = Some((id, "exhausted".to_string()));
                }
                Err(ProviderError::Partial {
                    translations,
                    meta,
                    char_count,
                    ..
                }) => {
                    let recovery = self
                        .recover_partial(texts, translations, id, offset, ctx)
                        .await;
                    let ratio = assess(texts, &recovery.translations, threshold).ratio;

                    return Ok(BatchResult {
                        provenance: BatchProvenance {
                            offset,
                            len: recovery.translations.len(),
                            engine: id,
                            provider: meta.provider,
                            model: meta.model,
                            char_count,
                            quality_ratio: Some(ratio),
                            degraded: !recovery.defaulted.is_empty(),
                            supplemented_by: recovery.supplemented_by,
                        },
                        translations: recovery.translations,
                        defaulted: recovery.defaulted,
                    });
                }
                Err(e) => {
                    warn!("{} failed for offset {}: {}", id, offset, e);
                    last_failure = Some((id, e.kind().to_string()));
                }
            }
        }

        if let Some(candidate) = best {
            warn!(
                "No provider passed the quality gate for offset {}; keeping {} output",
                offset, candidate.engine
            );
            return Ok(BatchResult::from_call(
                offset,
                candidate.engine,
                candidate.call,
                Some(candidate.ratio),
                true,
            ));
        }

        self.logger.event(
            EventKind::RunError,
            json!({
                "pass": pass.as_str(),
                "offset": offset,
                "count": texts.len(),
                "last_failure": last_failure.map(|(id, reason)| format!("{}: {}", id, reason)),
            }),
        );
        Err(TranslateError::NoProviderAvailable {
            offset,
            len: texts.len(),
        })
    }

    /// Complete a partial answer with one supplementary call.
    ///
    /// Only the missing texts are sent, to the providers after `producer` in
    /// the chain, stopping at the first that answers (even partially). The
    /// identity provider is never asked, so whatever is still missing
    /// afterwards defaults to its source text and is reported in `defaulted`.
    pub async fn recover_partial(
        &self,
        sources: &[String],
        partial: Vec<Option<String>>,
        producer: ProviderId,
        offset: usize,
        ctx: &mut RunContext,
    ) -> PartialRecovery {
        let mut partial = partial;
        partial.resize(sources.len(), None);

        let indices = missing_indices(&partial);
        let missing = extract_missing(sources, &indices);
        let correlation = format!("{}:supplement", offset);
        let mut supplemented_by = None;

        info!(
            "{} answered {} of {} entries at offset {}; requesting the rest",
            producer,
            sources.len() - missing.len(),
            sources.len(),
            offset
        );

        if !missing.is_empty() {
            let candidates = self
                .chain
                .fallback_providers(producer)
                .iter()
                .filter(|id| **id != ProviderId::Mock);
            for &id in candidates {
                let Some(provider) = self.providers.get(id) else {
                    continue;
                };
                self.log_fallback(producer, id, "partial", offset, missing.len());

                let models = provider.models();
                let outcome = run_model_chain(
                    provider,
                    &models,
                    &missing,
                    &self.options,
                    ctx,
                    &self.retry,
                    &self.logger,
                    &correlation,
                )
                .await;

                match outcome {
                    Ok(ChainOutcome::Completed(call)) => {
                        splice(
                            &mut partial,
                            &indices,
                            call.translations.into_iter().map(Some).collect(),
                        );
                        supplemented_by = Some(id);
                        break;
                    }
                    Err(ProviderError::Partial { translations, .. }) => {
                        splice(&mut partial, &indices, translations);
                        supplemented_by = Some(id);
                        break;
                    }
                    Ok(ChainOutcome::Exhausted) => {
                        debug!("{}: exhausted while supplementing offset {}", id, offset);
                    }
                    Err(e) => {
                        warn!("{} could not supplement offset {}: {}", id, offset, e);
                    }
                }
            }
        }

        let defaulted = missing_indices(&partial);
        if !defaulted.is_empty() {
            warn!(
                "{} entries at offset {} keep their source text",
                defaulted.len(),
                offset
            );
        }

        PartialRecovery {
            translations: finalize(partial, sources),
            supplemented_by,
            defaulted,
        }
    }

    fn log_fallback(&self, from: ProviderId, to: ProviderId, reason: &str, offset: usize, count: usize) {
        info!("Falling back from {} to {} ({})", from, to, reason);
        self.logger.event(
            EventKind::Fallback,
            json!({
                "from": from,
                "to": to,
                "reason": reason,
                "offset": offset,
                "count": count,
            }),
        );
    }

    fn log_quality(
        &self,
        source: Option<(ProviderId, &str)>,
        offset: usize,
        threshold: f64,
        verdict: &QualityVerdict,
        pass: Pass,
    ) {
        self.logger.event(
            EventKind::QualityCheck,
            json!({
                "pass": pass.as_str(),
                "provider": source.map(|(id, _)| id),
                "model": source.map(|(_, model)| model),
                "offset": offset,
                "threshold": threshold,
                "ratio": verdict.ratio,
                "warning_count": verdict.warning_count,
                "total": verdict.total,
                "poor_quality": verdict.is_poor_quality,
            }),
        );
    }
}
