use crate::config::{split_list, Config};
use crate::error::TranslateError;
use crate::providers::ProviderId;
use tracing::debug;

const ENGINE_NAMES: &str = "auto, gemini, glm, openai, google, mock";

/// Ordered list of providers to try; always ends with Mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChain {
    providers: Vec<ProviderId>,
}

impl FallbackChain {
    /// Build the chain from `TRANSLATION_FALLBACK_CHAIN`, or from credentialed
    /// providers in priority order when it is unset.
    pub fn build(config: &Config) -> Result<Self, TranslateError> {
        let chain = match &config.fallback_chain {
            Some(raw) => {
                let ids = split_list(raw)
                    .into_iter()
                    .map(|name| {
                        name.parse::<ProviderId>()
                            .map_err(|name| TranslateError::UnknownProvider {
                                name,
                                allowed: ProviderId::allowed_names(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::from_providers(ids)
            }
            None => Self::from_providers(
                ProviderId::PRIORITY
                    .into_iter()
                    .filter(|id| *id != ProviderId::Mock && config.has_credentials(*id)),
            ),
        };

        debug!("Fallback chain: {:?}", chain.providers);
        Ok(chain)
    }

    /// Deduplicate `ids` keeping first occurrence, then move Mock to the end.
    pub fn from_providers(ids: impl IntoIterator<Item = ProviderId>) -> Self {
        let mut providers: Vec<ProviderId> = Vec::new();
        for id in ids {
            if id != ProviderId::Mock && !providers.contains(&id) {
                providers.push(id);
            }
        }
        providers.push(ProviderId::Mock);
        Self { providers }
    }

    pub fn providers(&self) -> &[ProviderId] {
        &self.providers
    }

    /// Providers strictly after `primary`; the whole chain if `primary` is absent.
    pub fn fallback_providers(&self, primary: ProviderId) -> &[ProviderId] {
        match self.providers.iter().position(|id| *id == primary) {
            Some(i) => &self.providers[i + 1..],
            None => &self.providers,
        }
    }

    /// `primary` followed by its fallbacks
    pub fn attempt_order(&self, primary: ProviderId) -> Vec<ProviderId> {
        std::iter::once(primary)
            .chain(self.fallback_providers(primary).iter().copied())
            .collect()
    }
}

/// Resolve the primary engine.
///
/// An explicit `TRANSLATION_ENGINE` wins; `auto` or unset picks the first
/// credentialed provider of the chain, or Mock when there is none.
pub fn select_primary_engine(
    config: &Config,
    chain: &FallbackChain,
) -> Result<ProviderId, TranslateError> {
    let requested = config
        .translation_engine
        .as_deref()
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty() && v != "auto");

    match requested {
        Some(value) => value
            .parse::<ProviderId>()
            .map_err(|_| TranslateError::InvalidEngine {
                value: config.translation_engine.clone().unwrap_or(value),
                allowed: ENGINE_NAMES.to_string(),
            }),
        None => Ok(chain
            .providers()
            .iter()
            .copied()
            .find(|id| *id != ProviderId::Mock && config.has_credentials(*id))
            .unwrap_or(ProviderId::Mock)),
    }
}
