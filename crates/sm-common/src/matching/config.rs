use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::layout::{CategoricalEncoding, FeatureGroup};
use super::rerank::RerankWeights;
use super::weights::{SimilarityWeights, WeightError};

pub const DEFAULT_TOP_K: usize = 5;

/// How often a failed swap is retried before the refresh gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// At least one attempt is always made.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub top_k: usize,
    pub weights: SimilarityWeights,
    pub rerank: RerankWeights,
    pub categorical_encoding: CategoricalEncoding,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            weights: SimilarityWeights::default(),
            rerank: RerankWeights::default(),
            categorical_encoding: CategoricalEncoding::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Reads `SM_*` environment variables; unset or unparsable values keep
    /// their defaults, invalid weights are an error.
    pub fn from_env() -> Result<Self, WeightError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, WeightError> {
        let parse_f64 = |key: &str| -> Option<f64> {
            let raw = lookup(key)?;
            match raw.trim().parse::<f64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(key, value = %raw, "ignoring unparsable number");
                    None
                }
            }
        };

        let defaults = Self::default();

        let top_k = lookup("SM_TOP_K")
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(|k| usize::try_from(k).unwrap_or(0))
            .unwrap_or(defaults.top_k);

        let mut weights = defaults.weights;
        for (key, group) in [
            ("SM_WEIGHT_PREFERRED", FeatureGroup::Preferred),
            ("SM_WEIGHT_STRENGTH", FeatureGroup::Strength),
            ("SM_WEIGHT_WEAKNESS", FeatureGroup::Weakness),
            ("SM_WEIGHT_DEMOGRAPHIC", FeatureGroup::Demographic),
        ] {
            if let Some(value) = parse_f64(key) {
                weights = weights.with(group, value)?;
            }
        }

        let rerank = RerankWeights {
            similarity: parse_f64("SM_RERANK_SIMILARITY").unwrap_or(defaults.rerank.similarity),
            interest: parse_f64("SM_RERANK_INTEREST").unwrap_or(defaults.rerank.interest),
            complement: parse_f64("SM_RERANK_COMPLEMENT").unwrap_or(defaults.rerank.complement),
        };
        rerank.validate()?;

        let categorical_encoding = match lookup("SM_CATEGORICAL_ENCODING") {
            Some(raw) => raw.trim().to_ascii_lowercase().parse().unwrap_or_else(|_| {
                warn!(value = %raw, "unknown categorical encoding; using full one-hot");
                CategoricalEncoding::Full
            }),
            None => defaults.categorical_encoding,
        };

        let retry = RetryPolicy {
            max_attempts: lookup("SM_REFRESH_MAX_ATTEMPTS")
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(defaults.retry.max_attempts),
            backoff: lookup("SM_REFRESH_BACKOFF_MS")
                .and_then(|raw| raw.trim().parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.backoff),
        };

        Ok(Self {
            top_k,
            weights,
            rerank,
            categorical_encoding,
            retry,
        })
    }
}
