use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use thiserror::Error;

use super::layout::FeatureGroup;

/// Default group weights.
/// Strengths dominate matching; weaknesses and demographics are carried but
/// switched off until their contribution is validated.
pub const DEFAULT_WEIGHTS: SimilarityWeights = SimilarityWeights {
    preferred: 0.3,
    strength: 0.7,
    weakness: 0.0,
    demographic: 0.0,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightError {
    #[error("unknown similarity weight key {0:?}")]
    UnknownKey(String),
    #[error("weight for {group} must be a finite non-negative number, got {value}")]
    Invalid { group: FeatureGroup, value: f64 },
    #[error("rerank weight {term} must be a finite non-negative number, got {value}")]
    InvalidRerank { term: &'static str, value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityWeights {
    pub preferred: f64,
    pub strength: f64,
    pub weakness: f64,
    pub demographic: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        DEFAULT_WEIGHTS
    }
}

impl SimilarityWeights {
    pub fn new(
        preferred: f64,
        strength: f64,
        weakness: f64,
        demographic: f64,
    ) -> Result<Self, WeightError> {
        let weights = Self {
            preferred,
            strength,
            weakness,
            demographic,
        };
        weights.validate()?;
        Ok(weights)
    }

    /// Only `group` contributes, with weight 1.
    pub fn only(group: FeatureGroup) -> Self {
        let mut weights = Self {
            preferred: 0.0,
            strength: 0.0,
            weakness: 0.0,
            demographic: 0.0,
        };
        *weights.slot(group) = 1.0;
        weights
    }

    /// Builds weights from `preferred|strength|weakness|demographic` keys.
    /// Missing keys keep their default; unknown keys are rejected.
    pub fn from_map(map: &BTreeMap<String, f64>) -> Result<Self, WeightError> {
        let mut weights = DEFAULT_WEIGHTS;
        for (key, value) in map {
            let group = key
                .parse::<FeatureGroup>()
                .map_err(|_| WeightError::UnknownKey(key.clone()))?;
            *weights.slot(group) = *value;
        }
        weights.validate()?;
        Ok(weights)
    }

    pub fn with(mut self, group: FeatureGroup, value: f64) -> Result<Self, WeightError> {
        *self.slot(group) = value;
        self.validate()?;
        Ok(self)
    }

    pub fn get(&self, group: FeatureGroup) -> f64 {
        match group {
            FeatureGroup::Preferred => self.preferred,
            FeatureGroup::Strength => self.strength,
            FeatureGroup::Weakness => self.weakness,
            FeatureGroup::Demographic => self.demographic,
        }
    }

    pub fn sum(&self) -> f64 {
        self.preferred + self.strength + self.weakness + self.demographic
    }

    /// Groups with a non-zero weight, in fixed group order.
    pub fn active(&self) -> impl Iterator<Item = (FeatureGroup, f64)> + '_ {
        FeatureGroup::iter()
            .map(|group| (group, self.get(group)))
            .filter(|(_, weight)| *weight > 0.0)
    }

    pub fn validate(&self) -> Result<(), WeightError> {
        for group in FeatureGroup::iter() {
            let value = self.get(group);
            if !value.is_finite() || value < 0.0 {
                return Err(WeightError::Invalid { group, value });
            }
        }
        Ok(())
    }

    fn slot(&mut self, group: FeatureGroup) -> &mut f64 {
        match group {
            FeatureGroup::Preferred => &mut self.preferred,
            FeatureGroup::Strength => &mut self.strength,
            FeatureGroup::Weakness => &mut self.weakness,
            FeatureGroup::Demographic => &mut self.demographic,
        }
    }
}
