use serde::{Deserialize, Serialize};

use super::encoder::EncodedBatch;
use super::layout::FeatureGroup;
use super::ranking::{RankedLists, compare_ranked};
use super::weights::WeightError;

/// Second-stage scoring applied to each shortlist.
///
/// `score = similarity * combined + interest * interest_overlap + complement * coverage`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankWeights {
    pub similarity: f64,
    pub interest: f64,
    pub complement: f64,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            similarity: 1.0,
            interest: 0.0,
            complement: 0.0,
        }
    }
}

impl RerankWeights {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Every term must be finite and non-negative; a negative similarity
    /// term would turn shortlists into least-similar-first.
    pub fn validate(&self) -> Result<(), WeightError> {
        for (term, value) in [
            ("similarity", self.similarity),
            ("interest", self.interest),
            ("complement", self.complement),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(WeightError::InvalidRerank { term, value });
            }
        }
        Ok(())
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Fraction of `weak` subjects covered by `strong`; 0 when nothing is weak.
fn coverage(weak: &[f64], strong: &[f64]) -> f64 {
    let total: f64 = weak.iter().sum();
    if total == 0.0 {
        return 0.0;
    }
    dot(weak, strong) / total
}

/// Rescores every shortlist in place and restores canonical order.
///
/// Identity weights leave `lists` untouched. Candidates missing from `batch`
/// keep their similarity term only.
pub fn rerank(lists: &mut RankedLists, batch: &EncodedBatch, weights: &RerankWeights) {
    if weights.is_identity() {
        return;
    }

    let layout = batch.layout();
    for (requester, list) in lists.iter_mut() {
        let Some(own) = batch.get(*requester) else {
            continue;
        };
        let own_preferred = layout.slice(&own.values, FeatureGroup::Preferred);
        let own_weak = layout.slice(&own.values, FeatureGroup::Weakness);

        for candidate in list.iter_mut() {
            let mut score = weights.similarity * candidate.score;
            if let Some(other) = batch.get(candidate.profile_id) {
                let interest = dot(
                    own_preferred,
                    layout.slice(&other.values, FeatureGroup::Preferred),
                );
                let complement = coverage(
                    own_weak,
                    layout.slice(&other.values, FeatureGroup::Strength),
                );
                score += weights.interest * interest + weights.complement * complement;
            }
            candidate.score = score;
        }
        list.sort_by(compare_ranked);
    }
}
