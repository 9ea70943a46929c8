use std::collections::HashMap;

use rayon::prelude::*;
use tracing::{debug, warn};

use super::encoder::EncodedBatch;
use super::layout::FeatureGroup;
use super::weights::SimilarityWeights;
use crate::ProfileId;

/// Cosine similarity in `[-1, 1]`; 0 when either side is an all-zero vector.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        warn!(
            a_len = a.len(),
            b_len = b.len(),
            "vector dimension mismatch; returning zero similarity"
        );
        return 0.0;
    }

    cosine_with_norms(a, b, squared_norm(a), squared_norm(b))
}

fn squared_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

// sqrt(|a|²·|b|²) keeps cos(v, v) exactly 1 and is symmetric in its arguments.
fn cosine_with_norms(a: &[f64], b: &[f64], norm_a_sq: f64, norm_b_sq: f64) -> f64 {
    if norm_a_sq == 0.0 || norm_b_sq == 0.0 {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot / (norm_a_sq * norm_b_sq).sqrt()
}

/// Square similarity matrix keyed by profile id.
///
/// Row/column `i` belongs to `ids()[i]`; the dense index is an internal
/// detail and callers should look scores up by id.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    ids: Vec<ProfileId>,
    index: HashMap<ProfileId, usize>,
    values: Vec<f64>,
}

impl SimilarityMatrix {
    fn from_rows(ids: Vec<ProfileId>, rows: Vec<Vec<f64>>) -> Self {
        let index = ids.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();
        Self {
            ids,
            index,
            values: rows.into_iter().flatten().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[ProfileId] {
        &self.ids
    }

    pub fn score(&self, a: ProfileId, b: ProfileId) -> Option<f64> {
        let i = *self.index.get(&a)?;
        let j = *self.index.get(&b)?;
        Some(self.values[i * self.len() + j])
    }

    /// `(other_id, score)` pairs for one profile, diagonal included.
    pub fn row(&self, id: ProfileId) -> Option<impl Iterator<Item = (ProfileId, f64)> + '_> {
        let i = *self.index.get(&id)?;
        Some(self.ids.iter().copied().zip(self.row_at(i).iter().copied()))
    }

    pub(crate) fn row_at(&self, i: usize) -> &[f64] {
        let n = self.len();
        &self.values[i * n..(i + 1) * n]
    }

    pub fn is_symmetric(&self) -> bool {
        let n = self.len();
        (0..n).all(|i| (i + 1..n).all(|j| self.values[i * n + j] == self.values[j * n + i]))
    }
}

struct GroupColumns<'a> {
    weight: f64,
    slices: Vec<&'a [f64]>,
    norms_sq: Vec<f64>,
}

impl<'a> GroupColumns<'a> {
    fn new(batch: &'a EncodedBatch, group: FeatureGroup, weight: f64) -> Self {
        let layout = batch.layout();
        let slices: Vec<&[f64]> = batch
            .vectors()
            .iter()
            .map(|v| layout.slice(&v.values, group))
            .collect();
        let norms_sq = slices.iter().map(|s| squared_norm(s)).collect();
        Self {
            weight,
            slices,
            norms_sq,
        }
    }

    fn weighted(&self, i: usize, j: usize) -> f64 {
        self.weight
            * cosine_with_norms(
                self.slices[i],
                self.slices[j],
                self.norms_sq[i],
                self.norms_sq[j],
            )
    }
}

fn weighted_matrix(batch: &EncodedBatch, groups: &[GroupColumns<'_>]) -> SimilarityMatrix {
    let n = batch.len();
    let rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .map(|j| groups.iter().map(|g| g.weighted(i, j)).sum::<f64>())
                .collect()
        })
        .collect();

    SimilarityMatrix::from_rows(batch.ids().collect(), rows)
}

/// Plain cosine similarity restricted to one group's columns.
pub fn group_similarity(batch: &EncodedBatch, group: FeatureGroup) -> SimilarityMatrix {
    weighted_matrix(batch, &[GroupColumns::new(batch, group, 1.0)])
}

/// `Σ weight[g] · cos_g(i, j)` over the groups with a non-zero weight.
pub fn combined_similarity(batch: &EncodedBatch, weights: &SimilarityWeights) -> SimilarityMatrix {
    let groups: Vec<_> = weights
        .active()
        .map(|(group, weight)| GroupColumns::new(batch, group, weight))
        .collect();

    debug!(
        profiles = batch.len(),
        active_groups = groups.len(),
        "computing combined similarity"
    );

    weighted_matrix(batch, &groups)
}
