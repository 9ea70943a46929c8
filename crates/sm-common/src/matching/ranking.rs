use std::{cmp::Ordering, collections::BTreeMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::similarity::SimilarityMatrix;
use crate::ProfileId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub profile_id: ProfileId,
    pub score: f64,
}

/// Ordered shortlist per requesting profile.
pub type RankedLists = BTreeMap<ProfileId, Vec<Recommendation>>;

/// Most compatible first; exact ties go to the lower profile id.
pub fn compare_ranked(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.profile_id.cmp(&b.profile_id))
}

/// Top-`k` other profiles for every row of `matrix`.
///
/// The diagonal is never returned. Every profile gets an entry, empty when
/// `k == 0` or when it is the only profile.
pub fn rank(matrix: &SimilarityMatrix, k: usize) -> RankedLists {
    let ids = matrix.ids();

    (0..matrix.len())
        .into_par_iter()
        .map(|i| {
            if k == 0 {
                return (ids[i], Vec::new());
            }

            let mut candidates: Vec<Recommendation> = matrix
                .row_at(i)
                .iter()
                .zip(ids)
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, (score, id))| Recommendation {
                    profile_id: *id,
                    score: *score,
                })
                .collect();

            if candidates.len() > k {
                candidates.select_nth_unstable_by(k - 1, compare_ranked);
                candidates.truncate(k);
            }
            candidates.sort_by(compare_ranked);
            (ids[i], candidates)
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}
