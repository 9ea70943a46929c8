use tokio_postgres::types::Json;
use tracing::{info, instrument};

use crate::db::util::TimedClientExt;
use crate::db::PgPool;
use crate::matching::ranking::Recommendation;
use crate::store::{RecommendationSet, RecommendationStore, StoreError, StoredRecommendations};
use crate::ProfileId;

db_error!(RecommendationStorageError {
    #[error("{what} count {value} does not fit a postgres integer")]
    Oversized { what: &'static str, value: usize },
});

fn to_i32(what: &'static str, value: usize) -> Result<i32, RecommendationStorageError> {
    i32::try_from(value).map_err(|_| RecommendationStorageError::Oversized { what, value })
}

/// Column-oriented copy of the recommendation lists for `UNNEST` inserts.
#[derive(Debug, Default, PartialEq)]
struct StagedRecommendations {
    profile_ids: Vec<i64>,
    ranks: Vec<i32>,
    recommended_ids: Vec<i64>,
    scores: Vec<f64>,
}

impl StagedRecommendations {
    fn from_set(set: &RecommendationSet) -> Result<Self, RecommendationStorageError> {
        let mut staged = Self::default();
        for (profile_id, list) in &set.recommendations {
            for (position, rec) in list.iter().enumerate() {
                staged.profile_ids.push(*profile_id);
                staged.ranks.push(to_i32("rank", position + 1)?);
                staged.recommended_ids.push(rec.profile_id);
                staged.scores.push(rec.score);
            }
        }
        Ok(staged)
    }
}

/// Writes `set` under a new run and repoints `active_run` at it in one
/// transaction. Superseded runs are deleted in the same transaction.
#[instrument(skip(pool, set), fields(run_id = %set.run_id))]
pub async fn replace_recommendation_set(
    pool: &PgPool,
    set: &RecommendationSet,
) -> Result<(), RecommendationStorageError> {
    let staged = StagedRecommendations::from_set(set)?;
    let profile_count = to_i32("profile", set.profile_count())?;
    let recommendation_count = to_i32("recommendation", staged.scores.len())?;
    let feature_ids: Vec<i64> = set.vectors.iter().map(|v| v.profile_id).collect();
    let features: Vec<Json<&Vec<f64>>> = set.vectors.iter().map(|v| Json(&v.values)).collect();

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    tx.timed_execute(
        "INSERT INTO studymate.recommendation_runs (
            run_id, vocabulary_version, feature_columns,
            profile_count, recommendation_count, generated_at
         ) VALUES ($1, $2, $3, $4, $5, $6)",
        &[
            &set.run_id,
            &set.vocabulary_version,
            &set.feature_columns,
            &profile_count,
            &recommendation_count,
            &set.generated_at,
        ],
        "insert_recommendation_run",
    )
    .await?;

    tx.timed_execute(
        "INSERT INTO studymate.encoded_features (run_id, profile_id, features)
         SELECT $1, t.profile_id, t.features
         FROM UNNEST($2::bigint[], $3::jsonb[]) AS t(profile_id, features)",
        &[&set.run_id, &feature_ids, &features],
        "insert_encoded_features",
    )
    .await?;

    tx.timed_execute(
        "INSERT INTO studymate.recommendations (run_id, profile_id, rank, recommended_id, score)
         SELECT $1, t.profile_id, t.rank, t.recommended_id, t.score
         FROM UNNEST($2::bigint[], $3::int[], $4::bigint[], $5::float8[])
              AS t(profile_id, rank, recommended_id, score)",
        &[
            &set.run_id,
            &staged.profile_ids,
            &staged.ranks,
            &staged.recommended_ids,
            &staged.scores,
        ],
        "insert_recommendations",
    )
    .await?;

    tx.timed_execute(
        "INSERT INTO studymate.active_run (singleton, run_id, swapped_at)
         VALUES (TRUE, $1, NOW())
         ON CONFLICT (singleton) DO UPDATE
         SET run_id = EXCLUDED.run_id, swapped_at = EXCLUDED.swapped_at",
        &[&set.run_id],
        "swap_active_run",
    )
    .await?;

    let superseded = tx
        .timed_execute(
            "DELETE FROM studymate.recommendation_runs WHERE run_id <> $1",
            &[&set.run_id],
            "delete_superseded_runs",
        )
        .await?;

    tx.commit().await?;

    info!(
        profiles = profile_count,
        recommendations = recommendation_count,
        superseded,
        "recommendation set swapped"
    );
    Ok(())
}

/// Active list for one profile. `None` until the first swap.
#[instrument(skip(pool))]
pub async fn fetch_recommendations(
    pool: &PgPool,
    profile_id: ProfileId,
) -> Result<Option<StoredRecommendations>, RecommendationStorageError> {
    let client = pool.get().await?;
    let rows = client
        .timed_query(
            "SELECT r.run_id, r.vocabulary_version, rec.recommended_id, rec.score
             FROM studymate.active_run a
             JOIN studymate.recommendation_runs r ON r.run_id = a.run_id
             LEFT JOIN studymate.recommendations rec
                    ON rec.run_id = r.run_id AND rec.profile_id = $1
             ORDER BY rec.rank",
            &[&profile_id],
            "fetch_recommendations",
        )
        .await?;

    let Some(first) = rows.first() else {
        return Ok(None);
    };

    let recommendations = rows
        .iter()
        .filter_map(|row| {
            let recommended_id: Option<i64> = row.get("recommended_id");
            let score: Option<f64> = row.get("score");
            Some(Recommendation {
                profile_id: recommended_id?,
                score: score?,
            })
        })
        .collect();

    Ok(Some(StoredRecommendations {
        run_id: first.get("run_id"),
        vocabulary_version: first.get("vocabulary_version"),
        recommendations,
    }))
}

/// [`RecommendationStore`] backed by the `studymate` recommendation tables.
#[derive(Clone)]
pub struct PgRecommendationStore {
    pool: PgPool,
}

impl PgRecommendationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl RecommendationStore for PgRecommendationStore {
    async fn replace(&self, set: &RecommendationSet) -> Result<(), StoreError> {
        Ok(replace_recommendation_set(&self.pool, set).await?)
    }

    async fn recommendations_for(
        &self,
        profile_id: ProfileId,
    ) -> Result<Option<StoredRecommendations>, StoreError> {
        Ok(fetch_recommendations(&self.pool, profile_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_flattens_lists_with_one_based_ranks() {
        let mut set = RecommendationSet::empty("run", "v1");
        set.recommendations.insert(
            1,
            vec![
                Recommendation {
                    profile_id: 2,
                    score: 0.9,
                },
                Recommendation {
                    profile_id: 3,
                    score: 0.4,
                },
            ],
        );
        set.recommendations.insert(2, Vec::new());
        set.recommendations.insert(
            3,
            vec![Recommendation {
                profile_id: 1,
                score: 0.4,
            }],
        );

        let staged = StagedRecommendations::from_set(&set).unwrap();
        assert_eq!(staged.profile_ids, vec![1, 1, 3]);
        assert_eq!(staged.ranks, vec![1, 2, 1]);
        assert_eq!(staged.recommended_ids, vec![2, 3, 1]);
        assert_eq!(staged.scores, vec![0.9, 0.4, 0.4]);
    }

    #[test]
    fn empty_set_stages_nothing() {
        let staged = StagedRecommendations::from_set(&RecommendationSet::empty("run", "v1")).unwrap();
        assert_eq!(staged, StagedRecommendations::default());
    }
}
