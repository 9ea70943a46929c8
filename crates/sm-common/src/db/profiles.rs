use tokio_postgres::Row;
use tracing::{debug, instrument};

use crate::db::util::TimedClientExt;
use crate::db::PgPool;
use crate::store::{ProfileSource, SourceError};
use crate::{Profile, ProfileId};

db_error!(ProfileFetchError {
    #[error("profile {profile_id} has invalid age {age}")]
    InvalidAge { profile_id: ProfileId, age: i64 },
});

fn map_profile(row: &Row) -> Result<Profile, ProfileFetchError> {
    let profile_id: i64 = row.get("id");
    let age: i32 = row.get("age");
    let age = u32::try_from(age).map_err(|_| ProfileFetchError::InvalidAge {
        profile_id,
        age: i64::from(age),
    })?;

    Ok(Profile {
        id: profile_id,
        name: row.get("name"),
        age,
        study_level: row.get("study_level"),
        learning_style: row.get("learning_style"),
        study_preference: row.get("study_preference"),
        preferred_subjects: row.get("preferred_subjects"),
        strengths: row.get("strengths"),
        weaknesses: row.get("weaknesses"),
        availability: row.get("availability"),
    })
}

/// Every stored profile, ordered by id.
#[instrument(skip(pool))]
pub async fn fetch_profiles(pool: &PgPool) -> Result<Vec<Profile>, ProfileFetchError> {
    let client = pool.get().await?;
    let rows = client
        .timed_query(
            "SELECT id, name, age, study_level, learning_style, study_preference,
                    preferred_subjects, strengths, weaknesses, availability
             FROM studymate.profiles
             ORDER BY id",
            &[],
            "fetch_profiles",
        )
        .await?;

    let profiles = rows.iter().map(map_profile).collect::<Result<Vec<_>, _>>()?;
    debug!(count = profiles.len(), "loaded profiles");
    Ok(profiles)
}

/// Inserts or overwrites profiles by id in one transaction.
#[instrument(skip(pool, profiles), fields(count = profiles.len()))]
pub async fn upsert_profiles(pool: &PgPool, profiles: &[Profile]) -> Result<u64, ProfileFetchError> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let mut written = 0;
    for profile in profiles {
        let age = i32::try_from(profile.age).map_err(|_| ProfileFetchError::InvalidAge {
            profile_id: profile.id,
            age: i64::from(profile.age),
        })?;
        written += tx
            .timed_execute_cached(
                "INSERT INTO studymate.profiles (
                    id, name, age, study_level, learning_style, study_preference,
                    preferred_subjects, strengths, weaknesses, availability
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    age = EXCLUDED.age,
                    study_level = EXCLUDED.study_level,
                    learning_style = EXCLUDED.learning_style,
                    study_preference = EXCLUDED.study_preference,
                    preferred_subjects = EXCLUDED.preferred_subjects,
                    strengths = EXCLUDED.strengths,
                    weaknesses = EXCLUDED.weaknesses,
                    availability = EXCLUDED.availability,
                    updated_at = NOW()",
                &[
                    &profile.id,
                    &profile.name,
                    &age,
                    &profile.study_level,
                    &profile.learning_style,
                    &profile.study_preference,
                    &profile.preferred_subjects,
                    &profile.strengths,
                    &profile.weaknesses,
                    &profile.availability,
                ],
                "upsert_profile",
            )
            .await?;
    }

    tx.commit().await?;
    Ok(written)
}

/// [`ProfileSource`] backed by `studymate.profiles`.
#[derive(Clone)]
pub struct PgProfileSource {
    pool: PgPool,
}

impl PgProfileSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ProfileSource for PgProfileSource {
    async fn load_profiles(&self) -> Result<Vec<Profile>, SourceError> {
        Ok(fetch_profiles(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use deadpool_postgres::PoolError;

    use super::*;

    #[test]
    fn errors_carry_pool_failures_and_invalid_ages() {
        let err = ProfileFetchError::from(PoolError::Closed);
        assert!(matches!(err, ProfileFetchError::Pool(PoolError::Closed)));

        let err = ProfileFetchError::InvalidAge {
            profile_id: 4,
            age: -3,
        };
        assert_eq!(err.to_string(), "profile 4 has invalid age -3");
        assert!(matches!(SourceError::from(err), SourceError::Postgres(_)));
    }
}
