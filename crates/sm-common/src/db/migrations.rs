use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{debug, info, instrument};

use crate::db::PgPool;
use crate::schema;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
}

struct Migration {
    id: i32,
    description: &'static str,
    statements: &'static [&'static str],
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "profiles table",
        statements: &[schema::PROFILES_DDL],
    },
    Migration {
        id: 2,
        description: "recommendation runs with staged features and active-run pointer",
        statements: &[
            schema::RECOMMENDATION_RUNS_DDL,
            schema::ENCODED_FEATURES_DDL,
            schema::RECOMMENDATIONS_DDL,
            schema::ACTIVE_RUN_DDL,
        ],
    },
    Migration {
        id: 3,
        description: "profiles updated_at index",
        statements: &[schema::PROFILES_UPDATED_INDEX_DDL],
    },
];

/// Highest migration id this build knows about.
pub fn latest_version() -> i32 {
    MIGRATIONS.iter().map(|m| m.id).max().unwrap_or(0)
}

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client.batch_execute(schema::SCHEMA_DDL).await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM studymate.schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            debug!(id = migration.id, "migration already applied");
            continue;
        }

        let tx = client.transaction().await?;
        for statement in migration.statements {
            tx.batch_execute(statement).await?;
        }
        tx.execute(
            "INSERT INTO studymate.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}
