//! Postgres DDL for the `studymate` schema. Applied in order by
//! [`crate::db::migrations::run_migrations`].

pub const SCHEMA_DDL: &str = r#"
CREATE SCHEMA IF NOT EXISTS studymate;

CREATE TABLE IF NOT EXISTS studymate.schema_migrations (
    id INTEGER PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

/// Profiles as maintained by the profile-management side. Category values
/// are free text here; the matcher validates them against its vocabulary.
pub const PROFILES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS studymate.profiles (
    id BIGINT PRIMARY KEY,
    name TEXT,
    age INTEGER NOT NULL,
    study_level TEXT NOT NULL,
    learning_style TEXT NOT NULL,
    study_preference TEXT NOT NULL,
    preferred_subjects TEXT[] NOT NULL DEFAULT '{}',
    strengths TEXT[] NOT NULL DEFAULT '{}',
    weaknesses TEXT[] NOT NULL DEFAULT '{}',
    availability TEXT[] NOT NULL DEFAULT '{}',
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_profiles_age CHECK (age >= 0)
);
"#;

/// One row per refresh. Child rows cascade when a run is superseded.
pub const RECOMMENDATION_RUNS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS studymate.recommendation_runs (
    run_id TEXT PRIMARY KEY,
    vocabulary_version TEXT NOT NULL,
    feature_columns TEXT[] NOT NULL,
    profile_count INTEGER NOT NULL,
    recommendation_count INTEGER NOT NULL,
    generated_at TIMESTAMPTZ NOT NULL
);
"#;

pub const ENCODED_FEATURES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS studymate.encoded_features (
    run_id TEXT NOT NULL REFERENCES studymate.recommendation_runs(run_id) ON DELETE CASCADE,
    profile_id BIGINT NOT NULL,
    features JSONB NOT NULL,
    PRIMARY KEY (run_id, profile_id)
);
"#;

pub const RECOMMENDATIONS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS studymate.recommendations (
    run_id TEXT NOT NULL REFERENCES studymate.recommendation_runs(run_id) ON DELETE CASCADE,
    profile_id BIGINT NOT NULL,
    rank INTEGER NOT NULL,
    recommended_id BIGINT NOT NULL,
    score DOUBLE PRECISION NOT NULL,
    PRIMARY KEY (run_id, profile_id, rank),

    CONSTRAINT chk_recommendations_not_self CHECK (profile_id <> recommended_id),
    CONSTRAINT chk_recommendations_rank CHECK (rank >= 1)
);
"#;

/// Single-row pointer to the run readers should see.
pub const ACTIVE_RUN_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS studymate.active_run (
    singleton BOOLEAN PRIMARY KEY DEFAULT TRUE,
    run_id TEXT NOT NULL REFERENCES studymate.recommendation_runs(run_id),
    swapped_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CONSTRAINT chk_active_run_singleton CHECK (singleton)
);
"#;

pub const PROFILES_UPDATED_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_profiles_updated_at ON studymate.profiles(updated_at);
"#;
