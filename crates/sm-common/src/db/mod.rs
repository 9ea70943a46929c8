/// Declares a storage error enum with the pool and postgres variants every
/// db module needs, plus any module-specific variants.
macro_rules! db_error {
    ($name:ident { $($extra:tt)* }) => {
        #[derive(Debug, thiserror::Error)]
        pub enum $name {
            #[error("failed to get postgres connection: {0}")]
            Pool(#[from] deadpool_postgres::PoolError),
            #[error("postgres error: {0}")]
            Postgres(#[from] tokio_postgres::Error),
            $($extra)*
        }
    };
}
pub(crate) use db_error;

pub mod migrations;
pub mod pool;
pub mod profiles;
pub mod recommendations;
pub mod util;

pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPoolError, PgPool, create_pool_from_url, create_pool_with_size};
pub use profiles::{PgProfileSource, ProfileFetchError, fetch_profiles, upsert_profiles};
pub use recommendations::{
    PgRecommendationStore, RecommendationStorageError, fetch_recommendations,
    replace_recommendation_set,
};
