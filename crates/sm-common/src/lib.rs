pub mod db;
pub mod logging;
pub mod matching;
pub mod run_id;
pub mod schema;
pub mod store;
pub mod vocabulary;

use serde::{Deserialize, Serialize};

/// Externally assigned profile identifier.
pub type ProfileId = i64;

// Raw profile record as supplied by the profile-management side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    #[serde(default)]
    pub name: Option<String>,
    pub age: u32,
    pub study_level: String,
    pub learning_style: String,
    pub study_preference: String,
    #[serde(default)]
    pub preferred_subjects: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub availability: Vec<String>,
}

pub use matching::{
    EngineConfig, RecommendationEngine, RefreshError, RefreshHandle, RefreshReport,
    encoder::{EncodeError, EncodedBatch, EncodedVector, FeatureEncoder},
    layout::{CategoricalEncoding, ColumnLayout, FeatureGroup},
    ranking::Recommendation,
    weights::SimilarityWeights,
};
pub use store::{
    MemoryProfileSource, MemoryStore, ProfileSource, RecommendationSet, RecommendationStore,
};
pub use vocabulary::Vocabulary;
