//! Profile encoding, similarity scoring and ranking.

pub mod config;
pub mod encoder;
pub mod layout;
pub mod pipeline;
pub mod ranking;
pub mod rerank;
pub mod similarity;
pub mod weights;

pub use config::{EngineConfig, RetryPolicy};
pub use pipeline::{
    ErrorKind, RecommendationEngine, RefreshError, RefreshHandle, RefreshReport,
    compute_recommendations,
};
pub use ranking::{RankedLists, Recommendation, rank};
pub use rerank::{RerankWeights, rerank};
pub use similarity::{SimilarityMatrix, combined_similarity, cosine_similarity, group_similarity};
