//! Seams between the matching pipeline and wherever profiles come from and
//! recommendations are kept.

mod memory;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{ProfileFetchError, RecommendationStorageError};
use crate::matching::encoder::EncodedVector;
use crate::matching::ranking::{RankedLists, Recommendation};
use crate::{Profile, ProfileId};

pub use memory::{MemoryProfileSource, MemoryStore};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Postgres(#[from] ProfileFetchError),
    #[error("profile source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Postgres(#[from] RecommendationStorageError),
    #[error("recommendation store unavailable: {0}")]
    Unavailable(String),
}

/// Everything one refresh produced, written as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub run_id: String,
    pub vocabulary_version: String,
    pub generated_at: DateTime<Utc>,
    pub feature_columns: Vec<String>,
    pub vectors: Vec<EncodedVector>,
    pub recommendations: RankedLists,
}

impl RecommendationSet {
    pub fn empty(run_id: impl Into<String>, vocabulary_version: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            vocabulary_version: vocabulary_version.into(),
            generated_at: Utc::now(),
            feature_columns: Vec::new(),
            vectors: Vec::new(),
            recommendations: RankedLists::new(),
        }
    }

    /// Ordered list for `profile_id`; empty for unknown ids.
    pub fn get(&self, profile_id: ProfileId) -> &[Recommendation] {
        self.recommendations
            .get(&profile_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn profile_count(&self) -> usize {
        self.recommendations.len()
    }

    pub fn recommendation_count(&self) -> usize {
        self.recommendations.values().map(Vec::len).sum()
    }
}

/// The active list for one profile, tagged with the run that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecommendations {
    pub run_id: String,
    pub vocabulary_version: String,
    pub recommendations: Vec<Recommendation>,
}

pub trait ProfileSource: Send + Sync + 'static {
    /// Full snapshot of the current profiles.
    fn load_profiles(&self) -> impl Future<Output = Result<Vec<Profile>, SourceError>> + Send;
}

pub trait RecommendationStore: Send + Sync + 'static {
    /// Makes `set` the active set. Readers see either the previous set or
    /// all of `set`, never a mix; on error the previous set stays active.
    fn replace(&self, set: &RecommendationSet) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// `None` when no set has been stored yet.
    fn recommendations_for(
        &self,
        profile_id: ProfileId,
    ) -> impl Future<Output = Result<Option<StoredRecommendations>, StoreError>> + Send;
}

impl<P: ProfileSource> ProfileSource for Arc<P> {
    fn load_profiles(&self) -> impl Future<Output = Result<Vec<Profile>, SourceError>> + Send {
        (**self).load_profiles()
    }
}

impl<T: RecommendationStore> RecommendationStore for Arc<T> {
    fn replace(&self, set: &RecommendationSet) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).replace(set)
    }

    fn recommendations_for(
        &self,
        profile_id: ProfileId,
    ) -> impl Future<Output = Result<Option<StoredRecommendations>, StoreError>> + Send {
        (**self).recommendations_for(profile_id)
    }
}
