use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use strum::AsRefStr;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, instrument, warn};

use super::config::EngineConfig;
use super::encoder::{EncodeError, FeatureEncoder};
use super::ranking::{Recommendation, rank};
use super::rerank::rerank;
use super::similarity::combined_similarity;
use crate::run_id;
use crate::store::{
    ProfileSource, RecommendationSet, RecommendationStore, SourceError, StoreError,
};
use crate::vocabulary::Vocabulary;
use crate::{Profile, ProfileId};

/// Coarse failure classes, used as metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    UnknownCategory,
    DuplicateProfile,
    ProfileSource,
    PersistenceFailure,
    Cancelled,
    Internal,
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("failed to load profiles: {0}")]
    Source(#[from] SourceError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("failed to persist recommendations after {attempts} attempt(s): {source}")]
    Persistence {
        attempts: u32,
        #[source]
        source: StoreError,
    },
    #[error("refresh cancelled before the swap committed")]
    Cancelled,
    #[error("refresh task aborted: {0}")]
    Aborted(String),
}

impl RefreshError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RefreshError::Source(_) => ErrorKind::ProfileSource,
            RefreshError::Encode(EncodeError::UnknownCategory { .. }) => ErrorKind::UnknownCategory,
            RefreshError::Encode(EncodeError::DuplicateProfile(_)) => ErrorKind::DuplicateProfile,
            RefreshError::Persistence { .. } => ErrorKind::PersistenceFailure,
            RefreshError::Cancelled => ErrorKind::Cancelled,
            RefreshError::Aborted(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    pub run_id: String,
    pub vocabulary_version: String,
    pub profile_count: usize,
    pub recommendation_count: usize,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Encode, score, rank and rerank one snapshot. Pure apart from the
/// `generated_at` timestamp.
pub fn compute_recommendations(
    profiles: &[Profile],
    vocabulary: &Vocabulary,
    config: &EngineConfig,
    run_id: String,
) -> Result<RecommendationSet, EncodeError> {
    let batch = FeatureEncoder::new(vocabulary, config.categorical_encoding).encode(profiles)?;
    let matrix = combined_similarity(&batch, &config.weights);
    let mut recommendations = rank(&matrix, config.top_k);
    rerank(&mut recommendations, &batch, &config.rerank);

    Ok(RecommendationSet {
        run_id,
        vocabulary_version: vocabulary.version().to_string(),
        generated_at: Utc::now(),
        feature_columns: batch.layout().columns().to_vec(),
        vectors: batch.into_vectors(),
        recommendations,
    })
}

/// Owns the vocabulary and configuration, and serializes refreshes so the
/// stored set always comes from a single profile snapshot.
pub struct RecommendationEngine<S, T> {
    source: S,
    store: T,
    vocabulary: Arc<Vocabulary>,
    config: EngineConfig,
    refresh_lock: Mutex<()>,
}

impl<S: ProfileSource, T: RecommendationStore> RecommendationEngine<S, T> {
    pub fn new(source: S, store: T, vocabulary: Vocabulary, config: EngineConfig) -> Self {
        info!(
            vocabulary = vocabulary.version(),
            top_k = config.top_k,
            "recommendation engine configured"
        );
        Self {
            source,
            store,
            vocabulary: Arc::new(vocabulary),
            config,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs the compute stages on the caller's thread without persisting.
    pub fn compute(&self, profiles: &[Profile]) -> Result<RecommendationSet, EncodeError> {
        compute_recommendations(profiles, &self.vocabulary, &self.config, run_id::generate())
    }

    /// Full recompute from the profile source, then swap.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<RefreshReport, RefreshError> {
        let _guard = self.refresh_lock.lock().await;
        let started = Instant::now();
        let profiles = self.source.load_profiles().await?;
        self.run_locked(profiles, started).await
    }

    /// Same as [`refresh`](Self::refresh) for a caller-supplied snapshot.
    #[instrument(skip(self, profiles), fields(profiles = profiles.len()))]
    pub async fn refresh_with(&self, profiles: Vec<Profile>) -> Result<RefreshReport, RefreshError> {
        let _guard = self.refresh_lock.lock().await;
        self.run_locked(profiles, Instant::now()).await
    }

    async fn run_locked(
        &self,
        profiles: Vec<Profile>,
        started: Instant,
    ) -> Result<RefreshReport, RefreshError> {
        let run_id = run_id::generate();
        let profile_count = profiles.len();
        debug!(%run_id, profile_count, "computing recommendations");

        let vocabulary = Arc::clone(&self.vocabulary);
        let config = self.config.clone();
        let task_run_id = run_id.clone();
        let set = tokio::task::spawn_blocking(move || {
            compute_recommendations(&profiles, &vocabulary, &config, task_run_id)
        })
        .await
        .map_err(|err| RefreshError::Aborted(err.to_string()))?
        .inspect_err(|err| warn!(%run_id, error = %err, "refresh rejected the profile batch"))?;

        let attempts = self.persist(&set).await?;

        let report = RefreshReport {
            run_id,
            vocabulary_version: set.vocabulary_version.clone(),
            profile_count,
            recommendation_count: set.recommendation_count(),
            attempts,
            elapsed: started.elapsed(),
        };
        info!(
            run_id = %report.run_id,
            profiles = report.profile_count,
            recommendations = report.recommendation_count,
            attempts = report.attempts,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "recommendation refresh completed"
        );
        Ok(report)
    }

    async fn persist(&self, set: &RecommendationSet) -> Result<u32, RefreshError> {
        let max_attempts = self.config.retry.attempts();
        let mut attempt = 1;
        loop {
            match self.store.replace(set).await {
                Ok(()) => return Ok(attempt),
                Err(err) if attempt < max_attempts => {
                    warn!(
                        run_id = %set.run_id,
                        attempt,
                        max_attempts,
                        error = %err,
                        "recommendation swap failed; retrying"
                    );
                    tokio::time::sleep(self.config.retry.backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        run_id = %set.run_id,
                        attempts = attempt,
                        error = %err,
                        "recommendation swap failed; keeping previous set"
                    );
                    return Err(RefreshError::Persistence {
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }

    /// Active recommendations for `profile_id`, best first.
    ///
    /// Empty when nothing has been computed, the id is unknown, or the
    /// stored set was built under another vocabulary version.
    pub async fn get_recommendations(
        &self,
        profile_id: ProfileId,
    ) -> Result<Vec<Recommendation>, StoreError> {
        match self.store.recommendations_for(profile_id).await? {
            Some(stored) if stored.vocabulary_version == self.vocabulary.version() => {
                Ok(stored.recommendations)
            }
            Some(stored) => {
                debug!(
                    profile_id,
                    stored = %stored.vocabulary_version,
                    current = self.vocabulary.version(),
                    "ignoring recommendations from another vocabulary"
                );
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    /// Starts a refresh on the runtime and returns immediately.
    pub fn spawn_refresh(self: &Arc<Self>) -> RefreshHandle {
        let engine = Arc::clone(self);
        RefreshHandle {
            task: tokio::spawn(async move { engine.refresh().await }),
        }
    }
}

/// Handle to a background refresh.
#[derive(Debug)]
pub struct RefreshHandle {
    task: JoinHandle<Result<RefreshReport, RefreshError>>,
}

impl RefreshHandle {
    /// Drops the refresh at its next await point. A swap that already
    /// committed stays committed.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Cancels the refresh without holding on to the handle.
    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<RefreshReport, RefreshError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(RefreshError::Cancelled),
            Err(err) => Err(RefreshError::Aborted(err.to_string())),
        }
    }
}
