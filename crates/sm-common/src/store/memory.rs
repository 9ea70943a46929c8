use std::sync::{Arc, RwLock};

use tracing::debug;

use super::{
    ProfileSource, RecommendationSet, RecommendationStore, SourceError, StoreError,
    StoredRecommendations,
};
use crate::{Profile, ProfileId};

/// Keeps the active set behind an `Arc`; a swap is a single pointer store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    active: RwLock<Option<Arc<RecommendationSet>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Result<Option<Arc<RecommendationSet>>, StoreError> {
        let guard = self
            .active
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        Ok(guard.clone())
    }
}

impl RecommendationStore for MemoryStore {
    async fn replace(&self, set: &RecommendationSet) -> Result<(), StoreError> {
        let staged = Arc::new(set.clone());
        let mut guard = self
            .active
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        *guard = Some(staged);
        debug!(run_id = %set.run_id, profiles = set.profile_count(), "memory store swapped");
        Ok(())
    }

    async fn recommendations_for(
        &self,
        profile_id: ProfileId,
    ) -> Result<Option<StoredRecommendations>, StoreError> {
        Ok(self.snapshot()?.map(|set| StoredRecommendations {
            run_id: set.run_id.clone(),
            vocabulary_version: set.vocabulary_version.clone(),
            recommendations: set.get(profile_id).to_vec(),
        }))
    }
}

/// Mutable in-process profile collection.
#[derive(Debug, Default)]
pub struct MemoryProfileSource {
    profiles: RwLock<Vec<Profile>>,
}

impl MemoryProfileSource {
    pub fn new(profiles: Vec<Profile>) -> Self {
        Self {
            profiles: RwLock::new(profiles),
        }
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Profile>>, SourceError> {
        self.profiles
            .write()
            .map_err(|_| SourceError::Unavailable("profile source lock poisoned".into()))
    }

    /// Inserts or replaces the profile with the same id.
    pub fn upsert(&self, profile: Profile) -> Result<(), SourceError> {
        let mut profiles = self.write()?;
        match profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => *existing = profile,
            None => profiles.push(profile),
        }
        Ok(())
    }

    pub fn remove(&self, profile_id: ProfileId) -> Result<bool, SourceError> {
        let mut profiles = self.write()?;
        let before = profiles.len();
        profiles.retain(|p| p.id != profile_id);
        Ok(profiles.len() != before)
    }

    pub fn replace_all(&self, profiles: Vec<Profile>) -> Result<(), SourceError> {
        *self.write()? = profiles;
        Ok(())
    }
}

impl ProfileSource for MemoryProfileSource {
    async fn load_profiles(&self) -> Result<Vec<Profile>, SourceError> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| SourceError::Unavailable("profile source lock poisoned".into()))?;
        Ok(profiles.clone())
    }
}
