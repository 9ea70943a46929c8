use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use sm_common::matching::{ErrorKind, RetryPolicy};
use sm_common::store::{StoreError, StoredRecommendations};
use sm_common::vocabulary::VocabularySpec;
use sm_common::{
    EngineConfig, MemoryProfileSource, MemoryStore, Profile, ProfileId, ProfileSource,
    RecommendationEngine, RecommendationSet, RecommendationStore, RefreshError, Vocabulary,
};
use tokio::sync::Notify;

fn vocabulary(label: &str) -> Vocabulary {
    Vocabulary::new(VocabularySpec {
        label: label.into(),
        subjects: vec!["Math".into(), "Physics".into(), "History".into()],
        study_levels: vec!["Beginner".into(), "Advanced".into()],
        learning_styles: vec!["Visual".into(), "Auditory".into()],
        study_preferences: vec!["Solo".into(), "Group".into()],
        availability: vec!["Morning".into(), "Evening".into()],
    })
    .unwrap()
}

fn profile(id: ProfileId, strengths: &[&str]) -> Profile {
    Profile {
        id,
        name: Some(format!("student-{id}")),
        age: 18 + id as u32,
        study_level: "Beginner".into(),
        learning_style: "Visual".into(),
        study_preference: "Group".into(),
        preferred_subjects: vec!["Math".into()],
        strengths: strengths.iter().map(|s| s.to_string()).collect(),
        availability: vec!["Evening".into()],
        ..Profile::default()
    }
}

fn population() -> Vec<Profile> {
    vec![
        profile(1, &["Math", "Physics"]),
        profile(2, &["Math", "Physics"]),
        profile(3, &["History"]),
    ]
}

fn fast_retry(max_attempts: u32) -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy {
            max_attempts,
            backoff: Duration::from_millis(1),
        },
        ..EngineConfig::default()
    }
}

/// Fails the first `failures` swaps, then behaves like a memory store.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicU32,
    calls: AtomicU32,
}

impl FlakyStore {
    fn failing(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            ..Self::default()
        }
    }
}

impl RecommendationStore for FlakyStore {
    async fn replace(&self, set: &RecommendationSet) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.replace(set).await
    }

    async fn recommendations_for(
        &self,
        profile_id: ProfileId,
    ) -> Result<Option<StoredRecommendations>, StoreError> {
        self.inner.recommendations_for(profile_id).await
    }
}

/// Records how many swaps overlap and optionally parks inside `replace`.
#[derive(Default)]
struct ObservedStore {
    inner: MemoryStore,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    park: AtomicBool,
    entered: Notify,
}

impl RecommendationStore for ObservedStore {
    async fn replace(&self, set: &RecommendationSet) -> Result<(), StoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.park.load(Ordering::SeqCst) {
            self.entered.notify_one();
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;

        let result = self.inner.replace(set).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn recommendations_for(
        &self,
        profile_id: ProfileId,
    ) -> Result<Option<StoredRecommendations>, StoreError> {
        self.inner.recommendations_for(profile_id).await
    }
}

#[tokio::test]
async fn nothing_is_served_before_the_first_refresh() {
    let engine = RecommendationEngine::new(
        MemoryProfileSource::new(population()),
        MemoryStore::new(),
        vocabulary("v1"),
        EngineConfig::default(),
    );
    assert!(engine.get_recommendations(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn refresh_reads_the_source_and_serves_by_id() {
    let engine = RecommendationEngine::new(
        MemoryProfileSource::new(population()),
        MemoryStore::new(),
        vocabulary("v1"),
        EngineConfig::default(),
    );

    let report = engine.refresh().await.unwrap();
    assert_eq!(report.profile_count, 3);
    assert_eq!(report.recommendation_count, 6);
    assert_eq!(report.vocabulary_version, engine.vocabulary().version());

    let recs = engine.get_recommendations(1).await.unwrap();
    assert_eq!(recs.iter().map(|r| r.profile_id).collect::<Vec<_>>(), vec![2, 3]);
    assert!(engine.get_recommendations(404).await.unwrap().is_empty());
}

#[tokio::test]
async fn profile_updates_show_up_after_the_next_refresh() {
    let engine = RecommendationEngine::new(
        MemoryProfileSource::new(population()),
        MemoryStore::new(),
        vocabulary("v1"),
        EngineConfig::default(),
    );
    engine.refresh().await.unwrap();

    engine
        .source()
        .upsert(profile(3, &["Math", "Physics"]))
        .unwrap();
    engine.source().upsert(profile(4, &["History"])).unwrap();
    engine.refresh().await.unwrap();

    let recs = engine.get_recommendations(4).await.unwrap();
    assert_eq!(recs.len(), 3);
    assert_eq!(engine.get_recommendations(1).await.unwrap()[0].profile_id, 2);
}

#[tokio::test]
async fn empty_population_clears_the_stored_set() {
    let engine = RecommendationEngine::new(
        MemoryProfileSource::default(),
        MemoryStore::new(),
        vocabulary("v1"),
        EngineConfig::default(),
    );
    engine.refresh_with(population()).await.unwrap();
    assert!(!engine.get_recommendations(1).await.unwrap().is_empty());

    let report = engine.refresh().await.unwrap();
    assert_eq!(report.profile_count, 0);
    assert_eq!(report.recommendation_count, 0);
    assert!(engine.get_recommendations(1).await.unwrap().is_empty());

    let snapshot = engine.store().snapshot().unwrap().unwrap();
    assert_eq!(snapshot.profile_count(), 0);
}

#[tokio::test]
async fn unknown_category_aborts_and_keeps_the_previous_set() {
    let engine = RecommendationEngine::new(
        MemoryProfileSource::default(),
        MemoryStore::new(),
        vocabulary("v1"),
        EngineConfig::default(),
    );
    let first = engine.refresh_with(population()).await.unwrap();

    let mut broken = population();
    broken[1].learning_style = "Kinesthetic".into();
    let err = engine.refresh_with(broken).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownCategory);
    assert!(err.to_string().contains("Kinesthetic"));

    let snapshot = engine.store().snapshot().unwrap().unwrap();
    assert_eq!(snapshot.run_id, first.run_id);
    assert_eq!(engine.get_recommendations(1).await.unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_availability_is_rejected() {
    let engine = RecommendationEngine::new(
        MemoryProfileSource::default(),
        MemoryStore::new(),
        vocabulary("v1"),
        EngineConfig::default(),
    );
    let mut profiles = population();
    profiles[0].availability = vec!["Lunchtime".into()];

    let err = engine.refresh_with(profiles).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownCategory);
    assert!(engine.store().snapshot().unwrap().is_none());
}

#[tokio::test]
async fn duplicate_ids_are_rejected() {
    let engine = RecommendationEngine::new(
        MemoryProfileSource::default(),
        MemoryStore::new(),
        vocabulary("v1"),
        EngineConfig::default(),
    );
    let mut profiles = population();
    profiles.push(profile(2, &["History"]));

    let err = engine.refresh_with(profiles).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateProfile);
}

#[tokio::test]
async fn transient_swap_failures_are_retried() {
    let engine = RecommendationEngine::new(
        MemoryProfileSource::new(population()),
        FlakyStore::failing(2),
        vocabulary("v1"),
        fast_retry(3),
    );

    let report = engine.refresh().await.unwrap();
    assert_eq!(report.attempts, 3);
    assert_eq!(engine.store().calls.load(Ordering::SeqCst), 3);
    assert_eq!(engine.get_recommendations(2).await.unwrap().len(), 2);
}

#[tokio::test]
async fn exhausted_retries_keep_the_previous_set() {
    let engine = RecommendationEngine::new(
        MemoryProfileSource::new(population()),
        FlakyStore::default(),
        vocabulary("v1"),
        fast_retry(2),
    );
    let first = engine.refresh().await.unwrap();

    engine.store().failures.store(10, Ordering::SeqCst);
    engine.source().upsert(profile(9, &["History"])).unwrap();
    let err = engine.refresh().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
    assert!(matches!(err, RefreshError::Persistence { attempts: 2, .. }));
    let snapshot = engine.store().inner.snapshot().unwrap().unwrap();
    assert_eq!(snapshot.run_id, first.run_id);
    assert!(engine.get_recommendations(9).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_refreshes_do_not_overlap() {
    let engine = Arc::new(RecommendationEngine::new(
        MemoryProfileSource::new(population()),
        ObservedStore::default(),
        vocabulary("v1"),
        EngineConfig::default(),
    ));

    let handles: Vec<_> = (0..4).map(|_| engine.spawn_refresh()).collect();
    let mut run_ids = Vec::new();
    for handle in handles {
        run_ids.push(handle.join().await.unwrap().run_id);
    }

    assert_eq!(engine.store().max_in_flight.load(Ordering::SeqCst), 1);
    let active = engine.store().inner.snapshot().unwrap().unwrap();
    assert!(run_ids.contains(&active.run_id));
    assert_eq!(active.recommendation_count(), 6);
}

#[tokio::test]
async fn cancelled_refresh_leaves_the_previous_set_active() {
    let engine = Arc::new(RecommendationEngine::new(
        MemoryProfileSource::new(population()),
        ObservedStore::default(),
        vocabulary("v1"),
        EngineConfig::default(),
    ));
    let first = engine.refresh().await.unwrap();

    engine.store().park.store(true, Ordering::SeqCst);
    engine.source().upsert(profile(7, &["History"])).unwrap();
    let handle = engine.spawn_refresh();
    engine.store().entered.notified().await;
    assert!(!handle.is_finished());

    handle.cancel();
    let err = handle.join().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let active = engine.store().inner.snapshot().unwrap().unwrap();
    assert_eq!(active.run_id, first.run_id);
    assert!(engine.get_recommendations(7).await.unwrap().is_empty());
}

#[tokio::test]
async fn sets_from_another_vocabulary_are_not_served() {
    let shared = Arc::new(MemoryStore::new());
    let v1 = RecommendationEngine::new(
        MemoryProfileSource::new(population()),
        Arc::clone(&shared),
        vocabulary("v1"),
        EngineConfig::default(),
    );
    let v2 = RecommendationEngine::new(
        MemoryProfileSource::new(population()),
        Arc::clone(&shared),
        vocabulary("v2"),
        EngineConfig::default(),
    );
    assert_ne!(v1.vocabulary().version(), v2.vocabulary().version());

    v1.refresh().await.unwrap();
    assert_eq!(v1.get_recommendations(1).await.unwrap().len(), 2);
    assert!(v2.get_recommendations(1).await.unwrap().is_empty());

    v2.refresh().await.unwrap();
    assert!(v1.get_recommendations(1).await.unwrap().is_empty());
    assert_eq!(v2.get_recommendations(1).await.unwrap().len(), 2);
}

#[tokio::test]
async fn shared_profile_source_feeds_the_engine() {
    let source = Arc::new(MemoryProfileSource::new(Vec::new()));
    let engine = RecommendationEngine::new(
        Arc::clone(&source),
        MemoryStore::new(),
        vocabulary("v1"),
        EngineConfig::default(),
    );

    source.replace_all(population()).unwrap();
    assert_eq!(engine.source().load_profiles().await.unwrap().len(), 3);
    assert_eq!(engine.refresh().await.unwrap().profile_count, 3);
}
