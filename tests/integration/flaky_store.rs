use async_trait::async_trait;
use chrono::Duration;
use leaderboard_processor::{
    database::{
        db_structs::{Game, MetricsUpdate, Submission, UserMetrics, Watermark},
        memory::InMemoryStore,
        store::{Store, StoreError}
    },
    model::structures::game_mode::GameMode
};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering}
};
use uuid::Uuid;

/// In-memory store whose `commit_game` starts failing for one mode after a
/// number of successful commits, like a database going away mid-pass.
pub struct FlakyStore {
    pub inner: InMemoryStore,
    failing_mode: GameMode,
    commits_before_failure: AtomicUsize,
    healthy: AtomicBool
}

impl FlakyStore {
    pub fn new(failing_mode: GameMode, commits_before_failure: usize) -> Self {
        FlakyStore {
            inner: InMemoryStore::new(),
            failing_mode,
            commits_before_failure: AtomicUsize::new(commits_before_failure),
            healthy: AtomicBool::new(false)
        }
    }

    pub fn heal(&self) {
        self.healthy.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn completed_games(&self, mode: GameMode, after: &Watermark) -> Result<Vec<Game>, StoreError> {
        self.inner.completed_games(mode, after).await
    }

    async fn submissions(&self, ids: &[String]) -> Result<Vec<Submission>, StoreError> {
        self.inner.submissions(ids).await
    }

    async fn usernames(&self, user_ids: &[String]) -> Result<HashMap<String, String>, StoreError> {
        self.inner.usernames(user_ids).await
    }

    async fn user_metrics(&self, user_id: &str) -> Result<Option<UserMetrics>, StoreError> {
        self.inner.user_metrics(user_id).await
    }

    async fn user_metrics_for_mode(&self, mode: GameMode) -> Result<Vec<UserMetrics>, StoreError> {
        self.inner.user_metrics_for_mode(mode).await
    }

    async fn watermark(&self, mode: GameMode) -> Result<Option<Watermark>, StoreError> {
        self.inner.watermark(mode).await
    }

    async fn commit_game(
        &self,
        mode: GameMode,
        updates: &[MetricsUpdate],
        watermark: &Watermark
    ) -> Result<(), StoreError> {
        if mode == self.failing_mode && !self.healthy.load(Ordering::SeqCst) {
            let remaining = self.commits_before_failure.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.commits_before_failure.store(remaining - 1, Ordering::SeqCst);
        }

        self.inner.commit_game(mode, updates, watermark).await
    }

    async fn save_ranks(&self, mode: GameMode, ranks: &[(String, u32)]) -> Result<(), StoreError> {
        self.inner.save_ranks(mode, ranks).await
    }

    async fn try_acquire_lease(&self, mode: GameMode, owner: Uuid, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.try_acquire_lease(mode, owner, ttl).await
    }

    async fn release_lease(&self, mode: GameMode, owner: Uuid) -> Result<(), StoreError> {
        self.inner.release_lease(mode, owner).await
    }
}
