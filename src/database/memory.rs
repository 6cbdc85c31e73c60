use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use indexmap::IndexMap;
use itertools::Itertools;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    database::{
        db_structs::{Game, MetricsUpdate, Submission, User, UserMetrics, Watermark},
        store::{Lease, Store, StoreError}
    },
    model::structures::game_mode::GameMode
};

#[derive(Default)]
struct State {
    games: IndexMap<String, Game>,
    submissions: IndexMap<String, Submission>,
    users: IndexMap<String, User>,
    metrics: IndexMap<String, UserMetrics>,
    watermarks: HashMap<GameMode, Watermark>,
    leases: HashMap<GameMode, Lease>
}

/// [`Store`] kept entirely in memory. Every write happens under one lock,
/// so `commit_game` is atomic with respect to every reader.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_game(&self, game: Game) {
        self.state.write().await.games.insert(game.id.clone(), game);
    }

    pub async fn insert_submission(&self, submission: Submission) {
        self.state
            .write()
            .await
            .submissions
            .insert(submission.id.clone(), submission);
    }

    pub async fn insert_user(&self, user: User) {
        self.state.write().await.users.insert(user.id.clone(), user);
    }

    /// Seeds pre-existing metrics, e.g. documents written before watermark records existed.
    pub async fn insert_user_metrics(&self, metrics: UserMetrics) {
        self.state
            .write()
            .await
            .metrics
            .insert(metrics.user_id.clone(), metrics);
    }

    pub async fn set_watermark(&self, mode: GameMode, watermark: Watermark) {
        self.state.write().await.watermarks.insert(mode, watermark);
    }

    pub async fn metrics_count(&self) -> usize {
        self.state.read().await.metrics.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn completed_games(&self, mode: GameMode, after: &Watermark) -> Result<Vec<Game>, StoreError> {
        let state = self.state.read().await;

        Ok(state
            .games
            .values()
            .filter(|g| g.mode == mode && g.is_completed() && after.precedes(g))
            .sorted_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))
            .cloned()
            .collect())
    }

    async fn submissions(&self, ids: &[String]) -> Result<Vec<Submission>, StoreError> {
        let state = self.state.read().await;

        Ok(ids.iter().filter_map(|id| state.submissions.get(id)).cloned().collect())
    }

    async fn usernames(&self, user_ids: &[String]) -> Result<HashMap<String, String>, StoreError> {
        let state = self.state.read().await;

        Ok(user_ids
            .iter()
            .filter_map(|id| state.users.get(id))
            .map(|u| (u.id.clone(), u.username.clone()))
            .collect())
    }

    async fn user_metrics(&self, user_id: &str) -> Result<Option<UserMetrics>, StoreError> {
        Ok(self.state.read().await.metrics.get(user_id).cloned())
    }

    async fn user_metrics_for_mode(&self, mode: GameMode) -> Result<Vec<UserMetrics>, StoreError> {
        let state = self.state.read().await;

        Ok(state
            .metrics
            .values()
            .filter(|m| m.mode_metrics.contains_key(&mode))
            .cloned()
            .collect())
    }

    async fn watermark(&self, mode: GameMode) -> Result<Option<Watermark>, StoreError> {
        Ok(self.state.read().await.watermarks.get(&mode).cloned())
    }

    async fn commit_game(
        &self,
        mode: GameMode,
        updates: &[MetricsUpdate],
        watermark: &Watermark
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        for update in updates {
            state
                .metrics
                .entry(update.user_id.clone())
                .or_insert_with(|| UserMetrics::new(&update.user_id, update.calculated_at))
                .apply(update);
        }

        state.watermarks.insert(mode, watermark.clone());
        Ok(())
    }

    async fn save_ranks(&self, mode: GameMode, ranks: &[(String, u32)]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        for (user_id, rank) in ranks {
            if let Some(entry) = state
                .metrics
                .get_mut(user_id)
                .and_then(|m| m.mode_metrics.get_mut(&mode))
            {
                entry.rank = Some(*rank);
            }
        }

        Ok(())
    }

    async fn try_acquire_lease(&self, mode: GameMode, owner: Uuid, ttl: Duration) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        if let Some(lease) = state.leases.get(&mode) {
            if lease.is_live(now) && lease.owner != owner {
                return Ok(false);
            }
        }

        state.leases.insert(
            mode,
            Lease {
                owner,
                expires_at: now + ttl
            }
        );
        Ok(true)
    }

    async fn release_lease(&self, mode: GameMode, owner: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        if state.leases.get(&mode).is_some_and(|l| l.owner == owner) {
            state.leases.remove(&mode);
        }

        Ok(())
    }
}
