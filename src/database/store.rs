use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    database::db_structs::{Game, MetricsUpdate, Submission, UserMetrics, Watermark},
    model::structures::game_mode::GameMode
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String)
}

/// Persistence seam of the leaderboard processor.
///
/// Game, submission and user records are owned by other services and only read here.
/// Metrics, ranks, watermarks and leases are owned by the processor.
#[async_trait]
pub trait Store: Send + Sync {
    /// Completed games of `mode` that sort strictly after `after`, ascending by `(created_at, id)`.
    async fn completed_games(&self, mode: GameMode, after: &Watermark) -> Result<Vec<Game>, StoreError>;

    /// Submissions with the given ids. Unknown ids are silently absent.
    async fn submissions(&self, ids: &[String]) -> Result<Vec<Submission>, StoreError>;

    /// Usernames keyed by user id. Unknown ids are silently absent.
    async fn usernames(&self, user_ids: &[String]) -> Result<HashMap<String, String>, StoreError>;

    async fn user_metrics(&self, user_id: &str) -> Result<Option<UserMetrics>, StoreError>;

    /// Every user with an entry for `mode`.
    async fn user_metrics_for_mode(&self, mode: GameMode) -> Result<Vec<UserMetrics>, StoreError>;

    /// The explicit watermark record of `mode`, if one was ever committed.
    async fn watermark(&self, mode: GameMode) -> Result<Option<Watermark>, StoreError>;

    /// Writes every participant's update together with the new watermark, all or nothing.
    async fn commit_game(
        &self,
        mode: GameMode,
        updates: &[MetricsUpdate],
        watermark: &Watermark
    ) -> Result<(), StoreError>;

    /// Stores `(user_id, rank)` pairs for `mode`.
    async fn save_ranks(&self, mode: GameMode, ranks: &[(String, u32)]) -> Result<(), StoreError>;

    /// Takes the exclusive lease of `mode` for `ttl`. Returns false if another live owner holds it.
    /// An expired lease may be taken over.
    async fn try_acquire_lease(&self, mode: GameMode, owner: Uuid, ttl: Duration) -> Result<bool, StoreError>;

    /// Releases the lease if `owner` still holds it.
    async fn release_lease(&self, mode: GameMode, owner: Uuid) -> Result<(), StoreError>;
}

/// Lease row shared by the store implementations
#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub owner: Uuid,
    pub expires_at: DateTime<Utc>
}

impl Lease {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
