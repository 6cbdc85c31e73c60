use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc
};

use chrono::{Duration, Utc};
use futures::future::join_all;
use itertools::Itertools;
use serde::Serialize;
use strum::IntoEnumIterator;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    database::{
        db_structs::{Game, GlickoRating, MetricsUpdate, ModeMetrics, UserMetrics, Watermark},
        store::{Store, StoreError}
    },
    model::{
        constants::{DEFAULT_LEASE_TTL_SECS, MIN_SUBMISSIONS_PER_GAME},
        glicko::{Glicko2, Glicko2Params, RatingError},
        ranking::{LeaderboardPage, Standings, UserModeRanking},
        scoring::game_leaderboard,
        structures::{game_mode::GameMode, game_outcome::GameOutcome, scored_entry::ScoredEntry}
    },
    utils::progress_utils::progress_bar
};

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Rating update failed for user {user_id} in game {game_id}: {source}")]
    Rating {
        game_id: String,
        user_id: String,
        #[source]
        source: RatingError
    },

    #[error("A {0} recalculation is already running")]
    ConcurrentRecalculation(GameMode),

    #[error("Invalid pagination: page {page}, page size {page_size} (both start at 1)")]
    InvalidPagination { page: usize, page_size: usize },

    #[error("Submission {submission_id} in game {game_id} has no user")]
    MissingUser { game_id: String, submission_id: String }
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    /// How long a store lease stays valid if its holder dies mid-pass
    pub lease_ttl: Duration,
    pub rating: Glicko2Params
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            lease_ttl: Duration::seconds(DEFAULT_LEASE_TTL_SECS),
            rating: Glicko2Params::default()
        }
    }
}

/// Outcome of one recalculation trigger across modes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculationSummary {
    pub processed_games: BTreeMap<GameMode, usize>,
    pub total_processed: usize,
    pub failures: BTreeMap<GameMode, String>
}

impl RecalculationSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// # Leaderboard processing
///
/// Turns completed games into ratings, one mode at a time.
///
/// Steps of a pass over one mode:
/// 1. Take the mode's lease (in-process lock, then the store lease).
/// 2. Find the watermark: the explicit record, or the earliest last applied game of the
///     mode's players when no record exists yet.
/// 3. Fetch every completed game after the watermark in `(created_at, id)` order.
/// 4. Rate each game and commit its metrics together with the new watermark.
/// 5. Re-rank every player of the mode.
///
/// Passes over different modes are independent and may run concurrently.
pub struct LeaderboardService<S: Store> {
    store: Arc<S>,
    engine: Glicko2,
    lease_ttl: Duration,
    locks: HashMap<GameMode, Mutex<()>>
}

impl<S: Store> LeaderboardService<S> {
    pub fn new(store: Arc<S>, config: ProcessorConfig) -> Self {
        LeaderboardService {
            store,
            engine: Glicko2::new(config.rating),
            lease_ttl: config.lease_ttl,
            locks: GameMode::iter().map(|mode| (mode, Mutex::new(()))).collect()
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Processes every mode concurrently. A failing mode never stops the others;
    /// its error is reported in the summary instead.
    pub async fn recalculate_all_leaderboards(&self) -> RecalculationSummary {
        self.recalculate_modes(&GameMode::iter().collect_vec()).await
    }

    pub async fn recalculate_modes(&self, modes: &[GameMode]) -> RecalculationSummary {
        let results = join_all(
            modes
                .iter()
                .map(|mode| async move { (*mode, self.process_games_for_mode(*mode).await) })
        )
        .await;

        let mut summary = RecalculationSummary::default();
        for (mode, result) in results {
            match result {
                Ok(processed) => {
                    summary.processed_games.insert(mode, processed);
                    summary.total_processed += processed;
                }
                Err(e) => {
                    error!("Failed to recalculate the {} leaderboard: {}", mode, e);
                    summary.failures.insert(mode, e.to_string());
                }
            }
        }

        info!(
            "Recalculation complete: {} games processed, {} modes failed",
            summary.total_processed,
            summary.failures.len()
        );
        summary
    }

    /// Runs one pass over `mode` and returns the number of games that changed ratings.
    ///
    /// Fails with [`ProcessingError::ConcurrentRecalculation`] before writing anything if
    /// another pass over the same mode holds the lease.
    pub async fn process_games_for_mode(&self, mode: GameMode) -> Result<usize, ProcessingError> {
        let _guard = self.mode_lock(mode)?;

        let owner = Uuid::new_v4();
        if !self.store.try_acquire_lease(mode, owner, self.lease_ttl).await? {
            warn!("The {} lease is held by another processor, skipping", mode);
            return Err(ProcessingError::ConcurrentRecalculation(mode));
        }

        let result = self.run_pass(mode).await;

        if let Err(e) = self.store.release_lease(mode, owner).await {
            warn!("Failed to release the {} lease, it will expire on its own: {}", mode, e);
        }

        result
    }

    fn mode_lock(&self, mode: GameMode) -> Result<MutexGuard<'_, ()>, ProcessingError> {
        self.locks
            .get(&mode)
            .and_then(|lock| lock.try_lock().ok())
            .ok_or(ProcessingError::ConcurrentRecalculation(mode))
    }

    async fn run_pass(&self, mode: GameMode) -> Result<usize, ProcessingError> {
        let watermark = self.resolve_watermark(mode).await?;
        let games = self.store.completed_games(mode, &watermark).await?;

        if games.is_empty() {
            debug!("No new {} games after {}", mode, watermark.last_game_date);
        } else {
            info!("Processing {} new {} games", games.len(), mode);
        }

        let bar = progress_bar(games.len() as u64, format!("Processing {} games", mode));
        let mut processed = 0;

        for game in &games {
            match self.process_game(mode, game).await {
                Ok(true) => processed += 1,
                Ok(false) => {}
                Err(e) => {
                    // Games before the failed one are committed, keep the ranks in step with them
                    if processed > 0 {
                        if let Err(rank_error) = self.update_rankings_for_mode(mode).await {
                            warn!("Failed to re-rank {} after a halted pass: {}", mode, rank_error);
                        }
                    }
                    return Err(e);
                }
            }

            if let Some(bar) = &bar {
                bar.inc(1);
            }
        }

        if let Some(bar) = &bar {
            bar.finish_with_message(format!("Processed {} {} games", processed, mode));
        }

        self.update_rankings_for_mode(mode).await?;
        Ok(processed)
    }

    /// The explicit watermark record, or the earliest last applied game among the
    /// mode's players for data written before watermark records existed.
    async fn resolve_watermark(&self, mode: GameMode) -> Result<Watermark, ProcessingError> {
        if let Some(watermark) = self.store.watermark(mode).await? {
            return Ok(watermark);
        }

        let earliest = self
            .store
            .user_metrics_for_mode(mode)
            .await?
            .iter()
            .filter_map(|m| m.mode(mode).and_then(ModeMetrics::last_applied))
            .min();

        Ok(earliest.unwrap_or_else(Watermark::epoch))
    }

    /// Rates one completed game and commits the result together with the watermark.
    /// Returns false when the game changed no ratings (too few players, or already applied).
    pub async fn process_game(&self, mode: GameMode, game: &Game) -> Result<bool, ProcessingError> {
        let watermark = Watermark::after_game(game);
        let submissions = self.store.submissions(&game.player_submissions).await?;

        if let Some(s) = submissions.iter().find(|s| s.user.is_empty()) {
            return Err(ProcessingError::MissingUser {
                game_id: game.id.clone(),
                submission_id: s.id.clone()
            });
        }

        let user_ids = submissions.iter().map(|s| s.user.clone()).unique().collect_vec();
        if user_ids.len() < MIN_SUBMISSIONS_PER_GAME {
            warn!(
                "Skipping {} game {}: {} participant(s), at least {} required",
                mode,
                game.id,
                user_ids.len(),
                MIN_SUBMISSIONS_PER_GAME
            );
            self.store.commit_game(mode, &[], &watermark).await?;
            return Ok(false);
        }

        let usernames = self.store.usernames(&user_ids).await?;
        let entries = best_entry_per_user(game_leaderboard(game, &submissions, &usernames));

        // Everyone is rated against the ratings as they stood before this game
        let mut pre_game: HashMap<String, ModeMetrics> = HashMap::new();
        for entry in &entries {
            let stored = self.store.user_metrics(&entry.user_id).await?;
            pre_game.insert(entry.user_id.clone(), self.pre_game_metrics(stored, mode, game));
        }

        let calculated_at = Utc::now();
        let mut updates = Vec::with_capacity(entries.len());

        for entry in &entries {
            let Some(current) = pre_game.get(&entry.user_id) else {
                continue;
            };

            if current.has_applied(game) {
                debug!("Game {} already applied to user {}, skipping", game.id, entry.user_id);
                continue;
            }

            let outcomes = entries
                .iter()
                .filter(|other| other.user_id != entry.user_id)
                .filter_map(|other| {
                    pre_game.get(&other.user_id).map(|m| {
                        GameOutcome::from_ranks(entry.rank, other.rank, m.glicko_rating.rating, m.glicko_rating.rd)
                    })
                })
                .collect_vec();

            let rating = self
                .engine
                .update_rating(&current.glicko_rating, &outcomes, game.created_at)
                .map_err(|source| ProcessingError::Rating {
                    game_id: game.id.clone(),
                    user_id: entry.user_id.clone(),
                    source
                })?;

            let mut mode_metrics = current.clone();
            mode_metrics.record_game(entry.score, entry.rank == 1);
            mode_metrics.glicko_rating = rating;
            mode_metrics.mark_applied(game);

            debug!(
                "Game {}: {} ranked {} ({:.1} -> {:.1})",
                game.id, entry.user_id, entry.rank, current.glicko_rating.rating, rating.rating
            );

            updates.push(MetricsUpdate {
                user_id: entry.user_id.clone(),
                mode,
                mode_metrics,
                won: entry.rank == 1,
                game_date: game.created_at,
                calculated_at
            });
        }

        self.store.commit_game(mode, &updates, &watermark).await?;
        Ok(!updates.is_empty())
    }

    /// Metrics a participant enters `game` with. New players start at the default
    /// rating; returning players have their deviation grown for the idle time.
    fn pre_game_metrics(&self, stored: Option<UserMetrics>, mode: GameMode, game: &Game) -> ModeMetrics {
        match stored.as_ref().and_then(|m| m.mode(mode)) {
            Some(existing) => {
                let mut metrics = existing.clone();
                if existing.last_game_date.map_or(true, |last| last < game.created_at) {
                    metrics.glicko_rating = self.engine.decay_rating(&existing.glicko_rating, game.created_at);
                }
                metrics
            }
            None => ModeMetrics::new(self.engine.default_rating(game.created_at))
        }
    }

    /// Re-ranks every player of `mode` by rating. Returns the number of ranked players.
    pub async fn update_rankings_for_mode(&self, mode: GameMode) -> Result<usize, ProcessingError> {
        let metrics = self.store.user_metrics_for_mode(mode).await?;
        let ranks = Standings::new(mode, &metrics).ranks();

        if !ranks.is_empty() {
            self.store.save_ranks(mode, &ranks).await?;
        }

        debug!("Ranked {} {} players", ranks.len(), mode);
        Ok(ranks.len())
    }

    /// One page of the `mode` leaderboard, best rating first. `page` is 1-based.
    pub async fn get_leaderboard(
        &self,
        mode: GameMode,
        page: usize,
        page_size: usize
    ) -> Result<LeaderboardPage, ProcessingError> {
        if page == 0 || page_size == 0 {
            return Err(ProcessingError::InvalidPagination { page, page_size });
        }

        let metrics = self.store.user_metrics_for_mode(mode).await?;
        let standings = Standings::new(mode, &metrics);
        let usernames = self
            .store
            .usernames(&standings.page_user_ids(page, page_size))
            .await?;

        Ok(standings.page(page, page_size, &usernames))
    }

    /// Per-mode standing of one user. Users who never played are an empty map.
    pub async fn get_user_rankings(&self, user_id: &str) -> Result<BTreeMap<GameMode, UserModeRanking>, ProcessingError> {
        let rankings = self
            .store
            .user_metrics(user_id)
            .await?
            .map(|metrics| {
                metrics
                    .mode_metrics
                    .iter()
                    .map(|(mode, entry)| (*mode, UserModeRanking::from(entry)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(rankings)
    }

    pub async fn get_user_metrics(&self, user_id: &str) -> Result<Option<UserMetrics>, ProcessingError> {
        Ok(self.store.user_metrics(user_id).await?)
    }

    /// Rating a new player of any mode starts from.
    pub fn default_rating(&self) -> GlickoRating {
        self.engine.default_rating(Utc::now())
    }
}

/// Keeps each user's best-placed entry and closes the rank gaps this leaves.
fn best_entry_per_user(entries: Vec<ScoredEntry>) -> Vec<ScoredEntry> {
    entries
        .into_iter()
        .unique_by(|e| e.user_id.clone())
        .enumerate()
        .map(|(i, entry)| ScoredEntry {
            rank: i as u32 + 1,
            ..entry
        })
        .collect()
}
