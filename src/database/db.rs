use super::{
    db_structs::{Game, GlickoRating, MetricsUpdate, ModeMetrics, Submission, UserMetrics, Watermark, COMPLETED_STATUS},
    store::{Store, StoreError}
};
use crate::model::structures::game_mode::GameMode;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use postgres_types::ToSql;
use std::{collections::HashMap, str::FromStr, sync::Arc};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

const SCHEMA: &str = include_str!("schema.sql");

const USER_METRICS_COLUMNS: &str =
    "user_id, total_games_played, total_games_won, last_processed_game_date, last_calculation_date";

const MODE_METRICS_COLUMNS: &str = "user_id, mode, games_played, games_won, best_score, average_score, \
    total_score, rating, rd, volatility, rating_updated_at, rank, last_game_date, last_game_id";

/// Postgres-backed [`Store`].
///
/// A single connection is shared behind a mutex so each game's writes can run in
/// their own transaction.
#[derive(Clone)]
pub struct DbClient {
    client: Arc<Mutex<Client>>
}

impl DbClient {
    // Connect to the database and return a DbClient instance
    pub async fn connect(connection_str: &str) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(connection_str, NoTls).await?;

        // Spawn the connection object to run in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("connection error: {}", e);
            }
        });

        Ok(DbClient {
            client: Arc::new(Mutex::new(client))
        })
    }

    /// Creates the processor's tables if they do not exist yet.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        self.client.lock().await.batch_execute(SCHEMA).await?;

        info!("Database schema initialized");
        Ok(())
    }

    /// Loads full metrics documents for every user matched by `filter`, a
    /// condition on `user_id` sharing `params`.
    async fn load_metrics(
        &self,
        filter: &str,
        params: &[&(dyn ToSql + Sync)]
    ) -> Result<Vec<UserMetrics>, StoreError> {
        let client = self.client.lock().await;

        let user_rows = client
            .query(
                &format!(
                    "SELECT {} FROM user_metrics WHERE {} ORDER BY user_id",
                    USER_METRICS_COLUMNS, filter
                ),
                params
            )
            .await?;
        let mode_rows = client
            .query(
                &format!("SELECT {} FROM mode_metrics WHERE {}", MODE_METRICS_COLUMNS, filter),
                params
            )
            .await?;

        let mut metrics: IndexMap<String, UserMetrics> = IndexMap::new();
        for row in &user_rows {
            let user = Self::user_metrics_from_row(row)?;
            metrics.insert(user.user_id.clone(), user);
        }

        // Link mode rows back to their parent document
        for row in &mode_rows {
            let user_id: String = row.try_get("user_id")?;
            let (mode, mode_metrics) = Self::mode_metrics_from_row(row)?;

            match metrics.get_mut(&user_id) {
                Some(user) => {
                    user.mode_metrics.insert(mode, mode_metrics);
                }
                None => {
                    return Err(StoreError::CorruptRecord {
                        id: user_id,
                        reason: "mode metrics without a parent user_metrics row".to_string()
                    })
                }
            }
        }

        Ok(metrics.into_values().collect())
    }

    fn user_metrics_from_row(row: &Row) -> Result<UserMetrics, StoreError> {
        Ok(UserMetrics {
            user_id: row.try_get("user_id")?,
            total_games_played: row.try_get::<_, i32>("total_games_played")? as u32,
            total_games_won: row.try_get::<_, i32>("total_games_won")? as u32,
            last_processed_game_date: row.try_get("last_processed_game_date")?,
            last_calculation_date: row.try_get("last_calculation_date")?,
            mode_metrics: Default::default()
        })
    }

    fn mode_metrics_from_row(row: &Row) -> Result<(GameMode, ModeMetrics), StoreError> {
        let mode = parse_mode(row.try_get("mode")?, row.try_get("user_id")?)?;
        let metrics = ModeMetrics {
            games_played: row.try_get::<_, i32>("games_played")? as u32,
            games_won: row.try_get::<_, i32>("games_won")? as u32,
            best_score: row.try_get("best_score")?,
            average_score: row.try_get("average_score")?,
            total_score: row.try_get("total_score")?,
            glicko_rating: GlickoRating {
                rating: row.try_get("rating")?,
                rd: row.try_get("rd")?,
                volatility: row.try_get("volatility")?,
                last_updated: row.try_get("rating_updated_at")?
            },
            rank: row.try_get::<_, Option<i32>>("rank")?.map(|r| r as u32),
            last_game_date: row.try_get("last_game_date")?,
            last_game_id: row.try_get("last_game_id")?
        };

        Ok((mode, metrics))
    }

    fn game_from_row(row: &Row) -> Result<Game, StoreError> {
        let id: String = row.try_get("id")?;

        Ok(Game {
            mode: parse_mode(row.try_get("mode")?, id.clone())?,
            id,
            created_at: row.try_get("created_at")?,
            status: row.try_get("status")?,
            players: row.try_get("players")?,
            player_submissions: row.try_get("player_submissions")?
        })
    }

    fn submission_from_row(row: &Row) -> Result<Submission, StoreError> {
        Ok(Submission {
            id: row.try_get("id")?,
            user: row.try_get("user_id")?,
            code: row.try_get("code")?,
            created_at: row.try_get("created_at")?,
            success_rate: row.try_get("success_rate")?,
            attempts: row.try_get::<_, Option<i32>>("attempts")?.map(|a| a.max(0) as u32)
        })
    }
}

fn parse_mode(value: String, id: String) -> Result<GameMode, StoreError> {
    GameMode::from_str(&value).map_err(|_| StoreError::CorruptRecord {
        id,
        reason: format!("unknown game mode '{}'", value)
    })
}

#[async_trait]
impl Store for DbClient {
    async fn completed_games(&self, mode: GameMode, after: &Watermark) -> Result<Vec<Game>, StoreError> {
        let client = self.client.lock().await;
        let columns = "id, mode, created_at, status, players, player_submissions";

        let rows = match &after.last_game_id {
            Some(last_id) => {
                client
                    .query(
                        &format!(
                            "SELECT {} FROM games WHERE mode = $1 AND status = $2 \
                            AND (created_at, id) > ($3, $4) ORDER BY created_at, id",
                            columns
                        ),
                        &[&mode.as_str(), &COMPLETED_STATUS, &after.last_game_date, last_id]
                    )
                    .await?
            }
            None => {
                client
                    .query(
                        &format!(
                            "SELECT {} FROM games WHERE mode = $1 AND status = $2 \
                            AND created_at > $3 ORDER BY created_at, id",
                            columns
                        ),
                        &[&mode.as_str(), &COMPLETED_STATUS, &after.last_game_date]
                    )
                    .await?
            }
        };

        debug!("Fetched {} completed {} games", rows.len(), mode);
        rows.iter().map(Self::game_from_row).collect()
    }

    async fn submissions(&self, ids: &[String]) -> Result<Vec<Submission>, StoreError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT id, user_id, code, created_at, success_rate, attempts \
                FROM submissions WHERE id = ANY($1) ORDER BY created_at, id",
                &[&ids]
            )
            .await?;

        rows.iter().map(Self::submission_from_row).collect()
    }

    async fn usernames(&self, user_ids: &[String]) -> Result<HashMap<String, String>, StoreError> {
        let client = self.client.lock().await;
        let rows = client
            .query("SELECT id, username FROM users WHERE id = ANY($1)", &[&user_ids])
            .await?;

        rows.iter()
            .map(|row| -> Result<(String, String), StoreError> {
                Ok((row.try_get("id")?, row.try_get("username")?))
            })
            .collect()
    }

    async fn user_metrics(&self, user_id: &str) -> Result<Option<UserMetrics>, StoreError> {
        let mut metrics = self.load_metrics("user_id = $1", &[&user_id]).await?;

        Ok(metrics.pop())
    }

    async fn user_metrics_for_mode(&self, mode: GameMode) -> Result<Vec<UserMetrics>, StoreError> {
        self.load_metrics(
            "user_id IN (SELECT user_id FROM mode_metrics WHERE mode = $1)",
            &[&mode.as_str()]
        )
        .await
    }

    async fn watermark(&self, mode: GameMode) -> Result<Option<Watermark>, StoreError> {
        let client = self.client.lock().await;
        let row = client
            .query_opt(
                "SELECT last_game_date, last_game_id FROM leaderboard_watermarks WHERE mode = $1",
                &[&mode.as_str()]
            )
            .await?;

        match row {
            Some(row) => Ok(Some(Watermark {
                last_game_date: row.try_get("last_game_date")?,
                last_game_id: row.try_get("last_game_id")?
            })),
            None => Ok(None)
        }
    }

    async fn commit_game(
        &self,
        mode: GameMode,
        updates: &[MetricsUpdate],
        watermark: &Watermark
    ) -> Result<(), StoreError> {
        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;

        for update in updates {
            let won = i32::from(update.won);
            transaction
                .execute(
                    "INSERT INTO user_metrics (user_id, total_games_played, total_games_won, \
                    last_processed_game_date, last_calculation_date) VALUES ($1, 1, $2, $3, $4) \
                    ON CONFLICT (user_id) DO UPDATE SET \
                    total_games_played = user_metrics.total_games_played + 1, \
                    total_games_won = user_metrics.total_games_won + EXCLUDED.total_games_won, \
                    last_processed_game_date = GREATEST(user_metrics.last_processed_game_date, \
                    EXCLUDED.last_processed_game_date), \
                    last_calculation_date = EXCLUDED.last_calculation_date",
                    &[&update.user_id, &won, &update.game_date, &update.calculated_at]
                )
                .await?;

            let m = &update.mode_metrics;
            let values: &[&(dyn ToSql + Sync)] = &[
                &update.user_id,
                &update.mode.as_str(),
                &(m.games_played as i32),
                &(m.games_won as i32),
                &m.best_score,
                &m.average_score,
                &m.total_score,
                &m.glicko_rating.rating,
                &m.glicko_rating.rd,
                &m.glicko_rating.volatility,
                &m.glicko_rating.last_updated,
                &m.rank.map(|r| r as i32),
                &m.last_game_date,
                &m.last_game_id
            ];
            transaction
                .execute(
                    &format!(
                        "INSERT INTO mode_metrics ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
                        ON CONFLICT (user_id, mode) DO UPDATE SET \
                        games_played = EXCLUDED.games_played, games_won = EXCLUDED.games_won, \
                        best_score = EXCLUDED.best_score, average_score = EXCLUDED.average_score, \
                        total_score = EXCLUDED.total_score, rating = EXCLUDED.rating, rd = EXCLUDED.rd, \
                        volatility = EXCLUDED.volatility, rating_updated_at = EXCLUDED.rating_updated_at, \
                        last_game_date = EXCLUDED.last_game_date, last_game_id = EXCLUDED.last_game_id",
                        MODE_METRICS_COLUMNS
                    ),
                    values
                )
                .await?;
        }

        transaction
            .execute(
                "INSERT INTO leaderboard_watermarks (mode, last_game_date, last_game_id) VALUES ($1, $2, $3) \
                ON CONFLICT (mode) DO UPDATE SET last_game_date = EXCLUDED.last_game_date, \
                last_game_id = EXCLUDED.last_game_id",
                &[&mode.as_str(), &watermark.last_game_date, &watermark.last_game_id]
            )
            .await?;

        transaction.commit().await?;
        Ok(())
    }

    async fn save_ranks(&self, mode: GameMode, ranks: &[(String, u32)]) -> Result<(), StoreError> {
        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;
        let statement = transaction
            .prepare("UPDATE mode_metrics SET rank = $1 WHERE user_id = $2 AND mode = $3")
            .await?;

        for (user_id, rank) in ranks {
            transaction
                .execute(&statement, &[&(*rank as i32), user_id, &mode.as_str()])
                .await?;
        }

        transaction.commit().await?;
        info!("Saved {} {} ranks", ranks.len(), mode);
        Ok(())
    }

    async fn try_acquire_lease(&self, mode: GameMode, owner: Uuid, ttl: Duration) -> Result<bool, StoreError> {
        let client = self.client.lock().await;
        let now: DateTime<Utc> = Utc::now();
        let expires_at = now + ttl;

        let acquired = client
            .execute(
                "INSERT INTO leaderboard_leases (mode, owner, expires_at) VALUES ($1, $2, $3) \
                ON CONFLICT (mode) DO UPDATE SET owner = EXCLUDED.owner, expires_at = EXCLUDED.expires_at \
                WHERE leaderboard_leases.expires_at <= $4 OR leaderboard_leases.owner = EXCLUDED.owner",
                &[&mode.as_str(), &owner, &expires_at, &now]
            )
            .await?;

        Ok(acquired == 1)
    }

    async fn release_lease(&self, mode: GameMode, owner: Uuid) -> Result<(), StoreError> {
        let client = self.client.lock().await;
        client
            .execute(
                "DELETE FROM leaderboard_leases WHERE mode = $1 AND owner = $2",
                &[&mode.as_str(), &owner]
            )
            .await?;

        Ok(())
    }
}
