use crate::model::structures::game_mode::GameMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The only game status eligible for rating.
pub const COMPLETED_STATUS: &str = "completed";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: String,
    pub mode: GameMode,
    pub created_at: DateTime<Utc>,
    pub status: String,
    pub players: Vec<String>,
    pub player_submissions: Vec<String>
}

impl Game {
    pub fn is_completed(&self) -> bool {
        self.status == COMPLETED_STATUS
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    /// Id of the submitting user
    pub user: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub success_rate: f64,
    pub attempts: Option<u32>
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub username: String
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlickoRating {
    pub rating: f64,
    pub rd: f64,
    pub volatility: f64,
    pub last_updated: DateTime<Utc>
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModeMetrics {
    pub games_played: u32,
    pub games_won: u32,
    pub best_score: f64,
    pub average_score: f64,
    pub total_score: f64,
    pub glicko_rating: GlickoRating,
    /// Refreshed after each pass that committed games
    pub rank: Option<u32>,
    pub last_game_date: Option<DateTime<Utc>>,
    /// Breaks ties between games sharing `last_game_date`
    #[serde(default)]
    pub last_game_id: Option<String>
}

impl ModeMetrics {
    pub fn new(rating: GlickoRating) -> Self {
        ModeMetrics {
            games_played: 0,
            games_won: 0,
            best_score: 0.0,
            average_score: 0.0,
            total_score: 0.0,
            glicko_rating: rating,
            rank: None,
            last_game_date: None,
            last_game_id: None
        }
    }

    /// Marks `game` as the latest one folded into these metrics.
    pub fn mark_applied(&mut self, game: &Game) {
        self.last_game_date = Some(game.created_at);
        self.last_game_id = Some(game.id.clone());
    }

    /// The boundary of the games already folded into these metrics.
    pub fn last_applied(&self) -> Option<Watermark> {
        self.last_game_date.map(|last_game_date| Watermark {
            last_game_date,
            last_game_id: self.last_game_id.clone()
        })
    }

    /// True if `game` sorts at or before the last applied game, in watermark order.
    pub fn has_applied(&self, game: &Game) -> bool {
        self.last_applied().is_some_and(|applied| !applied.precedes(game))
    }

    /// Folds one finished game into the counters. `average_score` always
    /// equals `total_score / games_played` afterwards.
    pub fn record_game(&mut self, score: f64, won: bool) {
        self.games_played += 1;
        if won {
            self.games_won += 1;
        }

        self.total_score += score;
        self.average_score = self.total_score / self.games_played as f64;
        self.best_score = self.best_score.max(score);
    }

    pub fn win_rate(&self) -> f64 {
        if self.games_played == 0 {
            return 0.0;
        }

        self.games_won as f64 / self.games_played as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserMetrics {
    pub user_id: String,
    pub total_games_played: u32,
    pub total_games_won: u32,
    pub last_processed_game_date: DateTime<Utc>,
    pub last_calculation_date: DateTime<Utc>,
    pub mode_metrics: BTreeMap<GameMode, ModeMetrics>
}

impl UserMetrics {
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        UserMetrics {
            user_id: user_id.to_string(),
            total_games_played: 0,
            total_games_won: 0,
            last_processed_game_date: DateTime::<Utc>::UNIX_EPOCH,
            last_calculation_date: now,
            mode_metrics: BTreeMap::new()
        }
    }

    pub fn mode(&self, mode: GameMode) -> Option<&ModeMetrics> {
        self.mode_metrics.get(&mode)
    }
}

/// The processing boundary of one mode: the last game whose results were committed.
/// Games order by `(created_at, id)`, so the id breaks timestamp ties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    pub last_game_date: DateTime<Utc>,
    /// `None` when the boundary was inferred from player metrics instead of a record
    pub last_game_id: Option<String>
}

impl Watermark {
    pub fn epoch() -> Self {
        Watermark::at(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn at(last_game_date: DateTime<Utc>) -> Self {
        Watermark {
            last_game_date,
            last_game_id: None
        }
    }

    pub fn after_game(game: &Game) -> Self {
        Watermark {
            last_game_date: game.created_at,
            last_game_id: Some(game.id.clone())
        }
    }

    /// True if `game` sorts strictly after this boundary.
    pub fn precedes(&self, game: &Game) -> bool {
        match &self.last_game_id {
            Some(id) => (game.created_at, game.id.as_str()) > (self.last_game_date, id.as_str()),
            None => game.created_at > self.last_game_date
        }
    }
}

/// Everything one game changes for one participant. Totals are applied as
/// increments so passes over different modes never overwrite each other.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsUpdate {
    pub user_id: String,
    pub mode: GameMode,
    pub mode_metrics: ModeMetrics,
    pub won: bool,
    pub game_date: DateTime<Utc>,
    pub calculated_at: DateTime<Utc>
}

impl UserMetrics {
    /// Applies `update` in place, the same way the stores persist it.
    pub fn apply(&mut self, update: &MetricsUpdate) {
        self.total_games_played += 1;
        if update.won {
            self.total_games_won += 1;
        }

        self.last_processed_game_date = self.last_processed_game_date.max(update.game_date);
        self.last_calculation_date = update.calculated_at;
        self.mode_metrics.insert(update.mode, update.mode_metrics.clone());
    }
}
