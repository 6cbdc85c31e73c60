use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    database::db_structs::{GlickoRating, ModeMetrics, UserMetrics},
    model::{scoring::UNKNOWN_USERNAME, structures::game_mode::GameMode}
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub username: String,
    pub rating: f64,
    pub glicko: GlickoRating,
    pub games_played: u32,
    pub games_won: u32,
    pub win_rate: f64,
    pub best_score: f64,
    pub average_score: f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardPage {
    pub mode: GameMode,
    pub page: usize,
    pub page_size: usize,
    pub entries: Vec<LeaderboardEntry>,
    /// Number of players with an entry for the mode
    pub total: usize,
    /// Most recent calculation across every record of the mode, not just this page
    pub last_updated: Option<DateTime<Utc>>
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserModeRanking {
    pub rank: Option<u32>,
    pub rating: f64,
    pub games_played: u32,
    pub win_rate: f64
}

impl From<&ModeMetrics> for UserModeRanking {
    fn from(metrics: &ModeMetrics) -> Self {
        UserModeRanking {
            rank: metrics.rank,
            rating: metrics.glicko_rating.rating,
            games_played: metrics.games_played,
            win_rate: metrics.win_rate()
        }
    }
}

/// Global standings of one mode, best rating first. Equal ratings are ordered by user id
/// so the result never depends on storage order.
pub struct Standings<'a> {
    mode: GameMode,
    leaderboard: IndexMap<&'a str, &'a ModeMetrics>,
    last_updated: Option<DateTime<Utc>>
}

impl<'a> Standings<'a> {
    pub fn new(mode: GameMode, metrics: &'a [UserMetrics]) -> Self {
        let mut leaderboard: IndexMap<&'a str, &'a ModeMetrics> = metrics
            .iter()
            .filter_map(|m| m.mode(mode).map(|entry| (m.user_id.as_str(), entry)))
            .collect();

        leaderboard.sort_by(|k1, v1, k2, v2| {
            v2.glicko_rating
                .rating
                .total_cmp(&v1.glicko_rating.rating)
                .then_with(|| k1.cmp(k2))
        });

        let last_updated = metrics
            .iter()
            .filter(|m| m.mode_metrics.contains_key(&mode))
            .map(|m| m.last_calculation_date)
            .max();

        Standings {
            mode,
            leaderboard,
            last_updated
        }
    }

    /// `(user_id, rank)` for every player, ranks 1..=N.
    pub fn ranks(&self) -> Vec<(String, u32)> {
        self.leaderboard
            .keys()
            .enumerate()
            .map(|(i, user_id)| (user_id.to_string(), i as u32 + 1))
            .collect()
    }

    /// The user ids shown on a 1-based `page`.
    pub fn page_user_ids(&self, page: usize, page_size: usize) -> Vec<String> {
        self.page_slice(page, page_size)
            .map(|(user_id, _, _)| user_id.to_string())
            .collect()
    }

    /// Builds a 1-based `page`. Players missing from `usernames` are shown as unknown.
    /// Entries fall back to their position when no rank was stored yet.
    pub fn page(&self, page: usize, page_size: usize, usernames: &HashMap<String, String>) -> LeaderboardPage {
        let entries = self
            .page_slice(page, page_size)
            .map(|(user_id, metrics, position)| LeaderboardEntry {
                rank: metrics.rank.unwrap_or(position),
                user_id: user_id.to_string(),
                username: usernames
                    .get(user_id)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_USERNAME.to_string()),
                rating: metrics.glicko_rating.rating,
                glicko: metrics.glicko_rating,
                games_played: metrics.games_played,
                games_won: metrics.games_won,
                win_rate: metrics.win_rate(),
                best_score: metrics.best_score,
                average_score: metrics.average_score
            })
            .collect();

        LeaderboardPage {
            mode: self.mode,
            page,
            page_size,
            entries,
            total: self.leaderboard.len(),
            last_updated: self.last_updated
        }
    }

    fn page_slice(&self, page: usize, page_size: usize) -> impl Iterator<Item = (&'a str, &'a ModeMetrics, u32)> + '_ {
        let skip = page.saturating_sub(1).saturating_mul(page_size);

        self.leaderboard
            .iter()
            .enumerate()
            .skip(skip)
            .take(page_size)
            .map(|(i, (user_id, metrics))| (*user_id, *metrics, i as u32 + 1))
    }
}
