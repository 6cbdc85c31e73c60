use serde::Serialize;

/// One participant's line in a single game's ranking. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredEntry {
    pub user_id: String,
    pub username: String,
    pub score: f64,
    pub time_spent: f64,
    pub code_length: Option<u32>,
    pub success_rate: f64,
    /// 1-based, unique within the game
    pub rank: u32
}
