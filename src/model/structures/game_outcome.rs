use serde::{Deserialize, Serialize};

/// A synthesized head-to-head result against one opponent of a multi-player game.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOutcome {
    pub opponent_rating: f64,
    pub opponent_rd: f64,
    /// 1 = win, 0.5 = draw, 0 = loss
    pub score: f64
}

impl GameOutcome {
    pub fn new(opponent_rating: f64, opponent_rd: f64, score: f64) -> Self {
        GameOutcome {
            opponent_rating,
            opponent_rd,
            score
        }
    }

    /// Outcome between two ranked participants: lower rank number wins.
    pub fn from_ranks(player_rank: u32, opponent_rank: u32, opponent_rating: f64, opponent_rd: f64) -> Self {
        let score = if player_rank < opponent_rank { 1.0 } else { 0.0 };

        GameOutcome::new(opponent_rating, opponent_rd, score)
    }
}
