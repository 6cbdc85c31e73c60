use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// The scoring rule-sets a game can be played under.
///
/// The lowercase identifiers are persisted verbatim (they key the per-mode
/// metrics documents), so they must never be renamed.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    Display,
    EnumString,
    IntoStaticStr
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GameMode {
    Fastest,
    Shortest,
    Backwards,
    Hardcore,
    Debug,
    Efficiency,
    Typeracer,
    Incremental,
    Random
}

impl GameMode {
    /// Wire identifier, e.g. `"typeracer"`.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Every mode a game can actually be scored under (all but `Random`).
    pub fn concrete() -> Vec<GameMode> {
        GameMode::iter().filter(|m| *m != GameMode::Random).collect()
    }

    /// Picks the mode a `Random` game is played as. Concrete modes resolve to themselves.
    pub fn resolve<R: rand::Rng + ?Sized>(self, rng: &mut R) -> GameMode {
        if self != GameMode::Random {
            return self;
        }

        // `concrete()` is never empty
        *GameMode::concrete().choose(rng).unwrap_or(&GameMode::Fastest)
    }

    pub fn description(&self) -> &'static str {
        match self {
            GameMode::Fastest => "Complete the puzzle in the shortest time",
            GameMode::Shortest => "Write the solution with the fewest characters",
            GameMode::Backwards => "Work from output to input - logical deduction challenge",
            GameMode::Hardcore => "One attempt only - no test runs allowed",
            GameMode::Debug => "Fix broken code with minimal changes",
            GameMode::Efficiency => "Write the most computationally efficient solution",
            GameMode::Typeracer => "Copy code perfectly at maximum speed",
            GameMode::Incremental => "Progressive requirements - solve step by step",
            GameMode::Random => "Random mode - a surprise challenge"
        }
    }
}
