pub mod game_mode;
pub mod game_outcome;
pub mod scored_entry;
pub mod submission_outcome;
