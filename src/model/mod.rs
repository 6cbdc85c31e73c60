pub mod constants;
pub mod decay;
pub mod glicko;
pub mod leaderboard;
pub mod ranking;
pub mod scoring;
pub mod structures;
