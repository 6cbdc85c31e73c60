// Glicko-2 model constants
pub const DEFAULT_RATING: f64 = 1500.0;
pub const DEFAULT_RD: f64 = 350.0;
pub const DEFAULT_VOLATILITY: f64 = 0.06;
pub const MAX_RD: f64 = 350.0;
/// Conversion factor between the Glicko and Glicko-2 scales (q)
pub const GLICKO_SCALE: f64 = 173.7178;
pub const TAU: f64 = 0.5;
pub const CONVERGENCE_TOLERANCE: f64 = 1e-6;
pub const MAX_SOLVER_ITERATIONS: u32 = 100;
/// RD² grows by this much per idle day
pub const RD_GROWTH_PER_DAY: f64 = 2.0;
// Scoring constants
pub const SCORE_SCALE: f64 = 1_000_000.0;
pub const EFFICIENCY_LENGTH_SCALE: f64 = 500_000.0;
pub const EFFICIENCY_TIME_WEIGHT: f64 = 0.4;
pub const EFFICIENCY_LENGTH_WEIGHT: f64 = 0.6;
pub const TYPERACER_MULTIPLIER: f64 = 1000.0;
pub const BACKWARDS_ATTEMPT_PENALTY: f64 = 0.1;
pub const DEBUG_CHANGE_BASELINE: f64 = 10_000.0;
pub const DEBUG_CHANGE_FLOOR: f64 = 0.5;
pub const INCREMENTAL_DECAY_SECONDS: f64 = 3600.0;
pub const INCREMENTAL_DECAY_FLOOR: f64 = 0.1;
// Processing
pub const MIN_SUBMISSIONS_PER_GAME: usize = 2;
pub const DEFAULT_LEASE_TTL_SECS: i64 = 900;
/// Hourly, matching the scheduled recalculation
pub const DEFAULT_INTERVAL_SECS: u64 = 3600;
