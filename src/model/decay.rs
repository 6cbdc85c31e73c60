use chrono::{DateTime, Utc};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// # How this works
/// - A player's rating was last touched at time T (`last_updated`)
/// - The processor looks at the player again at time D (`now`)
/// - Uncertainty grows with the idle time (D - T), measured in fractional days
/// - The rating itself never moves during inactivity, only the deviation
///
/// # Rules
/// - Each idle day adds `growth_per_day` to the variance (rd²)
/// - The deviation never exceeds `max_rd`
/// - A clock that moved backwards counts as zero idle time
pub fn inflate_rd(rd: f64, idle_days: f64, growth_per_day: f64, max_rd: f64) -> f64 {
    let new_rd = (rd.powf(2.0) + growth_per_day * idle_days.max(0.0)).sqrt();

    new_rd.min(max_rd)
}

/// Fractional days between `last_updated` and `now`, never negative.
pub fn idle_days(last_updated: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let seconds = (now - last_updated).num_milliseconds() as f64 / 1000.0;

    (seconds / SECONDS_PER_DAY).max(0.0)
}
