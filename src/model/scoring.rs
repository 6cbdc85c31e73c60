use std::{cmp::Ordering, collections::HashMap};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;

use crate::{
    database::db_structs::{Game, Submission},
    model::{
        constants::*,
        structures::{game_mode::GameMode, scored_entry::ScoredEntry, submission_outcome::SubmissionOutcome}
    }
};

/// Username shown when the user record cannot be found
pub const UNKNOWN_USERNAME: &str = "Unknown";

/// Submissions this close to zero seconds are clamped so time-based scores stay finite.
const MIN_TIME_SPENT: f64 = 0.001;

/// Result of checking a submission against a mode's acceptance rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validity {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>
}

impl Validity {
    fn ok() -> Self {
        Validity {
            valid: true,
            reason: None
        }
    }

    fn rejected(reason: &'static str) -> Self {
        Validity {
            valid: false,
            reason: Some(reason)
        }
    }
}

/// The scoring rules of one game mode.
pub struct ScoringStrategy {
    pub display_metrics: &'static [&'static str],
    /// Modes with partial credit rank by score alone, without the success-rate partition
    pub partial_credit: bool,
    score: fn(&SubmissionOutcome) -> f64,
    validate: fn(&SubmissionOutcome) -> Validity
}

impl ScoringStrategy {
    pub fn score(&self, outcome: &SubmissionOutcome) -> f64 {
        (self.score)(outcome)
    }

    pub fn validate(&self, outcome: &SubmissionOutcome) -> Validity {
        (self.validate)(outcome)
    }

    /// Orders two submissions best-first.
    ///
    /// 1. Success rate, highest first (skipped for partial-credit modes)
    /// 2. Score, highest first
    /// 3. Time spent, earliest first
    pub fn compare(&self, a: &SubmissionOutcome, b: &SubmissionOutcome) -> Ordering {
        let by_success = if self.partial_credit {
            Ordering::Equal
        } else {
            b.success_rate.total_cmp(&a.success_rate)
        };

        by_success
            .then_with(|| self.score(b).total_cmp(&self.score(a)))
            .then_with(|| a.time_spent.total_cmp(&b.time_spent))
    }
}

static FASTEST: ScoringStrategy = ScoringStrategy {
    display_metrics: &["score", "time"],
    partial_credit: false,
    score: fastest_score,
    validate: require_full_pass
};

static SHORTEST: ScoringStrategy = ScoringStrategy {
    display_metrics: &["score", "length", "time"],
    partial_credit: false,
    score: shortest_score,
    validate: require_full_pass
};

static BACKWARDS: ScoringStrategy = ScoringStrategy {
    display_metrics: &["score", "attempts", "time"],
    partial_credit: false,
    score: backwards_score,
    validate: require_full_pass
};

static HARDCORE: ScoringStrategy = ScoringStrategy {
    display_metrics: &["score", "time", "attempts"],
    partial_credit: false,
    score: hardcore_score,
    validate: validate_hardcore
};

static DEBUG: ScoringStrategy = ScoringStrategy {
    display_metrics: &["score", "changes", "time"],
    partial_credit: false,
    score: debug_score,
    validate: require_full_pass
};

static EFFICIENCY: ScoringStrategy = ScoringStrategy {
    display_metrics: &["score", "efficiency", "time", "length"],
    partial_credit: false,
    score: efficiency_score,
    validate: require_full_pass
};

static TYPERACER: ScoringStrategy = ScoringStrategy {
    display_metrics: &["score", "speed", "time"],
    partial_credit: false,
    score: typeracer_score,
    validate: require_full_pass
};

static INCREMENTAL: ScoringStrategy = ScoringStrategy {
    display_metrics: &["score", "time", "completion"],
    partial_credit: true,
    score: incremental_score,
    validate: validate_incremental
};

// Unresolved random games fall back to plain speed scoring
static RANDOM: ScoringStrategy = ScoringStrategy {
    display_metrics: &["score", "time"],
    partial_credit: false,
    score: fastest_score,
    validate: require_full_pass
};

impl GameMode {
    pub fn strategy(&self) -> &'static ScoringStrategy {
        match self {
            GameMode::Fastest => &FASTEST,
            GameMode::Shortest => &SHORTEST,
            GameMode::Backwards => &BACKWARDS,
            GameMode::Hardcore => &HARDCORE,
            GameMode::Debug => &DEBUG,
            GameMode::Efficiency => &EFFICIENCY,
            GameMode::Typeracer => &TYPERACER,
            GameMode::Incremental => &INCREMENTAL,
            GameMode::Random => &RANDOM
        }
    }
}

pub fn score(mode: GameMode, outcome: &SubmissionOutcome) -> f64 {
    mode.strategy().score(outcome)
}

pub fn compare(mode: GameMode, a: &SubmissionOutcome, b: &SubmissionOutcome) -> Ordering {
    mode.strategy().compare(a, b)
}

pub fn is_valid(mode: GameMode, outcome: &SubmissionOutcome) -> Validity {
    mode.strategy().validate(outcome)
}

pub fn display_metrics(mode: GameMode) -> &'static [&'static str] {
    mode.strategy().display_metrics
}

/// Scores a stored submission, measuring its time from `game_start`.
pub fn score_submission(mode: GameMode, submission: &Submission, game_start: DateTime<Utc>) -> f64 {
    score(mode, &SubmissionOutcome::from_submission(submission, game_start))
}

/// Ranks a game's submissions under the game's mode. Rank 1 is the winner; ranks are
/// unique because ties fall through to submission time and then submission order.
pub fn game_leaderboard(
    game: &Game,
    submissions: &[Submission],
    usernames: &HashMap<String, String>
) -> Vec<ScoredEntry> {
    let strategy = game.mode.strategy();

    submissions
        .iter()
        .map(|s| (s, SubmissionOutcome::from_submission(s, game.created_at)))
        .sorted_by(|(_, a), (_, b)| strategy.compare(a, b))
        .enumerate()
        .map(|(i, (submission, outcome))| ScoredEntry {
            user_id: submission.user.clone(),
            username: usernames
                .get(&submission.user)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_USERNAME.to_string()),
            score: strategy.score(&outcome),
            time_spent: outcome.time_spent,
            code_length: outcome.code_length,
            success_rate: outcome.success_rate,
            rank: i as u32 + 1
        })
        .collect()
}

/// Linear time decay for incremental games, floored at 10%.
pub fn incremental_decay(time_spent: f64) -> f64 {
    (1.0 - time_spent / INCREMENTAL_DECAY_SECONDS).max(INCREMENTAL_DECAY_FLOOR)
}

fn effective_time(outcome: &SubmissionOutcome) -> f64 {
    if outcome.time_spent > 0.0 {
        outcome.time_spent
    } else {
        MIN_TIME_SPENT
    }
}

/// Code length when one was recorded; an empty submission counts as absent.
fn code_length(outcome: &SubmissionOutcome) -> Option<f64> {
    outcome.code_length.filter(|l| *l > 0).map(|l| l as f64)
}

fn time_score(outcome: &SubmissionOutcome) -> f64 {
    SCORE_SCALE / effective_time(outcome)
}

fn fastest_score(outcome: &SubmissionOutcome) -> f64 {
    if !outcome.is_full_pass() {
        return 0.0;
    }

    time_score(outcome)
}

fn shortest_score(outcome: &SubmissionOutcome) -> f64 {
    match code_length(outcome) {
        Some(length) if outcome.is_full_pass() => SCORE_SCALE / length,
        _ => 0.0
    }
}

fn backwards_score(outcome: &SubmissionOutcome) -> f64 {
    if !outcome.is_full_pass() {
        return 0.0;
    }

    let penalty = outcome.attempts() as f64 * BACKWARDS_ATTEMPT_PENALTY;
    (time_score(outcome) * (1.0 - penalty)).max(0.0)
}

fn hardcore_score(outcome: &SubmissionOutcome) -> f64 {
    if !outcome.is_full_pass() || outcome.attempts() > 1 {
        return 0.0;
    }

    time_score(outcome)
}

fn debug_score(outcome: &SubmissionOutcome) -> f64 {
    if !outcome.is_full_pass() {
        return 0.0;
    }

    let change_factor = code_length(outcome)
        .map(|length| (1.0 - length / DEBUG_CHANGE_BASELINE).max(DEBUG_CHANGE_FLOOR))
        .unwrap_or(1.0);

    time_score(outcome) * change_factor
}

fn efficiency_score(outcome: &SubmissionOutcome) -> f64 {
    if !outcome.is_full_pass() {
        return 0.0;
    }

    let length_component = code_length(outcome)
        .map(|length| EFFICIENCY_LENGTH_SCALE / length)
        .unwrap_or(0.0);

    time_score(outcome) * EFFICIENCY_TIME_WEIGHT + length_component * EFFICIENCY_LENGTH_WEIGHT
}

fn typeracer_score(outcome: &SubmissionOutcome) -> f64 {
    match code_length(outcome) {
        Some(length) if outcome.is_full_pass() => (length / effective_time(outcome)) * TYPERACER_MULTIPLIER,
        _ => 0.0
    }
}

fn incremental_score(outcome: &SubmissionOutcome) -> f64 {
    if outcome.success_rate <= 0.0 {
        return 0.0;
    }

    SCORE_SCALE * incremental_decay(outcome.time_spent) * outcome.success_rate
}

fn require_full_pass(outcome: &SubmissionOutcome) -> Validity {
    if !outcome.is_full_pass() {
        return Validity::rejected("Submission must pass all test cases for this game mode.");
    }

    Validity::ok()
}

fn validate_hardcore(outcome: &SubmissionOutcome) -> Validity {
    if outcome.attempts() > 1 {
        return Validity::rejected("Hardcore mode allows only one attempt. This submission has multiple attempts.");
    }

    require_full_pass(outcome)
}

fn validate_incremental(outcome: &SubmissionOutcome) -> Validity {
    if outcome.success_rate <= 0.0 {
        return Validity::rejected("Incremental mode requires at least partial success.");
    }

    Validity::ok()
}
