use crate::database::db_structs::Submission;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The raw performance data of one submission, as seen by the scoring strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub success_rate: f64,
    /// Seconds since the game started
    pub time_spent: f64,
    pub code_length: Option<u32>,
    pub attempts: Option<u32>
}

impl SubmissionOutcome {
    pub fn new(success_rate: f64, time_spent: f64) -> Self {
        SubmissionOutcome {
            success_rate,
            time_spent,
            code_length: None,
            attempts: None
        }
    }

    pub fn with_code_length(mut self, code_length: u32) -> Self {
        self.code_length = Some(code_length);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Builds the outcome of a stored submission relative to the game's start.
    /// Code length is counted in characters, not bytes.
    pub fn from_submission(submission: &Submission, game_start: DateTime<Utc>) -> Self {
        let time_spent = (submission.created_at - game_start).num_milliseconds() as f64 / 1000.0;

        SubmissionOutcome {
            success_rate: submission.success_rate,
            time_spent,
            code_length: Some(submission.code.chars().count() as u32),
            attempts: submission.attempts
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.unwrap_or(1)
    }

    pub fn is_full_pass(&self) -> bool {
        self.success_rate >= 1.0
    }
}
