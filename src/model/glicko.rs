use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    database::db_structs::GlickoRating,
    model::{
        constants::{
            CONVERGENCE_TOLERANCE, DEFAULT_RATING, DEFAULT_RD, DEFAULT_VOLATILITY, GLICKO_SCALE, MAX_RD,
            MAX_SOLVER_ITERATIONS, RD_GROWTH_PER_DAY, TAU
        },
        decay,
        structures::game_outcome::GameOutcome
    }
};

#[derive(Debug, Error, PartialEq)]
pub enum RatingError {
    #[error("Invalid outcome at index {index}: {reason}")]
    InvalidOutcome { index: usize, reason: String },

    #[error("Invalid rating state: {0}")]
    InvalidRating(String),

    #[error("Volatility solver did not converge within {iterations} iterations")]
    SolverNonConvergence { iterations: u32 }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glicko2Params {
    pub default_rating: f64,
    pub default_rd: f64,
    pub default_volatility: f64,
    pub max_rd: f64,
    /// Volatility constraint
    pub tau: f64,
    pub epsilon: f64,
    pub max_iterations: u32,
    pub rd_growth_per_day: f64
}

impl Default for Glicko2Params {
    fn default() -> Self {
        Glicko2Params {
            default_rating: DEFAULT_RATING,
            default_rd: DEFAULT_RD,
            default_volatility: DEFAULT_VOLATILITY,
            max_rd: MAX_RD,
            tau: TAU,
            epsilon: CONVERGENCE_TOLERANCE,
            max_iterations: MAX_SOLVER_ITERATIONS,
            rd_growth_per_day: RD_GROWTH_PER_DAY
        }
    }
}

/// # Glicko-2 rating engine
///
/// Stateless: ratings are passed in and returned, nothing is stored here.
///
/// One call to [`Glicko2::update_rating`] is one rating period. A multi-player game is
/// fed in as one outcome per opponent, all in the same call; splitting them into
/// sequential single-outcome calls gives different (wrong) results.
///
/// Reference: http://www.glicko.net/glicko/glicko2.pdf
#[derive(Debug, Clone, Copy, Default)]
pub struct Glicko2 {
    pub params: Glicko2Params
}

impl Glicko2 {
    pub fn new(params: Glicko2Params) -> Self {
        Glicko2 { params }
    }

    pub fn default_rating(&self, now: DateTime<Utc>) -> GlickoRating {
        GlickoRating {
            rating: self.params.default_rating,
            rd: self.params.default_rd,
            volatility: self.params.default_volatility,
            last_updated: now
        }
    }

    /// Computes the rating after one rating period containing `outcomes`.
    ///
    /// With no outcomes only the deviation changes (see [`Glicko2::decay_rating`]).
    pub fn update_rating(
        &self,
        current: &GlickoRating,
        outcomes: &[GameOutcome],
        now: DateTime<Utc>
    ) -> Result<GlickoRating, RatingError> {
        validate_rating(current)?;

        if outcomes.is_empty() {
            return Ok(self.decay_rating(current, now));
        }

        for (index, outcome) in outcomes.iter().enumerate() {
            validate_outcome(index, outcome)?;
        }

        // Step 2: convert to the Glicko-2 scale
        let mu = to_glicko2_scale(current.rating);
        let phi = current.rd / GLICKO_SCALE;
        let sigma = current.volatility;

        // Steps 3 & 4: estimated variance and improvement
        let mut v_inv = 0.0;
        let mut improvement_sum = 0.0;
        for outcome in outcomes {
            let mu_j = to_glicko2_scale(outcome.opponent_rating);
            let phi_j = outcome.opponent_rd / GLICKO_SCALE;
            let g_j = g(phi_j);
            let e_j = expected_score(mu, mu_j, phi_j);

            v_inv += g_j * g_j * e_j * (1.0 - e_j);
            improvement_sum += g_j * (outcome.score - e_j);
        }

        if !(v_inv > 0.0) || !v_inv.is_finite() {
            return Err(RatingError::InvalidRating(format!(
                "outcomes carry no information (variance sum {})",
                v_inv
            )));
        }

        let v = 1.0 / v_inv;
        let delta = v * improvement_sum;

        // Step 5: volatility
        let new_sigma = self.solve_volatility(sigma, phi, v, delta)?;

        // Steps 6 & 7: new deviation and rating
        let phi_star = (phi * phi + new_sigma * new_sigma).sqrt();
        let new_phi = 1.0 / (1.0 / (phi_star * phi_star) + 1.0 / v).sqrt();
        let new_mu = mu + new_phi * new_phi * improvement_sum;

        // Step 8: back to the Glicko scale
        Ok(GlickoRating {
            rating: from_glicko2_scale(new_mu),
            rd: (new_phi * GLICKO_SCALE).min(self.params.max_rd),
            volatility: new_sigma,
            last_updated: now
        })
    }

    /// Deviation growth for a period without games. The rating itself is unchanged.
    pub fn decay_rating(&self, current: &GlickoRating, now: DateTime<Utc>) -> GlickoRating {
        GlickoRating {
            rd: decay::inflate_rd(
                current.rd,
                decay::idle_days(current.last_updated, now),
                self.params.rd_growth_per_day,
                self.params.max_rd
            ),
            last_updated: now,
            ..*current
        }
    }

    /// Probability that `player` beats `opponent`.
    pub fn expected_win_probability(&self, player: &GlickoRating, opponent: &GlickoRating) -> f64 {
        expected_score(
            to_glicko2_scale(player.rating),
            to_glicko2_scale(opponent.rating),
            opponent.rd / GLICKO_SCALE
        )
    }

    /// Head-to-head convenience wrapper around [`Glicko2::update_rating`].
    pub fn update_rating_after_game(
        &self,
        player: &GlickoRating,
        opponent: &GlickoRating,
        player_won: bool,
        now: DateTime<Utc>
    ) -> Result<GlickoRating, RatingError> {
        let score = if player_won { 1.0 } else { 0.0 };
        let outcome = GameOutcome::new(opponent.rating, opponent.rd, score);

        self.update_rating(player, &[outcome], now)
    }

    /// Solves for the new volatility σ' with the Illinois variant of regula falsi.
    ///
    /// Both the bracketing search and the refinement loop count towards
    /// `max_iterations`; running out is reported instead of looping forever.
    fn solve_volatility(&self, sigma: f64, phi: f64, v: f64, delta: f64) -> Result<f64, RatingError> {
        let tau = self.params.tau;
        let a = (sigma * sigma).ln();
        let delta_sq = delta * delta;
        let phi_sq = phi * phi;

        let f = |x: f64| {
            let ex = x.exp();
            let denom = phi_sq + v + ex;
            (ex * (delta_sq - phi_sq - v - ex)) / (2.0 * denom * denom) - (x - a) / (tau * tau)
        };

        let mut iterations = 0;
        let mut big_a = a;
        let mut big_b = if delta_sq > phi_sq + v {
            (delta_sq - phi_sq - v).ln()
        } else {
            let mut k = 1.0;
            while f(a - k * tau) < 0.0 {
                iterations += 1;
                if iterations >= self.params.max_iterations {
                    return Err(RatingError::SolverNonConvergence { iterations });
                }
                k += 1.0;
            }
            a - k * tau
        };

        let mut f_a = f(big_a);
        let mut f_b = f(big_b);

        while (big_b - big_a).abs() > self.params.epsilon {
            iterations += 1;
            if iterations >= self.params.max_iterations {
                return Err(RatingError::SolverNonConvergence { iterations });
            }

            let big_c = big_a + (big_a - big_b) * f_a / (f_b - f_a);
            let f_c = f(big_c);

            if f_c * f_b <= 0.0 {
                big_a = big_b;
                f_a = f_b;
            } else {
                f_a /= 2.0;
            }

            big_b = big_c;
            f_b = f_c;
        }

        let new_sigma = (big_a / 2.0).exp();
        if !new_sigma.is_finite() {
            return Err(RatingError::SolverNonConvergence { iterations });
        }

        Ok(new_sigma)
    }
}

fn to_glicko2_scale(rating: f64) -> f64 {
    (rating - DEFAULT_RATING) / GLICKO_SCALE
}

fn from_glicko2_scale(mu: f64) -> f64 {
    mu * GLICKO_SCALE + DEFAULT_RATING
}

/// Impact of an opponent's uncertainty, φ on the Glicko-2 scale
fn g(phi: f64) -> f64 {
    1.0 / (1.0 + 3.0 * phi * phi / (PI * PI)).sqrt()
}

fn expected_score(mu: f64, mu_j: f64, phi_j: f64) -> f64 {
    1.0 / (1.0 + (-g(phi_j) * (mu - mu_j)).exp())
}

fn validate_rating(rating: &GlickoRating) -> Result<(), RatingError> {
    if !rating.rating.is_finite() {
        return Err(RatingError::InvalidRating(format!("rating {} is not finite", rating.rating)));
    }
    if !(rating.rd > 0.0 && rating.rd.is_finite()) {
        return Err(RatingError::InvalidRating(format!("rd {} must be positive", rating.rd)));
    }
    if !(rating.volatility > 0.0 && rating.volatility.is_finite()) {
        return Err(RatingError::InvalidRating(format!(
            "volatility {} must be positive",
            rating.volatility
        )));
    }

    Ok(())
}

fn validate_outcome(index: usize, outcome: &GameOutcome) -> Result<(), RatingError> {
    let reason = if !outcome.opponent_rating.is_finite() {
        Some(format!("opponent rating {} is not finite", outcome.opponent_rating))
    } else if !(outcome.opponent_rd > 0.0 && outcome.opponent_rd.is_finite()) {
        Some(format!("opponent rd {} must be positive", outcome.opponent_rd))
    } else if !(0.0..=1.0).contains(&outcome.score) {
        Some(format!("score {} must be within [0, 1]", outcome.score))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(RatingError::InvalidOutcome { index, reason }),
        None => Ok(())
    }
}
