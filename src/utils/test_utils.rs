use crate::{
    database::db_structs::{Game, GlickoRating, ModeMetrics, Submission, UserMetrics, COMPLETED_STATUS},
    model::{
        glicko::Glicko2,
        structures::{game_mode::GameMode, game_outcome::GameOutcome}
    }
};
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A completed game referencing `submission_ids`. Players are filled in by
/// [`generate_played_game`]; here they are left empty.
pub fn generate_game(id: &str, mode: GameMode, created_at: DateTime<Utc>, submission_ids: &[&str]) -> Game {
    Game {
        id: id.to_string(),
        mode,
        created_at,
        status: COMPLETED_STATUS.to_string(),
        players: Vec::new(),
        player_submissions: submission_ids.iter().map(|s| s.to_string()).collect()
    }
}

/// A submission made `seconds_after_start` seconds into `game`.
/// The code is filler of a reproducible length between 20 and 200 characters.
pub fn generate_submission(
    id: &str,
    user: &str,
    game: &Game,
    seconds_after_start: f64,
    success_rate: f64
) -> Submission {
    // Initialize seeded RNG for reproducible results
    let mut rng = ChaCha8Rng::seed_from_u64(id.bytes().map(u64::from).sum());
    let length = rng.random_range(20..=200);

    Submission {
        id: id.to_string(),
        user: user.to_string(),
        code: "x".repeat(length),
        created_at: game.created_at + Duration::milliseconds((seconds_after_start * 1000.0) as i64),
        success_rate,
        attempts: None
    }
}

/// A game with one full-pass submission per `(user, seconds)` pair.
/// Submission ids are `{game id}-{user}`.
pub fn generate_played_game(
    id: &str,
    mode: GameMode,
    created_at: DateTime<Utc>,
    results: &[(&str, f64)]
) -> (Game, Vec<Submission>) {
    let submission_ids = results
        .iter()
        .map(|(user, _)| format!("{}-{}", id, user))
        .collect::<Vec<_>>();
    let id_refs = submission_ids.iter().map(String::as_str).collect::<Vec<_>>();

    let mut game = generate_game(id, mode, created_at, &id_refs);
    game.players = results.iter().map(|(user, _)| user.to_string()).collect();

    let submissions = results
        .iter()
        .zip(&submission_ids)
        .map(|((user, seconds), submission_id)| generate_submission(submission_id, user, &game, *seconds, 1.0))
        .collect();

    (game, submissions)
}

/// `n` games among `players`, one hour apart from `start`, with random finishing times.
/// Game ids are `{mode}-{i}`.
pub fn generate_games(
    n: usize,
    mode: GameMode,
    players: &[&str],
    start: DateTime<Utc>,
    seed: u64
) -> Vec<(Game, Vec<Submission>)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (0..n)
        .map(|i| {
            let results = players
                .iter()
                .map(|p| (*p, rng.random_range(5.0..600.0)))
                .collect::<Vec<_>>();

            generate_played_game(&format!("{}-{}", mode, i), mode, start + Duration::hours(i as i64), &results)
        })
        .collect()
}

/// Metrics of a user who has played one game of `mode` and holds `rating`.
pub fn generate_user_metrics(user_id: &str, mode: GameMode, rating: f64, now: DateTime<Utc>) -> UserMetrics {
    let mut metrics = UserMetrics::new(user_id, now);
    let mut mode_metrics = ModeMetrics::new(GlickoRating {
        rating,
        ..Glicko2::default().default_rating(now)
    });
    mode_metrics.record_game(rating, false);
    mode_metrics.last_game_date = Some(now);

    metrics.total_games_played = 1;
    metrics.last_processed_game_date = now;
    metrics.mode_metrics.insert(mode, mode_metrics);

    metrics
}

/// `n` reproducible outcomes against opponents rated 1000-2000.
pub fn generate_outcomes(n: usize, seed: u64) -> Vec<GameOutcome> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (0..n)
        .map(|_| {
            GameOutcome::new(
                rng.random_range(1000.0..2000.0),
                rng.random_range(30.0..350.0),
                if rng.random_bool(0.5) { 1.0 } else { 0.0 }
            )
        })
        .collect()
}
