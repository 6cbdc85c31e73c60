use approx::assert_abs_diff_eq;
use chrono::{DateTime, Duration, TimeZone, Utc};
use leaderboard_processor::{
    database::{
        db_structs::{Game, Submission, User, Watermark},
        memory::InMemoryStore,
        store::Store
    },
    model::{
        glicko::Glicko2,
        leaderboard::{LeaderboardService, ProcessorConfig},
        structures::{game_mode::GameMode, game_outcome::GameOutcome}
    },
    utils::test_utils::{generate_game, generate_games, generate_played_game, generate_submission, generate_user_metrics}
};
use std::sync::Arc;

use crate::common::init_test_env;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap()
}

pub async fn seed(store: &InMemoryStore, game: Game, submissions: Vec<Submission>) {
    for submission in submissions {
        store.insert_submission(submission).await;
    }
    store.insert_game(game).await;
}

pub async fn seed_users(store: &InMemoryStore, ids: &[&str]) {
    for id in ids {
        store
            .insert_user(User {
                id: id.to_string(),
                username: format!("{}-name", id)
            })
            .await;
    }
}

fn service(store: &Arc<InMemoryStore>) -> LeaderboardService<InMemoryStore> {
    LeaderboardService::new(store.clone(), ProcessorConfig::default())
}

#[tokio::test]
async fn test_three_player_fastest_game() {
    init_test_env();
    let store = Arc::new(InMemoryStore::new());
    let (game, submissions) =
        generate_played_game("g1", GameMode::Fastest, start(), &[("p3", 30.0), ("p1", 10.0), ("p2", 20.0)]);
    seed(&store, game, submissions).await;
    seed_users(&store, &["p1", "p2", "p3"]).await;

    let summary = service(&store).recalculate_all_leaderboards().await;

    assert!(summary.is_success());
    assert_eq!(summary.total_processed, 1);
    assert_eq!(summary.processed_games[&GameMode::Fastest], 1);

    let p1 = store.user_metrics("p1").await.unwrap().unwrap();
    let p2 = store.user_metrics("p2").await.unwrap().unwrap();
    let p3 = store.user_metrics("p3").await.unwrap().unwrap();
    let (m1, m2, m3) = (
        p1.mode(GameMode::Fastest).unwrap(),
        p2.mode(GameMode::Fastest).unwrap(),
        p3.mode(GameMode::Fastest).unwrap()
    );

    assert_eq!((m1.games_played, m2.games_played, m3.games_played), (1, 1, 1));
    assert_eq!((m1.games_won, m2.games_won, m3.games_won), (1, 0, 0));
    assert_eq!((p1.total_games_won, p2.total_games_won), (1, 0));
    assert!(m1.glicko_rating.rating > 1500.0);
    assert!(m3.glicko_rating.rating < 1500.0);
    assert!(m1.glicko_rating.rd < 350.0);
    assert_eq!((m1.rank, m2.rank, m3.rank), (Some(1), Some(2), Some(3)));
    assert_abs_diff_eq!(m1.best_score, 100_000.0, epsilon = 1e-6);
    assert_eq!(m1.last_game_date, Some(start()));
    assert_eq!(p1.last_processed_game_date, start());
}

#[tokio::test]
async fn test_opponents_rated_with_pre_game_ratings() {
    init_test_env();
    let store = Arc::new(InMemoryStore::new());
    let (game, submissions) =
        generate_played_game("g1", GameMode::Shortest, start(), &[("p1", 10.0), ("p2", 20.0), ("p3", 30.0)]);
    let created_at = game.created_at;
    seed(&store, game, submissions.clone()).await;

    service(&store).process_games_for_mode(GameMode::Shortest).await.unwrap();

    // Shortest ranks by code length, so recover the placement from the stored wins
    let engine = Glicko2::default();
    let initial = engine.default_rating(created_at);
    for user in ["p1", "p2", "p3"] {
        let metrics = store.user_metrics(user).await.unwrap().unwrap();
        let stored = metrics.mode(GameMode::Shortest).unwrap();
        let rank = stored.rank.unwrap();

        let outcomes = (1..=3u32)
            .filter(|other| *other != rank)
            .map(|other| GameOutcome::from_ranks(rank, other, initial.rating, initial.rd))
            .collect::<Vec<_>>();
        let expected = engine.update_rating(&initial, &outcomes, created_at).unwrap();

        assert_abs_diff_eq!(stored.glicko_rating.rating, expected.rating, epsilon = 1e-9);
        assert_abs_diff_eq!(stored.glicko_rating.rd, expected.rd, epsilon = 1e-9);
    }
}

#[tokio::test]
async fn test_single_submission_game_changes_nothing() {
    init_test_env();
    let store = Arc::new(InMemoryStore::new());
    let (game, submissions) = generate_played_game("solo", GameMode::Fastest, start(), &[("p1", 10.0)]);
    seed(&store, game.clone(), submissions).await;

    let processed = service(&store).process_games_for_mode(GameMode::Fastest).await.unwrap();

    assert_eq!(processed, 0);
    assert_eq!(store.metrics_count().await, 0);
    // The skipped game is still behind the watermark
    assert_eq!(
        store.watermark(GameMode::Fastest).await.unwrap(),
        Some(Watermark::after_game(&game))
    );
}

#[tokio::test]
async fn test_reprocessing_does_not_double_count() {
    init_test_env();
    let store = Arc::new(InMemoryStore::new());
    let (game, submissions) =
        generate_played_game("g1", GameMode::Debug, start(), &[("p1", 10.0), ("p2", 20.0)]);
    seed(&store, game.clone(), submissions).await;
    let service = service(&store);

    assert_eq!(service.process_games_for_mode(GameMode::Debug).await.unwrap(), 1);
    let before = store.user_metrics("p1").await.unwrap().unwrap();

    // A second pass finds nothing new
    assert_eq!(service.process_games_for_mode(GameMode::Debug).await.unwrap(), 0);

    // Forcing the same game through again is caught by the per-player guard
    assert!(!service.process_game(GameMode::Debug, &game).await.unwrap());

    let after = store.user_metrics("p1").await.unwrap().unwrap();
    assert_eq!(after.total_games_played, 1);
    assert_eq!(
        after.mode(GameMode::Debug).unwrap().glicko_rating,
        before.mode(GameMode::Debug).unwrap().glicko_rating
    );
}

#[tokio::test]
async fn test_games_sharing_a_timestamp_all_count() {
    init_test_env();
    let store = Arc::new(InMemoryStore::new());
    let (first, first_submissions) =
        generate_played_game("g1", GameMode::Fastest, start(), &[("p1", 10.0), ("p2", 20.0)]);
    let (second, second_submissions) =
        generate_played_game("g2", GameMode::Fastest, start(), &[("p1", 15.0), ("p3", 25.0)]);
    seed(&store, first, first_submissions).await;
    seed(&store, second.clone(), second_submissions).await;

    let service = service(&store);
    assert_eq!(service.process_games_for_mode(GameMode::Fastest).await.unwrap(), 2);

    let p1 = store.user_metrics("p1").await.unwrap().unwrap();
    let m1 = p1.mode(GameMode::Fastest).unwrap();
    assert_eq!((m1.games_played, m1.games_won), (2, 2));
    assert_eq!(p1.total_games_played, 2);
    assert_eq!(m1.last_game_id.as_deref(), Some("g2"));

    let p3 = store.user_metrics("p3").await.unwrap().unwrap();
    assert_eq!(p3.mode(GameMode::Fastest).unwrap().games_played, 1);

    // Replaying the later game is still recognized as applied
    assert!(!service.process_game(GameMode::Fastest, &second).await.unwrap());
}

#[tokio::test]
async fn test_watermark_falls_back_to_earliest_last_game_date() {
    init_test_env();
    let store = Arc::new(InMemoryStore::new());
    let t = start();
    store
        .insert_user_metrics(generate_user_metrics("p1", GameMode::Fastest, 1600.0, t))
        .await;
    store
        .insert_user_metrics(generate_user_metrics("p2", GameMode::Fastest, 1400.0, t + Duration::hours(3)))
        .await;

    // Already reflected in p1's metrics, must not be fetched
    let (old, old_submissions) =
        generate_played_game("old", GameMode::Fastest, t - Duration::hours(1), &[("p1", 5.0), ("p2", 6.0)]);
    // After p1's last game but before p2's: only p1 takes it
    let (mid, mid_submissions) =
        generate_played_game("mid", GameMode::Fastest, t + Duration::hours(1), &[("p1", 5.0), ("p2", 6.0)]);
    let (new, new_submissions) =
        generate_played_game("new", GameMode::Fastest, t + Duration::hours(5), &[("p1", 5.0), ("p2", 6.0)]);
    seed(&store, old, old_submissions).await;
    seed(&store, mid, mid_submissions).await;
    seed(&store, new.clone(), new_submissions).await;

    assert_eq!(service(&store).process_games_for_mode(GameMode::Fastest).await.unwrap(), 2);

    let p1 = store.user_metrics("p1").await.unwrap().unwrap();
    let p2 = store.user_metrics("p2").await.unwrap().unwrap();
    assert_eq!(p1.mode(GameMode::Fastest).unwrap().games_played, 3);
    assert_eq!(p2.mode(GameMode::Fastest).unwrap().games_played, 2);
    assert_eq!(
        store.watermark(GameMode::Fastest).await.unwrap(),
        Some(Watermark::after_game(&new))
    );
}

#[tokio::test]
async fn test_held_lease_aborts_before_any_write() {
    init_test_env();
    let store = Arc::new(InMemoryStore::new());
    let (game, submissions) =
        generate_played_game("g1", GameMode::Efficiency, start(), &[("p1", 10.0), ("p2", 20.0)]);
    seed(&store, game, submissions).await;

    let other = uuid::Uuid::new_v4();
    assert!(store
        .try_acquire_lease(GameMode::Efficiency, other, Duration::minutes(10))
        .await
        .unwrap());

    let service = service(&store);
    let result = service.process_games_for_mode(GameMode::Efficiency).await;

    assert!(matches!(
        result,
        Err(leaderboard_processor::model::leaderboard::ProcessingError::ConcurrentRecalculation(GameMode::Efficiency))
    ));
    assert_eq!(store.metrics_count().await, 0);

    // Other modes are not blocked
    assert_eq!(service.process_games_for_mode(GameMode::Fastest).await.unwrap(), 0);

    store.release_lease(GameMode::Efficiency, other).await.unwrap();
    assert_eq!(service.process_games_for_mode(GameMode::Efficiency).await.unwrap(), 1);
}

#[tokio::test]
async fn test_modes_are_processed_independently() {
    init_test_env();
    let store = Arc::new(InMemoryStore::new());
    for (game, submissions) in generate_games(4, GameMode::Fastest, &["a", "b", "c"], start(), 11) {
        seed(&store, game, submissions).await;
    }
    for (game, submissions) in generate_games(2, GameMode::Typeracer, &["a", "d"], start(), 12) {
        seed(&store, game, submissions).await;
    }

    let summary = service(&store).recalculate_all_leaderboards().await;

    assert_eq!(summary.processed_games[&GameMode::Fastest], 4);
    assert_eq!(summary.processed_games[&GameMode::Typeracer], 2);
    assert_eq!(summary.processed_games[&GameMode::Hardcore], 0);
    assert_eq!(summary.total_processed, 6);

    // Totals accumulate across modes
    let a = store.user_metrics("a").await.unwrap().unwrap();
    assert_eq!(a.total_games_played, 6);
    assert_eq!(a.mode(GameMode::Fastest).unwrap().games_played, 4);
    assert_eq!(a.mode(GameMode::Typeracer).unwrap().games_played, 2);
}

#[tokio::test]
async fn test_duplicate_submissions_count_once() {
    init_test_env();
    let store = Arc::new(InMemoryStore::new());
    let game = generate_game("g1", GameMode::Fastest, start(), &["s1", "s2", "s3"]);
    let submissions = vec![
        generate_submission("s1", "p1", &game, 40.0, 1.0),
        generate_submission("s2", "p2", &game, 20.0, 1.0),
        generate_submission("s3", "p1", &game, 10.0, 1.0),
    ];
    seed(&store, game, submissions).await;

    service(&store).process_games_for_mode(GameMode::Fastest).await.unwrap();

    let p1 = store.user_metrics("p1").await.unwrap().unwrap();
    let m1 = p1.mode(GameMode::Fastest).unwrap();
    assert_eq!(m1.games_played, 1);
    assert_eq!(m1.games_won, 1);
}

#[tokio::test]
async fn test_unresolved_random_games_score_by_speed() {
    init_test_env();
    let store = Arc::new(InMemoryStore::new());
    let (game, submissions) =
        generate_played_game("r1", GameMode::Random, start(), &[("slow", 50.0), ("quick", 5.0)]);
    seed(&store, game, submissions).await;

    let summary = service(&store).recalculate_all_leaderboards().await;

    assert_eq!(summary.processed_games[&GameMode::Random], 1);
    let quick = store.user_metrics("quick").await.unwrap().unwrap();
    assert_eq!(quick.mode(GameMode::Random).unwrap().games_won, 1);
}
