use clap::Parser;
use leaderboard_processor::{
    args::Args,
    database::{db::DbClient, store::Store},
    model::{
        glicko::Glicko2Params,
        leaderboard::{LeaderboardService, ProcessorConfig, RecalculationSummary},
        structures::game_mode::GameMode
    }
};
use std::{process::ExitCode, sync::Arc, time::Duration};
use strum::IntoEnumIterator;
use tracing::{error, info, warn};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before parsing so env fallbacks see it
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_tracing(&args.log_level);

    let client = match DbClient::connect(&args.connection_string).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to connect to the database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.init_schema {
        if let Err(e) = client.init_schema().await {
            error!("Failed to initialize the schema: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let config = ProcessorConfig {
        lease_ttl: chrono::Duration::seconds(args.lease_ttl_secs),
        rating: Glicko2Params::default()
    };
    let service = LeaderboardService::new(Arc::new(client), config);
    let modes = match args.mode {
        Some(mode) => vec![mode],
        None => GameMode::iter().collect()
    };

    if args.once {
        let summary = service.recalculate_modes(&modes).await;
        log_summary(&summary);

        return if summary.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    run_scheduler(&service, &modes, Duration::from_secs(args.interval_secs.max(1))).await;
    ExitCode::SUCCESS
}

/// Recalculates every `period` until Ctrl-C. A pass interrupted by shutdown resumes
/// from its last committed game on the next start.
async fn run_scheduler<S: Store>(service: &LeaderboardService<S>, modes: &[GameMode], period: Duration) {
    info!("Recalculating leaderboards every {} seconds", period.as_secs());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {}
        }

        tokio::select! {
            _ = &mut shutdown => {
                warn!("Shutdown requested during a recalculation, stopping after the last committed game");
                break;
            }
            summary = service.recalculate_modes(modes) => log_summary(&summary)
        }
    }

    info!("Leaderboard processor stopped");
}

fn log_summary(summary: &RecalculationSummary) {
    match serde_json::to_string(summary) {
        Ok(json) => info!("Recalculation summary: {}", json),
        Err(e) => warn!("Failed to serialize the recalculation summary: {}", e)
    }
}

fn init_tracing(log_level: &str) {
    let indicatif_layer = IndicatifLayer::new();
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}
