use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use leaderboard_processor::database::{
    db::DbClient,
    db_structs::{Game, Submission}
};
use std::sync::Arc;
use testcontainers::{clients::Cli, Container};
use testcontainers_modules::postgres::Postgres;
use tokio_postgres::{Client, NoTls};

pub struct TestDatabase {
    pub connection_string: String,
    _container: Container<'static, Postgres>
}

impl TestDatabase {
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Create a static CLI instance
        lazy_static! {
            static ref DOCKER: Arc<Cli> = Arc::new(Cli::default());
        }

        // Start PostgreSQL container
        let container = DOCKER.run(Postgres::default());
        let port = container.get_host_port_ipv4(5432);

        let connection_string = format!(
            "host=localhost port={} user=postgres password=postgres dbname=postgres",
            port
        );

        // The processor creates its own tables
        DbClient::connect(&connection_string).await?.init_schema().await?;

        Ok(TestDatabase {
            connection_string,
            _container: container
        })
    }

    pub async fn get_client(&self) -> Result<Client, Box<dyn std::error::Error>> {
        let (client, connection) = tokio_postgres::connect(&self.connection_string, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                eprintln!("Database connection error: {}", e);
            }
        });

        Ok(client)
    }

    /// Writes a game and its submissions the way the game service would.
    pub async fn seed_game(&self, game: &Game, submissions: &[Submission]) -> Result<(), Box<dyn std::error::Error>> {
        let client = self.get_client().await?;

        client
            .execute(
                "INSERT INTO games (id, mode, created_at, status, players, player_submissions) \
                VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &game.id,
                    &game.mode.as_str(),
                    &game.created_at,
                    &game.status,
                    &game.players,
                    &game.player_submissions
                ]
            )
            .await?;

        for s in submissions {
            client
                .execute(
                    "INSERT INTO submissions (id, user_id, code, created_at, success_rate, attempts) \
                    VALUES ($1, $2, $3, $4, $5, $6)",
                    &[
                        &s.id,
                        &s.user,
                        &s.code,
                        &s.created_at,
                        &s.success_rate,
                        &s.attempts.map(|a| a as i32)
                    ]
                )
                .await?;
        }

        Ok(())
    }

    pub async fn seed_user(&self, id: &str, username: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.get_client()
            .await?
            .execute("INSERT INTO users (id, username) VALUES ($1, $2)", &[&id, &username])
            .await?;

        Ok(())
    }

    pub async fn watermark_row(&self, mode: &str) -> Result<Option<DateTime<Utc>>, Box<dyn std::error::Error>> {
        let row = self
            .get_client()
            .await?
            .query_opt("SELECT last_game_date FROM leaderboard_watermarks WHERE mode = $1", &[&mode])
            .await?;

        Ok(row.map(|r| r.get(0)))
    }
}
