//! Focal API server.
//!
//! Serves the Mini App HTTP API backed by PostgreSQL, with the assistant
//! gateway wired in.

use anyhow::Result;
use clap::Parser;
use focal::api::{run_server, ApiState};
use focal::assistant::LlmClient;
use focal::config::AppConfig;
use focal::storage::pg::{create_pool, init_schema};
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "focal-server")]
#[command(about = "Focal HTTP API server for the Telegram Mini App")]
struct Args {
    /// Server port
    #[arg(short, long, default_value = "8080", env = "HTTP_PORT")]
    port: u16,

    /// Server host
    #[arg(long, default_value = "0.0.0.0", env = "HTTP_HOST")]
    host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("focal=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let mut config = AppConfig::from_env();
    config.http.host = args.host;
    config.http.port = args.port;
    config.validate()?;

    info!("Starting focal server");
    info!("  Database: {}", config.pg.dbname);
    info!("  Assistant model: {}", config.assistant.model);
    info!("  Listening on: {}:{}", config.http.host, config.http.port);

    let pool = create_pool(&config.pg)?;
    init_schema(&pool).await?;
    info!("Database schema ready");

    let llm = LlmClient::new(config.assistant.clone())?;

    let host = config.http.host.clone();
    let port = config.http.port;
    let state = Arc::new(ApiState::new(pool, llm, config));

    // Serves until the process is terminated
    run_server(state, &host, port).await
}
