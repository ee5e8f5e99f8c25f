use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sweepstake_draw::api::{router, ApiState};
use sweepstake_draw::config::Config;
use sweepstake_draw::db::{self, SqliteStore};
use sweepstake_draw::error::Result;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path, cfg.db_max_connections).await?;
    info!(
        "Database ready at {} (max_connections={})",
        cfg.db_path, cfg.db_max_connections
    );

    // --- HTTP API server ---
    let app = router(ApiState::new(SqliteStore::new(pool)));
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
