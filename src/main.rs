use std::path::Path;
use std::sync::Arc;

use retrace::config::Config;
use retrace::services::TaskStore;
use retrace::sources::TushareClient;
use retrace::AppState;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "retrace=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!("Starting Retrace server on {}:{}", config.host, config.port);

    if let Some(dir) = Path::new(&config.database_path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let store = Arc::new(TaskStore::new(&config.database_path)?);
    info!("Task store opened at {}", config.database_path);

    // Scan loops do not survive a restart
    store.fail_interrupted_jobs()?;

    let provider = Arc::new(TushareClient::new(&config.provider));
    if !provider.has_token() {
        warn!("TUSHARE_TOKEN is not set; screening requests will fail until it is configured");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let app = retrace::app(AppState::new(config, provider, store));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Retrace server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
