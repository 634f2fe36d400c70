//! LedgerLens - Multi-chain Portfolio Valuation Service
//! Mission: Value every account's on-chain holdings in fiat, one batch at a time

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledgerlens_backend::{
    api::create_router,
    auth::JwtHandler,
    config::EngineConfig,
    portfolio::PortfolioAggregator,
    store::{SqliteAccountStore, SqlitePhraseStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = EngineConfig::from_env();
    info!(
        chains = ?config.enabled_chains,
        query_concurrency = config.query_concurrency,
        account_concurrency = config.account_concurrency,
        "🚀 LedgerLens portfolio engine starting"
    );

    let http_client = reqwest::Client::builder()
        .timeout(config.balance_timeout.max(config.oracle_timeout))
        .build()
        .context("Failed to build HTTP client")?;

    let accounts = Arc::new(SqliteAccountStore::new(&config.accounts_db_path)?);
    let phrases = Arc::new(SqlitePhraseStore::new(&config.accounts_db_path)?);
    info!("🗄️  Account store opened at: {}", config.accounts_db_path);

    let engine = Arc::new(PortfolioAggregator::from_config(
        &config,
        http_client,
        accounts,
        phrases,
    ));
    let jwt_handler = Arc::new(JwtHandler::new(config.jwt_secret.clone()));

    let app = create_router(engine, jwt_handler)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Initialize tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerlens_backend=debug,ledgerlens=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate's own .env when launched from elsewhere
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
