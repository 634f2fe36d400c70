//! Portfolio Report Tool
//!
//! Values accounts straight from the account database, without the HTTP server.
//!
//! Usage:
//!   cargo run --release --bin portfolio_report -- --db ./portfolio_accounts.db account --account-id <UUID>
//!   cargo run --release --bin portfolio_report -- --db ./portfolio_accounts.db all --requesting-id <OPERATOR_UUID>
//!   cargo run --release --bin portfolio_report -- --db ./portfolio_accounts.db total --requesting-id <OPERATOR_UUID>

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use ledgerlens_backend::{
    auth::JwtHandler,
    config::EngineConfig,
    models::PortfolioResult,
    portfolio::PortfolioAggregator,
    store::{AccountStore, SqliteAccountStore, SqlitePhraseStore},
};

/// Multi-chain portfolio valuation from the command line
#[derive(Parser, Debug)]
#[command(name = "portfolio_report")]
#[command(about = "Value accounts' on-chain holdings in fiat")]
struct Cli {
    /// Path to the accounts database (overrides ACCOUNTS_DB_PATH)
    #[arg(long, env = "ACCOUNTS_DB_PATH")]
    db: Option<String>,

    /// Emit JSON instead of a table
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Value a single account
    Account {
        #[arg(long)]
        account_id: Uuid,
    },

    /// Value every account with an address (operator only)
    All {
        #[arg(long)]
        requesting_id: Uuid,
    },

    /// Platform-wide total value (operator only)
    Total {
        #[arg(long)]
        requesting_id: Uuid,
    },

    /// Print a bearer token for an account, for calling the HTTP API
    Token {
        #[arg(long)]
        account_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerlens_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env();
    if let Some(db) = cli.db {
        config.accounts_db_path = db;
    }

    let accounts = Arc::new(SqliteAccountStore::new(&config.accounts_db_path)?);
    let phrases = Arc::new(SqlitePhraseStore::new(&config.accounts_db_path)?);

    let http_client = reqwest::Client::builder()
        .timeout(config.balance_timeout.max(config.oracle_timeout))
        .build()
        .context("Failed to build HTTP client")?;

    let engine = PortfolioAggregator::from_config(&config, http_client, accounts.clone(), phrases);

    match cli.command {
        Commands::Account { account_id } => {
            let portfolio = engine.value_account(&account_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&portfolio)?);
            } else {
                print_portfolio(&account_id.to_string(), &portfolio);
            }
        }
        Commands::All { requesting_id } => {
            let portfolios = engine.value_all(&requesting_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&portfolios)?);
            } else {
                for entry in &portfolios {
                    print_portfolio(&entry.username, &entry.portfolio);
                }
            }
        }
        Commands::Total { requesting_id } => {
            let summary = engine.total_value(&requesting_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "{} accounts, total value {}",
                    summary.account_count,
                    summary.total_portfolio_value.round_dp(2)
                );
            }
        }
        Commands::Token { account_id } => {
            let account = accounts
                .find_by_id(&account_id)
                .await?
                .with_context(|| format!("account {account_id} not found"))?;
            let (token, expires_in) = JwtHandler::new(config.jwt_secret.clone()).generate_token(&account)?;
            println!("{token}");
            eprintln!("expires in {expires_in}s");
        }
    }

    Ok(())
}

fn print_portfolio(label: &str, portfolio: &PortfolioResult) {
    println!("=== {label} ===");
    if portfolio.is_empty() {
        println!("  (no holdings)");
    }
    for asset in &portfolio.assets {
        println!(
            "  {:<8} {:<10} {:>20} {:>14}",
            asset.symbol,
            asset.chain,
            asset.display_quantity(),
            asset.value.round_dp(2)
        );
    }
    println!("  total: {}", portfolio.total_value.round_dp(2));
}
