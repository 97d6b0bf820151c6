//! candlecast server - headless signal daemon
//!
//! Streams candles for every watched market, trains the predictor by
//! replaying history, and pushes signals to the configured chats. Metrics are
//! pushed via structured JSON logs to stdout.
//!
//! # Usage
//! ```sh
//! cargo run --bin server
//! cargo run --bin server -- analyze BTC USDT 4h
//! ```
//!
//! Configuration is read from the environment (and `.env`), see `config`.

use anyhow::Result;
use candlecast::application::system::Application;
use candlecast::config::Config;
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Crypto candle signal service", long_about = None)]
struct Cli {
    /// Overrides DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default)
    Run,
    /// Print a one-off analysis report and exit
    Analyze {
        symbol: String,
        pair: String,
        #[arg(default_value = "1h")]
        timeframe: String,
        /// Chat whose display preferences apply
        #[arg(long, default_value_t = 0)]
        chat_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Analyze {
            symbol,
            pair,
            timeframe,
            chat_id,
        } => {
            let app = Application::build(config).await?;
            let report = app
                .services
                .commands
                .analyze(chat_id, &symbol, &pair, &timeframe)
                .await?;
            println!("{}", report);
            Ok(())
        }
    }
}

async fn run(config: Config) -> Result<()> {
    info!("candlecast server {} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: db={}, window={}, bootstrap={:?}",
        config.database_url,
        config.model.window_size,
        config
            .model
            .bootstrap_pairs
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
    );

    let app = Application::build(config).await?;
    let handle = app.start().await?;
    info!("Server running. Press Ctrl+C to shutdown.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");
    handle.shutdown().await;
    Ok(())
}
