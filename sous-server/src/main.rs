use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use sous_core::config::StorageBackend;
use sous_core::{MemoryStore, OpenAiClient, PgStore, SousConfig, Store};
use sous_server::http::{start_http_server, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "sous.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match SousConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging
    let default_level = config
        .service
        .log_level
        .parse()
        .unwrap_or(tracing::Level::INFO);
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .init();

    // Storage
    let store: Arc<dyn Store> = match config.database.backend {
        StorageBackend::Postgres => {
            let pool = match sous_core::db::create_pool(&config.database).await {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("Failed to connect to database: {}", e);
                    std::process::exit(1);
                }
            };
            sous_core::db::ensure_schema(&pool).await?;
            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    if args.health {
        match store.health().await {
            Ok(v) => println!("✅ Storage connected: {}", v),
            Err(e) => {
                println!("❌ Storage check failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ SousChef health check passed");
        return Ok(());
    }

    let llm = match OpenAiClient::new(&config.llm, None) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Failed to create model client: {}", e);
            std::process::exit(1);
        }
    };

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    if !config.http.enabled {
        tracing::warn!("HTTP API disabled in config; nothing to serve");
        return Ok(());
    }

    let state = Arc::new(HttpState {
        store,
        chat: llm.clone(),
        estimator: llm,
        config,
    });
    start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
