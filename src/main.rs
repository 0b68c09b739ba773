mod api;
mod backend;
mod config;
mod db;
mod detector;
mod engine;
mod error;
mod fetcher;
mod filter;
mod narrator;
mod publisher;
mod retry;
mod scorer;
mod state;
mod types;

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::routes::{router, ApiState};
use crate::backend::PublishingChannel;
use crate::config::Config;
use crate::db::SqliteStore;
use crate::engine::{Collaborators, Engine};
use crate::error::Result;
use crate::fetcher::CoinGeckoProvider;
use crate::narrator::AnthropicNarrator;
use crate::publisher::{LogPublisher, WebhookPublisher};
use crate::state::EngineContext;

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
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", cfg.db_path))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);
    let store = SqliteStore::new(pool);

    // --- Collaborators ---
    let publisher: Arc<dyn PublishingChannel> = match &cfg.publish_webhook_url {
        Some(url) => {
            info!("Publishing narratives to webhook {url}");
            Arc::new(WebhookPublisher::new(url)?)
        }
        None => {
            warn!("PUBLISH_WEBHOOK_URL not set, narratives will only be logged (dry run)");
            Arc::new(LogPublisher::new())
        }
    };
    let store_arc = Arc::new(store.clone());
    let parts = Collaborators {
        provider: Arc::new(CoinGeckoProvider::new(&cfg)?),
        volumes: store_arc.clone(),
        posts: store_arc.clone(),
        persistence: store_arc,
        generator: Arc::new(AnthropicNarrator::new(&cfg)?),
        publisher,
    };

    let rng = match cfg.rng_seed {
        Some(seed) => {
            info!(seed, "Using fixed RNG seed");
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    };

    info!(
        "Tracking {} assets: {} (interval={}s, price>{}%, volume>{}%, trend>{}% over {}m)",
        cfg.tracked_assets.len(),
        cfg.symbols().join(", "),
        cfg.thresholds.base_interval.as_secs(),
        cfg.thresholds.price_change_pct,
        cfg.thresholds.volume_change_pct,
        cfg.thresholds.volume_trend_pct,
        cfg.thresholds.volume_window_minutes,
    );

    let health = Arc::new(HealthState::new());
    let engine = Engine::new(parts, cfg.thresholds.clone(), Arc::clone(&health), rng);

    // --- Shutdown signal ---
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        }
    });

    // HTTP API server
    let api_state = ApiState { store, health };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");
    let mut api_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        let stopped = async move {
            while !*api_shutdown.borrow_and_update() {
                if api_shutdown.changed().await.is_err() {
                    break;
                }
            }
        };
        axum::serve(listener, app).with_graceful_shutdown(stopped).await
    });

    // --- Engine loop (runs until shutdown) ---
    engine.run(EngineContext::new(Utc::now()), shutdown_rx).await;

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("HTTP API exited with error: {e}"),
        Err(e) => warn!("HTTP API task failed: {e}"),
    }
    Ok(())
}
