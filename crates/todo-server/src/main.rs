mod config;

use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use todo_api::purge::PurgeTicker;
use todo_api::{AppStateInner, router};
use todo_crypto::{Hasher, TokenCipher};
use todo_db::{Database, PoolConfig};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "todo=debug,todo_api=debug,todo_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            std::process::exit(1);
        }
    };

    let db = Database::open(
        &config.db_path,
        &PoolConfig {
            max_size: config.pool_size,
            ..PoolConfig::default()
        },
    )
    .with_context(|| format!("failed to open database {}", config.db_path.display()))?;

    let state = Arc::new(AppStateInner {
        db,
        cipher: TokenCipher::new(&config.secret_key),
        hasher: Hasher::new(config.hash_params)?,
        session_ttl: config.session_ttl,
    });

    let ticker = PurgeTicker::start(Arc::clone(&state), config.purge_delay, config.purge_interval);

    let app = router::build(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Todo API listening on {}", config.addr);
    info!("Sessions last {} hours", config.session_ttl.num_hours());

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ticker.stop().await;
    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
