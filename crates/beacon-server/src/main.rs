mod config;
mod sweeper;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use beacon_api::AppStateInner;
use beacon_content::{ContentExtractor, IconCatalog, TypeCodeCatalog};
use beacon_db::Database;
use beacon_federation::Dispatcher;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "beacon=debug,beacon_api=debug,beacon_db=info,beacon_federation=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Catalogs are optional; without them views fall back to raw codes
    let icons = match &config.icon_catalog {
        Some(path) => IconCatalog::from_json_file(path)?,
        None => IconCatalog::default(),
    };
    let type_codes = match &config.type_codes {
        Some(path) => TypeCodeCatalog::from_json_file(path)?,
        None => TypeCodeCatalog::default(),
    };
    if type_codes.is_empty() {
        warn!("Type-code catalog is empty; friendly names show raw codes");
    }

    let db = Arc::new(Database::open(&config.db_path)?);
    let dispatcher = Dispatcher::new(config.federation.clone())?;

    tokio::spawn(sweeper::run_sweeper(db.clone(), config.sweep_interval));

    let state = Arc::new(AppStateInner {
        db,
        dispatcher,
        extractor: ContentExtractor::new(icons, type_codes),
        archive_enabled: config.archive_enabled,
        allow_delete_all: config.allow_delete_all,
    });

    let app = beacon_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Beacon node listening on {}", addr);
    match &config.federation.self_uri {
        Some(uri) => info!("Federating as {}", uri),
        None => info!("BEACON_PUBLIC_URL unset; refusing {} and learned Host names as self", addr),
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

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
                tracing::warn!("SIGTERM handler unavailable: {e}");
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
