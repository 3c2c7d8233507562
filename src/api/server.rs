use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{self, ApiSettings, AppState};
use crate::config::PatchworkConfig;
use crate::db::{DbHandle, PatchworkDb};

/// Build the full application router with request tracing.
pub fn build_router(state: Arc<AppState>) -> Router {
    handlers::api_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the database and serve the API until Ctrl+C.
pub async fn start_server(config: &PatchworkConfig) -> Result<()> {
    if let Some(parent) = config.database.path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let db = PatchworkDb::new(&config.database.path).with_context(|| {
        format!(
            "Failed to open database {}",
            config.database.path.display()
        )
    })?;

    let state = Arc::new(AppState {
        db: DbHandle::new(db),
        settings: ApiSettings::from_config(config),
    });

    let mut app = build_router(state);
    if config.server.cors {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        base_url = %config.site.base_url,
        db = %config.database.path.display(),
        "patchwork API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
