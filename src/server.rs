//! API server setup

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::create_router;
use crate::api::state::AppState;
use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::sweep;

/// Build the router with its middleware
pub fn create_server(config: &ServerConfig, engine: Engine) -> Router {
    let mut router = create_router(AppState::new(engine));

    router = router.layer(TraceLayer::new_for_http());

    if config.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}

/// Run the API server until ctrl-c, with the periodic sweep if configured
pub async fn run_server(config: ServerConfig, engine: Engine) -> anyhow::Result<()> {
    let sweeper = config.sweep_interval.map(|every| {
        tracing::info!(every_secs = every.as_secs(), "attendance sweep scheduled");
        sweep::spawn(engine.clone(), every)
    });

    let router = create_server(&config, engine);
    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("attendance escalation API listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
