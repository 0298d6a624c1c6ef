//! HTTP server: routes, static files and the fault boundary

pub mod error;
pub mod handlers;
pub mod state;

use crate::config::ServerConfig;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::path::Path;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError, FaultBody};
pub use state::{AppState, TemplateDir};

/// Build the application router
///
/// The panic layer wraps every route, so no handler needs its own
/// catch-all. `/rembg` reads bodies of any size so a large request still
/// gets the JSON status envelope.
pub fn router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route(
            "/rembg",
            post(handlers::rembg).layer(DefaultBodyLimit::disable()),
        )
        .route("/health", get(handlers::health))
        .nest_service("/static", ServeDir::new(static_dir.as_ref()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(error::handle_panic))
}

/// Bind the configured address and serve until a shutdown signal arrives
///
/// # Errors
/// - Address cannot be bound
/// - Server I/O failure
pub async fn serve(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, config, state).await
}

/// Serve on an already bound listener until a shutdown signal arrives
///
/// # Errors
/// - Server I/O failure
pub async fn serve_on(
    listener: TcpListener,
    config: &ServerConfig,
    state: AppState,
) -> anyhow::Result<()> {
    let app = router(state, &config.static_dir);
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
