//! HTTP surface: routing, shared state and serving
//!
//! ```text
//! GET  /ping               -> {"status": "ok", ...}
//! POST /remove-background  -> image/png
//! ```

pub mod error;
pub mod routes;

use crate::{config::ServerConfig, error::Result, pipeline::CompositingPipeline};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

pub use error::ErrorBody;

/// State shared by all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub pipeline: Arc<CompositingPipeline>,
}

impl AppState {
    #[must_use]
    pub fn new(pipeline: CompositingPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Build the application router
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let mut router = Router::new()
        .route("/ping", get(routes::ping))
        .route("/remove-background", post(routes::remove_background))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}

/// Bind and serve until Ctrl-C or SIGTERM
///
/// # Errors
/// - Address cannot be bound
/// - Server I/O failure
pub async fn serve(router: Router, config: &ServerConfig) -> Result<()> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
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
                warn!("Failed to listen for SIGTERM: {e}");
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
