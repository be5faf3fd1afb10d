//! HTTP gateway
//!
//! Exposes the runner service as a JSON API under `/api/v1`.
//!
//! ```text
//! POST /api/v1/run            one-shot execution
//! POST /api/v1/run/stream     interactive execution (Server-Sent Events)
//! POST /api/v1/input          deliver a stdin line
//! POST /api/v1/stop           terminate a session
//! POST /api/v1/modules/check  import-check modules
//! GET  /api/v1/health         interpreter status
//! GET  /api/v1/sessions       live sessions
//! ```

pub mod handlers;
pub mod protocol;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::runner::RunnerService;

pub use handlers::{AppError, AppState};

/// Build the API router
pub fn build_router(state: AppState, cors: bool) -> Router {
    let api = Router::new()
        .route("/run", post(handlers::run))
        .route("/run/stream", post(handlers::run_stream))
        .route("/input", post(handlers::input))
        .route("/stop", post(handlers::stop))
        .route("/modules/check", post(handlers::check_modules))
        .route("/health", get(handlers::health))
        .route("/sessions", get(handlers::sessions));

    let mut app = Router::new().nest("/api/v1", api).with_state(state);
    if cors {
        app = app.layer(CorsLayer::permissive());
    }
    app.layer(TraceLayer::new_for_http())
}

/// Serve the API until Ctrl-C or SIGTERM, then terminate every live session
pub async fn serve(config: Config) -> Result<()> {
    let service = RunnerService::new(config.runner.clone());
    let state = AppState {
        service: service.clone(),
        keepalive: config.gateway.sse_keepalive,
    };
    let app = build_router(state, config.gateway.cors);

    let listener = tokio::net::TcpListener::bind((config.gateway.bind.as_str(), config.gateway.port))
        .await
        .map_err(|e| {
            Error::Config(format!(
                "cannot bind {}:{}: {}",
                config.gateway.bind, config.gateway.port, e
            ))
        })?;
    let addr = listener.local_addr()?;
    info!("coderun gateway listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(service))
        .await?;

    info!("coderun gateway stopped");
    Ok(())
}

async fn shutdown_signal(service: RunnerService) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown requested");
    service.shutdown().await;
}
