//! Dashboard: Axum JSON API over the history, backtest and sync status.
//!
//! CORS enabled for local front-end development.

pub mod routes;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

pub use routes::{AppState, DashboardState};

/// Start the dashboard web server as a background task.
pub fn spawn_dashboard(state: AppState, port: u16) -> tokio::task::JoinHandle<()> {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(port, error = %e, "Failed to bind dashboard port");
                return;
            }
        };
        info!(port, "Dashboard server listening on http://localhost:{port}");

        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    })
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/status", get(routes::get_status))
        .route("/api/history", get(routes::get_history))
        .route("/api/backtest", get(routes::get_backtest))
        .route("/api/stats", get(routes::get_stats))
        .route("/api/export.csv", get(routes::export_csv))
        .route("/api/sync", post(routes::post_sync))
        .route("/api/import", post(routes::post_import))
        .route("/api/import/text", post(routes::post_import_text))
        .route("/api/advice", post(routes::post_advice))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
