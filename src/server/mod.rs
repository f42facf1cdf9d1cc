//! HTTP surface: the rollover trigger, public approval links and the
//! presentation API.

mod handlers;

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::db::Database;
use crate::rollover::RolloverEngine;
use crate::store::RecordStore;

pub use handlers::ApiError;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    engine: Arc<RolloverEngine>,
}

impl AppState {
    pub fn new(db: Arc<Database>, engine: Arc<RolloverEngine>) -> Self {
        Self { db, engine }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// The database behind the record store contract.
    pub fn store(&self) -> &dyn RecordStore {
        &*self.db
    }

    pub fn engine(&self) -> &Arc<RolloverEngine> {
        &self.engine
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health))
        // Scheduler trigger
        .route("/api/rollover", post(handlers::run_rollover))
        .route(
            "/api/clients/{client_id}/templates/{template_id}/generate",
            post(handlers::generate),
        )
        // Presentation
        .route("/api/users/{user_id}/tree", get(handlers::user_tree))
        .route("/api/clients/{client_id}/tree", get(handlers::client_tree))
        .route("/api/tasks/{task_id}/complete", post(handlers::complete_task))
        .route("/api/tasks/{task_id}/board", post(handlers::move_task))
        .route(
            "/api/client-tasks/{client_task_id}/status",
            post(handlers::client_task_status),
        )
        // Anonymous review
        .route(
            "/api/public/{token}/client-tasks/{client_task_id}/review",
            post(handlers::public_review),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve in the background.
///
/// Returns a sender that stops the server gracefully and the bound address.
pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
) -> anyhow::Result<(oneshot::Sender<()>, SocketAddr)> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("Rollover server listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("Rollover server shutting down");
            })
            .await
        {
            tracing::error!("Rollover server error: {}", e);
        }
    });

    Ok((shutdown_tx, bound_addr))
}
