pub mod health;
pub mod routes;
pub mod sse;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::daemon::controller::JobController;
use crate::daemon::events::JobEvent;
use crate::daemon::pacing::PacingConfig;
use crate::lookup::LookupFactory;
use crate::models::ServiceConfig;
use crate::storage::{DatasetStore, UploadDir};

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Shared application state for the Axum server.
pub struct AppState {
    pub controller: Arc<JobController>,
    pub store: Arc<dyn DatasetStore>,
    pub lookups: Arc<dyn LookupFactory>,
    pub uploads: UploadDir,
    pub config: Arc<ServiceConfig>,
    pub data_dir: PathBuf,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        data_dir: PathBuf,
        store: Arc<dyn DatasetStore>,
        lookups: Arc<dyn LookupFactory>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel::<JobEvent>(config.broadcast_capacity.max(1));
        let controller = Arc::new(JobController::new(
            Arc::clone(&store),
            event_tx,
            PacingConfig::from_config(&config),
        ));
        Self {
            controller,
            store,
            lookups,
            uploads: UploadDir::new(data_dir.join("uploads")),
            config: Arc::new(config),
            data_dir,
            start_time: Instant::now(),
        }
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/upload", post(routes::upload))
        .route("/status", get(routes::status))
        .route("/cancel", post(routes::cancel))
        .route("/download", get(routes::download))
        .route("/download-api/{file_id}", get(routes::download_api))
        .route("/check-rankings", post(routes::check_rankings))
        .route("/events", get(sse::sse_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}
