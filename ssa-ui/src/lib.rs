//! ssa-ui library - local analytics dashboard
//!
//! Serves the JSON API and static page over the ssa-common engine. Each
//! browser session binds its own active dataset.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use ssa_common::dataset::DatasetCatalog;
use ssa_common::{EngineConfig, Snapshot};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod api;
pub mod error;
pub mod pagination;
pub mod session;

use error::{ApiError, ApiResult};
use session::SessionId;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Extracted exports under `<root>/datasets`
    pub catalog: DatasetCatalog,
    /// Thresholds injected into every engine call
    pub config: Arc<EngineConfig>,
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Snapshot>>>>,
}

impl AppState {
    pub fn new(catalog: DatasetCatalog, config: EngineConfig) -> Self {
        Self {
            catalog,
            config: Arc::new(config),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Snapshot bound to `session`, falling back to the default session's
    pub async fn snapshot(&self, session: &SessionId) -> ApiResult<Arc<Snapshot>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session)
            .or_else(|| sessions.get(&SessionId::Default))
            .cloned()
            .ok_or(ApiError::NoActiveDataset)
    }

    /// Id of the dataset `session` currently sees, if any
    pub async fn active_dataset(&self, session: &SessionId) -> Option<String> {
        self.snapshot(session)
            .await
            .ok()
            .map(|s| s.dataset().id().to_string())
    }

    /// Load dataset `id` and bind it to `session`
    ///
    /// Requests already holding the previous snapshot finish against it.
    pub async fn activate(&self, session: SessionId, id: &str) -> ApiResult<Arc<Snapshot>> {
        let catalog = self.catalog.clone();
        let dataset_id = id.to_string();
        let dataset = tokio::task::spawn_blocking(move || catalog.load(&dataset_id))
            .await
            .map_err(|e| ApiError::Internal(format!("dataset load task failed: {}", e)))??;

        let snapshot = Arc::new(Snapshot::new(Arc::new(dataset), Arc::clone(&self.config)));
        info!(
            "Session {} activated dataset '{}' ({} subscribers, {} posts)",
            session,
            id,
            snapshot.dataset().subscribers().len(),
            snapshot.dataset().posts().len()
        );
        self.sessions
            .write()
            .await
            .insert(session, Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let api = Router::new()
        .route("/api/datasets", get(api::list_datasets))
        .route("/api/datasets/:id/activate", post(api::activate_dataset))
        .route("/api/dataset", get(api::get_dataset))
        .route("/api/metrics", get(api::get_metrics))
        .route("/api/posts", get(api::get_posts))
        .route("/api/segments", get(api::get_segments))
        .route("/api/segments/subscribers", get(api::get_segment_subscribers))
        .route("/api/flow", get(api::get_flow))
        .route("/api/acquisition", get(api::get_acquisition))
        .route("/api/trends", get(api::get_trends));

    let public = Router::new()
        .route("/", get(api::serve_index))
        .route("/static/app.js", get(api::serve_app_js))
        .merge(api::health_routes());

    Router::new()
        .merge(api)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
