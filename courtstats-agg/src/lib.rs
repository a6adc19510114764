//! courtstats-agg library - boxscore aggregation service
//!
//! Incremental delta aggregation of uploaded boxscore CSVs, full-season
//! reconciliation, and the cache rebuild queue, served over HTTP.

use axum::Router;
use courtstats_common::config::TomlConfig;
use courtstats_common::store::DocumentStore;
use std::sync::Arc;
use tracing::{info, warn};

pub mod api;
pub mod delta;
pub mod error;
pub mod rebuild;
pub mod reconcile;
pub mod upload;

use api::{IdentityVerifier, TokenAllowlist};
use rebuild::RebuildHandle;
use reconcile::Reconciler;
use upload::DeltaAggregator;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub aggregator: Arc<DeltaAggregator>,
    pub reconciler: Arc<Reconciler>,
    pub rebuild: RebuildHandle,
    /// `None` disables the admin check
    pub verifier: Option<Arc<dyn IdentityVerifier>>,
}

impl AppState {
    /// Wire the aggregator, reconciler and identity check from configuration
    pub fn new(store: Arc<dyn DocumentStore>, config: &TomlConfig, rebuild: RebuildHandle) -> Self {
        let aggregator = Arc::new(DeltaAggregator::new(
            store.clone(),
            config.aggregation.clone(),
            rebuild.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            config.aggregation.clone(),
            rebuild.clone(),
        ));

        let verifier: Option<Arc<dyn IdentityVerifier>> = if config.auth.disabled {
            warn!("Admin authentication DISABLED ([auth] disabled = true)");
            None
        } else {
            let allowlist = TokenAllowlist::from_config(&config.auth);
            if allowlist.is_empty() {
                warn!("No API tokens configured; every /api request will be rejected");
            } else {
                info!(tokens = allowlist.len(), "Loaded API token allowlist");
            }
            Some(Arc::new(allowlist))
        };

        Self {
            store,
            aggregator,
            reconciler,
            rebuild,
            verifier,
        }
    }

    pub fn with_verifier(mut self, verifier: Option<Arc<dyn IdentityVerifier>>) -> Self {
        self.verifier = verifier;
        self
    }
}

/// Build application router
///
/// `/health` is public; everything under `/api` requires an admin identity.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::post;

    let protected = Router::new()
        .route(
            "/api/seasons/:season_id/games/:game_id/boxscores/:team_id",
            post(api::upload_boxscore),
        )
        .route("/api/seasons/:season_id/reconcile", post(api::reconcile_season))
        .route("/api/reconcile", post(api::reconcile_active))
        .route(
            "/api/seasons/:season_id/cache/rebuild",
            post(api::request_cache_rebuild),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new().merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
