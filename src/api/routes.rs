use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::observability::{get_metrics, HealthChecker, LatencyTimer};
use crate::services::LedgerService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: LedgerService,
    pub health_checker: Arc<HealthChecker>,
    pub default_history_limit: i64,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(service: LedgerService, default_history_limit: i64) -> Self {
        let health_checker = Arc::new(HealthChecker::new(service.store()));
        Self {
            service,
            health_checker,
            default_history_limit,
            metrics_handle: None,
        }
    }

    /// Adds metrics handle to the state.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let timer = LatencyTimer::new();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let method = req.method().to_string();

    let response = next.run(req).await;

    get_metrics().record_http_request(&method, &path, response.status().as_u16(), timer.elapsed_ms());
    response
}

/// Creates the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/live", get(handlers::liveness_check))
        // Metrics endpoint
        .route("/metrics", get(handlers::metrics_endpoint))
        // Ledger endpoints
        .route("/users/transfer", post(handlers::transfer))
        .route("/users/:id/deposit", post(handlers::deposit))
        .route("/users/:id/transactions", get(handlers::get_transactions))
        .route("/users/:id/balance", get(handlers::get_balance))
        .route_layer(middleware::from_fn(track_metrics))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
