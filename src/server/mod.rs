//! Read-only inspection server.
//!
//! Three endpoints, none of which mutate state: `/healthz` for liveness,
//! `/arbs` for a copy of the current opportunity snapshot, `/metrics` for
//! Prometheus scraping. Handlers copy under the engine's read lock and
//! serialize outside it.

use axum::{
    extract::{Query, Request, State},
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::{Engine, Opportunity};
use crate::metrics::Metrics;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub metrics: Arc<Metrics>,
}

/// Builds the inspection router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/arbs", get(get_arbs))
        .route("/metrics", get(get_metrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            request_logging,
        ))
        .with_state(state)
}

/// Binds and serves until the cancellation token fires, then drains.
/// The caller bounds the drain with a timeout.
pub async fn serve(
    addr: String,
    state: AppState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "http server starting");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            info!("http server draining");
        })
        .await
}

async fn request_logging(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    state.metrics.http_requests.inc();
    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "http request"
    );

    response
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct ArbsQuery {
    /// Optional cap on the number of returned opportunities.
    limit: Option<usize>,
}

async fn get_arbs(
    State(state): State<AppState>,
    Query(query): Query<ArbsQuery>,
) -> Json<Vec<Opportunity>> {
    let opportunities = match query.limit {
        Some(limit) => state.engine.top(limit),
        None => state.engine.opportunities(),
    };
    Json(opportunities)
}

async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render_prometheus(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KalshiPriceCache, PmPriceCache};

    fn test_state() -> AppState {
        let metrics = Arc::new(Metrics::new());
        let engine = Arc::new(Engine::new(
            Vec::new(),
            Arc::new(PmPriceCache::new()),
            Arc::new(KalshiPriceCache::new()),
            false,
            3.0,
            metrics.clone(),
        ));
        AppState { engine, metrics }
    }

    #[tokio::test]
    async fn test_healthz_body() {
        assert_eq!(healthz().await, "ok");
    }

    #[tokio::test]
    async fn test_arbs_empty_snapshot() {
        let state = test_state();
        let Json(opps) = get_arbs(State(state), Query(ArbsQuery { limit: None })).await;
        assert!(opps.is_empty());
    }

    #[tokio::test]
    async fn test_arbs_respects_limit() {
        let state = test_state();
        let Json(opps) = get_arbs(State(state), Query(ArbsQuery { limit: Some(3) })).await;
        assert!(opps.len() <= 3);
    }

    #[test]
    fn test_router_builds() {
        let _router = router(test_state());
    }
}
