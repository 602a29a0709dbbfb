//! HTTP API and request orchestration.
//!
//! Routes:
//! - GET /check: authenticated liveness check
//! - POST /inference: authenticate, validate, predict, dispatch, respond
//! - GET /metrics: authenticated Prometheus exposition
//!
//! Every handler runs its pipeline as a sequence of fallible stages. Each
//! stage returns an explicit [`ApiError`] variant which is mapped to a status
//! code exactly once, in [`crate::server::error`].

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use serde::Serialize;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::{CatchPanicLayer, ResponseForPanic};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, Credentials};
use crate::inference::engine::InferenceEngine;
use crate::monitoring::dispatcher::{self, DispatchWorker, Dispatcher};
use crate::monitoring::record::RecordGroup;
use crate::monitoring::sink::{MonitoringSink, SinkSummary};
use crate::server::error::{internal_error_response, ApiError};
use crate::server::metrics::Metrics;
use crate::server::validation::{validate_inference_request, FieldViolation};

/// Application context shared by all handlers. Built once at startup.
pub struct AppState {
    pub engine: InferenceEngine,
    pub credentials: Credentials,
    pub dispatcher: Dispatcher,
    pub metrics: Arc<Metrics>,
    pub max_body_bytes: usize,
    pub start_time: Instant,
}

impl AppState {
    /// Load the model, open the monitoring sink and start the dispatch
    /// worker. Must run inside a tokio runtime.
    ///
    /// Any error here means the process must not start serving.
    pub fn bootstrap(
        config: &Config,
        credentials: Credentials,
    ) -> anyhow::Result<(Arc<AppState>, DispatchWorker)> {
        let engine = InferenceEngine::load(&config.model.artifact_path)
            .context("failed to load model artifact")?;

        let sink = MonitoringSink::open(
            &config.monitoring.storage_dir,
            engine.feature_names().to_vec(),
            config.monitoring.flush_threshold,
            config.monitoring.sync_on_flush,
        )
        .context("failed to open monitoring sink")?;

        let (dispatcher, worker) = dispatcher::spawn(sink, config.monitoring.queue_capacity);
        let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);
        metrics.queue_free_slots.set(dispatcher.capacity() as i64);

        let state = Arc::new(AppState {
            engine,
            credentials,
            dispatcher,
            metrics,
            max_body_bytes: config.server.max_body_bytes,
            start_time: Instant::now(),
        });
        Ok((state, worker))
    }
}

/// Build the axum router with all API routes.
///
/// `/inference` reads its body only after authentication, against
/// `max_body_bytes`, so axum's default body limit is disabled there.
pub fn build_router(state: Arc<AppState>) -> Router {
    let panic_response = PanicResponse {
        metrics: state.metrics.clone(),
    };
    Router::new()
        .route("/check", get(check))
        .route(
            "/inference",
            post(inference).layer(DefaultBodyLimit::disable()),
        )
        .route("/metrics", get(metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(panic_response)),
        )
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain the monitoring queue and
/// close the sink.
///
/// Shutdown order: stop accepting connections, let in-flight requests
/// finish, drop the application context (closing the queue), wait for the
/// worker to persist everything that was enqueued.
pub async fn serve<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    worker: DispatchWorker,
    shutdown: F,
) -> anyhow::Result<SinkSummary>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    info!("HTTP server stopped, draining monitoring queue");
    let summary = worker.shutdown().await?;
    Ok(summary)
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
}

/// Successful inference response.
#[derive(Debug, Serialize)]
pub struct InferenceResponse {
    pub identifier: Vec<String>,
    pub predictions: Vec<f64>,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn check(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let request_id = Uuid::new_v4();
    info!(%request_id, "Endpoint called: GET /check");

    let result = authenticate(&state, &headers, request_id).map(|()| {
        debug!(
            %request_id,
            uptime_secs = state.start_time.elapsed().as_secs(),
            "Health check"
        );
        HealthCheck { status: "active" }
    });
    respond(&state, "check", request_id, result)
}

async fn inference(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let request_id = Uuid::new_v4();
    info!(%request_id, "Endpoint called: POST /inference");

    let result = run_inference(&state, &headers, body, request_id).await;
    respond(&state, "inference", request_id, result)
}

async fn metrics(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let request_id = Uuid::new_v4();

    let result = authenticate(&state, &headers, request_id).and_then(|()| {
        state
            .metrics
            .render()
            .map_err(ApiError::internal)
    });

    match result {
        Ok(text) => {
            state.metrics.record_request("metrics", 200);
            ([(CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response()
        }
        Err(e) => {
            state.metrics.record_request("metrics", e.status().as_u16());
            warn!(%request_id, status = e.status().as_u16(), "Metrics request failed");
            e.into_response()
        }
    }
}

/// The inference pipeline: Authenticating → Validating → Predicting →
/// Dispatching → Responding.
///
/// The body is only read once the caller is authenticated.
async fn run_inference(
    state: &AppState,
    headers: &HeaderMap,
    body: Body,
    request_id: Uuid,
) -> Result<InferenceResponse, ApiError> {
    authenticate(state, headers, request_id)?;

    let body = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| {
            warn!(%request_id, limit = state.max_body_bytes, "Failed to read request body: {e}");
            ApiError::Validation(vec![FieldViolation::body_too_large(state.max_body_bytes)])
        })?;

    let request = validate_inference_request(&body, state.engine.feature_names()).map_err(
        |errors| {
            warn!(%request_id, violations = ?errors, "Request failed validation");
            ApiError::Validation(errors)
        },
    )?;
    let request_time = Local::now();
    debug!(
        %request_id,
        observations = request.observations(),
        payload = ?request,
        "Request payload"
    );

    let predictions = state
        .engine
        .predict(&request.data)
        .with_context(|| format!("prediction failed for request {request_id}"))
        .map_err(ApiError::Internal)?;
    state
        .metrics
        .observations_scored
        .inc_by(predictions.len() as u64);

    let response = InferenceResponse {
        identifier: request.identifier.clone(),
        predictions: predictions.clone(),
    };
    debug!(%request_id, response = ?response, "Response payload");

    dispatch(
        state,
        request_id,
        RecordGroup {
            features: request.data.into_columns(),
            predictions,
            identifiers: request.identifier,
            request_time,
        },
    );

    Ok(response)
}

/// Hand a record group to the monitoring queue. Never fails the request.
fn dispatch(state: &AppState, request_id: Uuid, group: RecordGroup) {
    let observations = group.observations();
    match state.dispatcher.dispatch(group) {
        Ok(()) => state.metrics.groups_enqueued.inc(),
        Err(e) => {
            state.metrics.groups_dropped.inc();
            warn!(%request_id, observations, "Monitoring record dropped: {e}");
        }
    }
    state
        .metrics
        .queue_free_slots
        .set(state.dispatcher.capacity() as i64);
}

fn authenticate(state: &AppState, headers: &HeaderMap, request_id: Uuid) -> Result<(), ApiError> {
    state.credentials.authenticate(headers).map_err(|e| {
        warn!(%request_id, "{e}");
        ApiError::Unauthorized
    })
}

fn respond<T: Serialize>(
    state: &AppState,
    endpoint: &str,
    request_id: Uuid,
    result: Result<T, ApiError>,
) -> Response {
    match result {
        Ok(body) => {
            state.metrics.record_request(endpoint, 200);
            info!(%request_id, status = 200, "Request succeeded");
            Json(body).into_response()
        }
        Err(e) => {
            let status = e.status().as_u16();
            state.metrics.record_request(endpoint, status);
            info!(%request_id, status, "Request rejected");
            e.into_response()
        }
    }
}

/// Turns a handler panic into the opaque 500 and counts it.
#[derive(Clone)]
struct PanicResponse {
    metrics: Arc<Metrics>,
}

impl ResponseForPanic for PanicResponse {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response {
        let detail = if let Some(s) = err.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = err.downcast_ref::<&str>() {
            s.to_string()
        } else {
            "unknown panic payload".to_string()
        };
        error!(panic = detail, "Handler panicked");
        // The route is not known here.
        self.metrics.record_request("unhandled", 500);
        internal_error_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_panic_becomes_opaque_500() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let app = Router::new()
            .route(
                "/boom",
                get(|| async {
                    if true {
                        panic!("secret internals");
                    }
                    "unreachable"
                }),
            )
            .layer(CatchPanicLayer::custom(PanicResponse {
                metrics: metrics.clone(),
            }));

        let response = app
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(text, r#"{"detail":"Internal server error occured."}"#);

        let rendered = metrics.render().unwrap();
        assert!(rendered.contains(r#"clf_http_requests_total{endpoint="unhandled",status="500"} 1"#));
    }
}
