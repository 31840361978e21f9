use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::{MetricsRecorder, PerformanceStats, REQUEST_LATENCY, REQUEST_TOTAL};
use crate::state::AppState;

const X_RESPONSE_TIME: HeaderName = HeaderName::from_static("x-response-time");

pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<PerformanceStats> {
    Json(state.recorder.stats())
}

pub async fn reset_stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.recorder.reset();
    Json(serde_json::json!({ "message": "Performance metrics reset" }))
}

/// Times every request, feeds the recorder and stamps `X-Response-Time`.
pub async fn track_performance(
    State(recorder): State<Arc<MetricsRecorder>>,
    req: Request,
    next: Next,
) -> Response {
    REQUEST_TOTAL.inc();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let mut res = next.run(req).await;

    let elapsed = started.elapsed();
    REQUEST_LATENCY.observe(elapsed.as_secs_f64());
    recorder.record(&path, elapsed, res.status().as_u16());
    if let Ok(value) = HeaderValue::from_str(&format!("{:.3}s", elapsed.as_secs_f64())) {
        res.headers_mut().insert(X_RESPONSE_TIME, value);
    }
    res
}
