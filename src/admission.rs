use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::key::KeyExtractor;
use crate::metrics::RATE_LIMITED;
use crate::rate_limit::{Admission, RateLimiter};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

#[derive(Clone)]
pub struct AdmissionGate {
    limiter: Arc<RateLimiter>,
    key: KeyExtractor,
}

impl AdmissionGate {
    pub fn new(limiter: Arc<RateLimiter>, key: KeyExtractor) -> Self {
        Self { limiter, key }
    }
}

pub async fn admit(State(gate): State<AdmissionGate>, req: Request, next: Next) -> Response {
    let key = (gate.key)(&req);
    let now = Instant::now();
    let admission = gate.limiter.admit_at(&key, now);

    if !admission.allowed {
        RATE_LIMITED.inc();
        let retry_after = admission
            .reset_at
            .map(|reset| reset.saturating_duration_since(now))
            .unwrap_or_else(|| gate.limiter.policy().window());
        debug!(
            limiter = gate.limiter.name(),
            key = %key,
            retry_after_secs = ceil_secs(retry_after),
            "Rate limit exceeded"
        );
        return denied(&admission, retry_after);
    }

    let mut res = next.run(req).await;
    apply_headers(res.headers_mut(), &admission, now);
    res
}

fn denied(admission: &Admission, retry_after: Duration) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(RETRY_AFTER, HeaderValue::from(ceil_secs(retry_after)));
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(admission.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_epoch(retry_after)));

    (
        StatusCode::TOO_MANY_REQUESTS,
        headers,
        Json(serde_json::json!({ "detail": "Rate limit exceeded" })),
    )
        .into_response()
}

fn apply_headers(headers: &mut HeaderMap, admission: &Admission, now: Instant) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(admission.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(admission.remaining));
    if let Some(reset) = admission.reset_at {
        let until = reset.saturating_duration_since(now);
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_epoch(until)));
    }
}

// Unix seconds at which the window frees a slot
fn reset_epoch(until: Duration) -> i64 {
    chrono::Utc::now().timestamp() + ceil_secs(until) as i64
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
