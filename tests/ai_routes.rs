use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use taskboard_gate::ai::AiService;
use taskboard_gate::config::LimiterScope;
use taskboard_gate::metrics::MetricsRecorder;
use taskboard_gate::models::GenerateContentRequest;
use taskboard_gate::rate_limit::{RateLimiter, WindowPolicy};
use taskboard_gate::router::build_router;
use taskboard_gate::state::{AppState, Limiters};
use taskboard_gate::upstream::{
    RawResponse, RetryPolicy, RetryingClient, Transport, TransportError,
};

struct Canned {
    replies: Mutex<VecDeque<(u16, String)>>,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Transport for Canned {
    async fn post(
        &self,
        _url: &str,
        _api_key: &str,
        body: &GenerateContentRequest,
    ) -> Result<RawResponse, TransportError> {
        self.prompts
            .lock()
            .unwrap()
            .push(body.contents[0].parts[0].text.clone());
        let (status, body) = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((500, String::new()));
        Ok(RawResponse { status, body })
    }
}

fn envelope(text: &str) -> String {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }).to_string()
}

fn app(replies: Vec<(u16, String)>) -> (Router, Arc<Canned>) {
    let transport = Arc::new(Canned {
        replies: Mutex::new(replies.into()),
        prompts: Mutex::new(Vec::new()),
    });
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
        connect_timeout: Duration::from_secs(1),
        total_timeout: Duration::from_secs(2),
    };
    let client = RetryingClient::with_transport(transport.clone(), "key", "https://ai.test", policy);
    let window = |max| Arc::new(RateLimiter::new("t", WindowPolicy::new(max, Duration::from_secs(60)).unwrap()));

    let state = Arc::new(AppState {
        limiters: Limiters {
            general: window(100),
            auth: window(20),
            ai: window(10),
        },
        scope: LimiterScope::PerRoute,
        recorder: Arc::new(MetricsRecorder::new()),
        ai: Some(Arc::new(AiService::new(client, "flash", "pro"))),
    });
    (build_router(state, None), transport)
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn criteria_round_trip() {
    let (app, transport) = app(vec![(200, envelope(r#"["works offline", "syncs"]"#))]);

    let (status, body) = post_json(
        app,
        "/api/ai/generate-acceptance-criteria",
        json!({ "task_title": "Offline mode", "task_description": "Cache tasks locally" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["criteria"], json!(["works offline", "syncs"]));
    let prompts = transport.prompts.lock().unwrap();
    assert!(prompts[0].contains("Title: Offline mode"));
}

#[tokio::test]
async fn suggestions_survive_a_server_error() {
    let (app, transport) = app(vec![
        (503, "overloaded".into()),
        (200, envelope("Key Components\n- Sync queue\nBest Practices\n- Retry")),
    ]);

    let (status, body) = post_json(
        app,
        "/api/ai/generate-code-suggestions",
        json!({ "task_description": "Sync tasks", "context": "mobile" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["suggestions"]["key_components"], json!(["Sync queue"]));
    assert_eq!(body["suggestions"]["best_practices"], json!(["Retry"]));
    assert_eq!(transport.prompts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn upstream_rejection_maps_to_503() {
    let (app, transport) = app(vec![(403, "forbidden".into())]);

    let (status, body) = post_json(
        app,
        "/api/ai/generate-acceptance-criteria",
        json!({ "task_title": "t", "task_description": "d" }),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["detail"].as_str().unwrap().starts_with("AI service error"));
    assert_eq!(transport.prompts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn oversized_input_is_rejected_before_any_call() {
    let (app, transport) = app(vec![]);

    let (status, body) = post_json(
        app.clone(),
        "/api/ai/generate-acceptance-criteria",
        json!({ "task_title": "x".repeat(201), "task_description": "d" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Task title must be less than 200 characters");

    let (status, _) = post_json(
        app,
        "/api/ai/generate-code-suggestions",
        json!({ "task_description": "   " }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(transport.prompts.lock().unwrap().is_empty());
}
