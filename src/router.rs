use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;

use crate::admission::{AdmissionGate, admit};
use crate::config::LimiterScope;
use crate::handlers::{
    ai_health_handler, code_suggestions_handler, criteria_handler, health_handler,
    metrics_handler, reset_stats_handler, stats_handler, track_performance,
};
use crate::key::{ip_key, user_key};
use crate::state::AppState;

// auth_routes, when given, is nested at /api/auth
pub fn build_router(state: Arc<AppState>, auth_routes: Option<Router<Arc<AppState>>>) -> Router {
    let limiters = &state.limiters;

    let ai_routes = Router::new()
        .route("/generate-acceptance-criteria", post(criteria_handler))
        .route("/generate-code-suggestions", post(code_suggestions_handler))
        .route("/health", get(ai_health_handler));

    let general_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/performance/stats", get(stats_handler))
        .route("/api/performance/reset", post(reset_stats_handler));

    // every request meets exactly one gate
    let app = match state.scope {
        LimiterScope::PerRoute => {
            let general = AdmissionGate::new(limiters.general.clone(), user_key);
            let ai = AdmissionGate::new(limiters.ai.clone(), user_key);
            let mut app = general_routes
                .route_layer(middleware::from_fn_with_state(general, admit))
                .nest("/api/ai", ai_routes.layer(middleware::from_fn_with_state(ai, admit)));
            if let Some(auth) = auth_routes {
                let gate = AdmissionGate::new(limiters.auth.clone(), ip_key);
                app = app.nest("/api/auth", auth.layer(middleware::from_fn_with_state(gate, admit)));
            }
            app
        }
        LimiterScope::Global => {
            let mut app = general_routes.nest("/api/ai", ai_routes);
            if let Some(auth) = auth_routes {
                app = app.nest("/api/auth", auth);
            }
            app.layer(middleware::from_fn_with_state(
                AdmissionGate::new(limiters.ai.clone(), user_key),
                admit,
            ))
        }
    };

    app.layer(middleware::from_fn_with_state(
        state.recorder.clone(),
        track_performance,
    ))
    .with_state(state)
}
