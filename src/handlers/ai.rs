use axum::{Json, extract::State, response::IntoResponse};
use std::sync::Arc;

use crate::error::{GateError, Result};
use crate::models::{
    AcceptanceCriteriaRequest, AcceptanceCriteriaResponse, CodeSuggestionsRequest,
    CodeSuggestionsResponse,
};
use crate::state::AppState;

const MAX_TITLE: usize = 200;
const MAX_DESCRIPTION: usize = 2000;
const MAX_CONTEXT: usize = 5000;

fn required(value: &str, field: &str, max: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GateError::Validation(format!("{field} is required")));
    }
    within(value, field, max)
}

fn within(value: &str, field: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(GateError::Validation(format!(
            "{field} must be less than {max} characters"
        )));
    }
    Ok(())
}

pub async fn criteria_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AcceptanceCriteriaRequest>,
) -> Result<Json<AcceptanceCriteriaResponse>> {
    required(&payload.task_title, "Task title", MAX_TITLE)?;
    required(&payload.task_description, "Task description", MAX_DESCRIPTION)?;

    let (criteria, raw_response) = state
        .ai()?
        .acceptance_criteria(&payload.task_title, &payload.task_description)
        .await?;

    Ok(Json(AcceptanceCriteriaResponse {
        success: true,
        criteria,
        raw_response,
    }))
}

pub async fn code_suggestions_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CodeSuggestionsRequest>,
) -> Result<Json<CodeSuggestionsResponse>> {
    required(&payload.task_description, "Task description", MAX_DESCRIPTION)?;
    if let Some(context) = &payload.context {
        within(context, "Context", MAX_CONTEXT)?;
    }

    let (suggestions, raw_response) = state
        .ai()?
        .code_suggestions(&payload.task_description, payload.context.as_deref())
        .await?;

    Ok(Json(CodeSuggestionsResponse {
        success: true,
        suggestions,
        raw_response,
    }))
}

pub async fn ai_health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(ai) = state.ai.as_deref() else {
        return Json(serde_json::json!({
            "status": "unhealthy",
            "error": "Gemini API key not configured"
        }));
    };

    match ai.ping().await {
        Ok(_) => Json(serde_json::json!({
            "status": "healthy",
            "service": "ai_service",
            "models": { "flash": ai.flash_model(), "pro": ai.pro_model() },
            "last_test": chrono::Utc::now().to_rfc3339()
        })),
        Err(e) => Json(serde_json::json!({
            "status": "degraded",
            "error": format!("API connectivity issue: {e}"),
            "service": "ai_service"
        })),
    }
}
