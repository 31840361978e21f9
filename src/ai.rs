use serde_json::Value;

use crate::decoder::{CriteriaDecoder, ResponseDecoder, SuggestionsDecoder};
use crate::upstream::{RetryingClient, UpstreamError};

pub const PING_PROMPT: &str = "Respond with a simple JSON: {\"status\": \"ok\"}";

pub struct AiService {
    client: RetryingClient,
    flash_model: String,
    pro_model: String,
}

impl AiService {
    pub fn new(client: RetryingClient, flash_model: &str, pro_model: &str) -> Self {
        Self {
            client,
            flash_model: flash_model.to_string(),
            pro_model: pro_model.to_string(),
        }
    }

    pub fn flash_model(&self) -> &str {
        &self.flash_model
    }

    pub fn pro_model(&self) -> &str {
        &self.pro_model
    }

    // decoded criteria plus the raw model text
    pub async fn acceptance_criteria(
        &self,
        title: &str,
        description: &str,
    ) -> Result<(Vec<String>, String), UpstreamError> {
        let prompt = format!(
            "Generate clear, actionable acceptance criteria for the following task:\n\n\
             Title: {title}\n\
             Description: {description}\n\n\
             Requirements:\n\
             - Return exactly 3-5 specific, measurable criteria\n\
             - Each criterion should be testable\n\
             - Focus on what \"done\" looks like\n\
             - Format as a JSON array of strings\n\
             - Be concise and specific\n"
        );
        let raw = self.client.call(&self.flash_model, &prompt).await.into_result()?;
        let criteria = CriteriaDecoder.decode(&raw)?;
        Ok((criteria, raw))
    }

    pub async fn code_suggestions(
        &self,
        description: &str,
        context: Option<&str>,
    ) -> Result<(Value, String), UpstreamError> {
        let context = context
            .map(|c| format!("Additional Context: {c}\n\n"))
            .unwrap_or_default();
        let prompt = format!(
            "Generate implementation suggestions for the following task:\n\n\
             Task Description: {description}\n\n\
             {context}\
             Please provide:\n\
             1. High-level implementation approach\n\
             2. Key components or functions needed\n\
             3. Potential challenges and solutions\n\
             4. Best practices to follow\n\n\
             Format response as structured JSON with these keys:\n\
             - \"implementation_approach\": String describing the approach\n\
             - \"key_components\": Array of strings listing components\n\
             - \"challenges_and_solutions\": Array of objects with \"challenge\" and \"solution\" keys\n\
             - \"best_practices\": Array of strings\n"
        );
        let raw = self.client.call(&self.pro_model, &prompt).await.into_result()?;
        let suggestions = SuggestionsDecoder.decode(&raw)?;
        Ok((suggestions, raw))
    }

    /// One cheap round trip to check connectivity.
    pub async fn ping(&self) -> Result<String, UpstreamError> {
        self.client.call(&self.flash_model, PING_PROMPT).await.into_result()
    }
}
