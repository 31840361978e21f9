use serde::{Deserialize, Serialize};
use serde_json::Value;

// generateContent request body
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

impl GenerateContentRequest {
    pub fn from_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        }
    }
}

// generateContent success envelope
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    // candidates[0].content.parts[0].text
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .parts
            .first()
            .map(|part| part.text.as_str())
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Candidate {
    pub content: Content,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

// Inbound AI route payloads
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AcceptanceCriteriaRequest {
    #[serde(default)]
    pub task_title: String,
    #[serde(default)]
    pub task_description: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct CodeSuggestionsRequest {
    #[serde(default)]
    pub task_description: String,
    pub context: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct AcceptanceCriteriaResponse {
    pub success: bool,
    pub criteria: Vec<String>,
    pub raw_response: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct CodeSuggestionsResponse {
    pub success: bool,
    pub suggestions: Value,
    pub raw_response: String,
}
