use serde_json::{Map, Value, json};

use crate::upstream::UpstreamError;

// strict JSON first, then line scanning
pub trait ResponseDecoder {
    type Output;

    fn decode(&self, text: &str) -> Result<Self::Output, UpstreamError>;
}

pub struct CriteriaDecoder;

impl ResponseDecoder for CriteriaDecoder {
    type Output = Vec<String>;

    fn decode(&self, text: &str) -> Result<Vec<String>, UpstreamError> {
        let criteria = match strict_json(text) {
            Some(Value::Array(items)) => strings(items),
            Some(Value::Object(mut map)) => match map.remove("criteria") {
                Some(Value::Array(items)) => strings(items),
                _ => bullets(text),
            },
            _ => bullets(text),
        };
        Ok(criteria)
    }
}

pub struct SuggestionsDecoder;

impl ResponseDecoder for SuggestionsDecoder {
    type Output = Value;

    fn decode(&self, text: &str) -> Result<Value, UpstreamError> {
        match strict_json(text) {
            Some(value @ Value::Object(_)) => Ok(value),
            _ => Ok(scan_sections(text)),
        }
    }
}

// Strips a surrounding ``` fence, then parses when it looks like JSON.
fn strict_json(text: &str) -> Option<Value> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        body = rest.trim_end().strip_suffix("```").unwrap_or(rest).trim();
    }
    if !(body.starts_with('[') || body.starts_with('{')) {
        return None;
    }
    serde_json::from_str(body).ok()
}

fn strings(items: Vec<Value>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect()
}

fn bullet_item(line: &str) -> Option<&str> {
    line.strip_prefix('-')
        .or_else(|| line.strip_prefix('*'))
        .or_else(|| line.strip_prefix('•'))
        .map(str::trim)
}

fn bullets(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| bullet_item(line.trim()))
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Approach,
    Components,
    Challenges,
    Practices,
}

fn section_header(line: &str) -> Option<Section> {
    let lower = line.to_lowercase();
    if lower.contains("implementation approach") {
        Some(Section::Approach)
    } else if lower.contains("key component") {
        Some(Section::Components)
    } else if lower.contains("challenge") {
        Some(Section::Challenges)
    } else if lower.contains("best practice") {
        Some(Section::Practices)
    } else {
        None
    }
}

fn scan_sections(text: &str) -> Value {
    let mut approach: Vec<&str> = Vec::new();
    let mut components = Vec::new();
    let mut practices = Vec::new();
    let mut section = None;

    for line in text.lines().map(str::trim) {
        if let Some(header) = section_header(line) {
            section = Some(header);
            continue;
        }
        let Some(item) = bullet_item(line) else {
            continue;
        };
        match section {
            Some(Section::Approach) => approach.push(item),
            Some(Section::Components) => components.push(Value::from(item)),
            Some(Section::Practices) => practices.push(Value::from(item)),
            // challenge/solution pairs have no reliable line shape
            Some(Section::Challenges) | None => {}
        }
    }

    let mut out = Map::new();
    out.insert("implementation_approach".into(), Value::from(approach.join(" ")));
    out.insert("key_components".into(), Value::Array(components));
    out.insert("challenges_and_solutions".into(), json!([]));
    out.insert("best_practices".into(), Value::Array(practices));
    Value::Object(out)
}
