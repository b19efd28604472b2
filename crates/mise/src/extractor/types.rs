//! Extraction result types and model output parsing

use serde::Deserialize;

use crate::error::{MiseError, Result};

/// Whether an utterance asks for the assistant's primary task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Category {
    #[serde(rename = "primary_task", alias = "recipe_rec")]
    PrimaryTask,
    #[serde(rename = "other")]
    Other,
}

/// Structured signal extracted from one utterance
#[derive(Debug, Clone, PartialEq)]
pub struct CategorizationResult {
    pub category: Category,
    /// Facts about the user, each phrased with a sentiment word
    pub relevant_info: Vec<String>,
    /// Answer produced for non-task utterances
    pub direct_answer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategorizeJson {
    category: Category,
    relevant_info: Vec<String>,
    answer: String,
}

#[derive(Debug, Deserialize)]
struct FactsJson {
    relevant_info: Vec<String>,
}

/// Strip a surrounding Markdown code fence, if any
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn clean_facts(facts: Vec<String>) -> Vec<String> {
    facts
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

fn parse_json<'a, T: Deserialize<'a>>(text: &'a str) -> Result<T> {
    serde_json::from_str(strip_code_fence(text))
        .map_err(|e| MiseError::MalformedModelOutput(format!("{e}: {}", preview(text))))
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Parse a full categorization response
pub fn parse_categorization(text: &str) -> Result<CategorizationResult> {
    let raw: CategorizeJson = parse_json(text)?;
    let answer = raw.answer.trim();

    Ok(CategorizationResult {
        category: raw.category,
        relevant_info: clean_facts(raw.relevant_info),
        direct_answer: (!answer.is_empty()).then(|| answer.to_string()),
    })
}

/// Parse a facts-only response
pub fn parse_facts(text: &str) -> Result<Vec<String>> {
    let raw: FactsJson = parse_json(text)?;
    Ok(clean_facts(raw.relevant_info))
}
