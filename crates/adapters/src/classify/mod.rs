//! Category classifiers

pub mod command;
pub mod keyword;
pub mod openai_compat;

pub use command::CommandClassifier;
pub use keyword::{KeywordClassifier, KeywordRule};
pub use openai_compat::OpenAiCompatClassifier;

use serde::{Deserialize, Serialize};

/// Settings shared by the model-backed classifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Labels a reply must match
    pub categories: Vec<String>,
    pub model: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries on failure
    pub retries: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            max_output_tokens: 16,
            timeout_secs: 30,
            retries: 1,
        }
    }
}

pub fn default_categories() -> Vec<String> {
    ["Tech", "Culture", "Design", "Entertainment", "Other"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

/// Build the single-label classification prompt
pub fn build_classification_prompt(
    title: &str,
    description: &str,
    categories: &[String],
) -> String {
    let mut prompt = String::new();

    prompt.push_str("Classify the following content into exactly one category.\n\n");
    prompt.push_str(&format!("Categories: {}\n\n", categories.join(", ")));
    prompt.push_str(&format!("Title: {}\n", title));
    if !description.trim().is_empty() {
        let preview: String = description.chars().take(500).collect();
        prompt.push_str(&format!("Description: {}\n", preview));
    }
    prompt.push_str("\nReply with the category name only.");

    prompt
}

/// Map a free-form model reply onto one of the configured categories
pub fn match_category(reply: &str, categories: &[String]) -> Option<String> {
    let cleaned = reply
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.' || c == '*')
        .trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Some(exact) = categories.iter().find(|c| c.eq_ignore_ascii_case(cleaned)) {
        return Some(exact.clone());
    }

    let lowered = cleaned.to_lowercase();
    categories
        .iter()
        .find(|c| lowered.contains(&c.to_lowercase()))
        .cloned()
}
