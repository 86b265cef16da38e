//! Offline keyword-table classifier

use async_trait::async_trait;
use feedloom_domain::{Classifier, ClassifyError};
use serde::{Deserialize, Serialize};

/// Category assigned when any keyword occurs in the title or description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordRule {
    pub category: String,
    pub keywords: Vec<String>,
}

impl KeywordRule {
    pub fn new(category: &str, keywords: &[&str]) -> Self {
        Self {
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

/// First matching rule wins; unmatched text gets the default category
pub struct KeywordClassifier {
    rules: Vec<KeywordRule>,
    default_category: String,
}

impl KeywordClassifier {
    pub fn new(rules: Vec<KeywordRule>, default_category: impl Into<String>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| KeywordRule {
                keywords: rule.keywords.iter().map(|k| k.to_lowercase()).collect(),
                ..rule
            })
            .collect();
        Self {
            rules,
            default_category: default_category.into(),
        }
    }

    pub fn with_default_rules(default_category: impl Into<String>) -> Self {
        Self::new(default_rules(), default_category)
    }
}

pub fn default_rules() -> Vec<KeywordRule> {
    vec![
        KeywordRule::new(
            "Tech",
            &[
                "software",
                "programming",
                "developer",
                "rust",
                "python",
                "machine learning",
                "artificial intelligence",
                "gpu",
                "chip",
                "科技",
                "编程",
                "人工智能",
                "芯片",
                "数码",
            ],
        ),
        KeywordRule::new(
            "Design",
            &[
                "design",
                "typography",
                "illustration",
                "poster",
                "branding",
                "设计",
                "插画",
                "排版",
            ],
        ),
        KeywordRule::new(
            "Culture",
            &[
                "history",
                "philosophy",
                "literature",
                "book",
                "culture",
                "人文",
                "历史",
                "哲学",
                "读书",
                "文化",
            ],
        ),
        KeywordRule::new(
            "Entertainment",
            &[
                "music", "movie", "film", "trailer", "game", "娱乐", "音乐", "电影", "游戏", "综艺",
            ],
        ),
    ]
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, title: &str, description: &str) -> Result<String, ClassifyError> {
        let text = format!("{} {}", title, description).to_lowercase();

        let category = self
            .rules
            .iter()
            .find(|rule| rule.keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|rule| rule.category.clone())
            .unwrap_or_else(|| self.default_category.clone());

        Ok(category)
    }
}
