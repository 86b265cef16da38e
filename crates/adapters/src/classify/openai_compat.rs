//! OpenAI-compatible chat-completions classifier

use async_trait::async_trait;
use feedloom_domain::{Classifier, ClassifyError};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ClassifierConfig, build_classification_prompt, match_category};

/// Classifier backed by any OpenAI-compatible endpoint
pub struct OpenAiCompatClassifier {
    client: Client,
    api_key: SecretString,
    base_url: String,
    config: ClassifierConfig,
}

impl OpenAiCompatClassifier {
    pub fn new(
        api_key: SecretString,
        base_url: String,
        config: ClassifierConfig,
    ) -> Result<Self, ClassifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClassifyError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        })
    }

    async fn call_api(&self, prompt: &str) -> Result<String, ClassifyError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You are a content classifier. Reply with one category name."
                        .to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_output_tokens),
        };

        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifyError::Timeout
                } else {
                    ClassifyError::Api(e.to_string())
                }
            })?;

        if response.status() == 429 {
            return Err(ClassifyError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Api(format!(
                "API returned {}: {}",
                status, body
            )));
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::InvalidFormat(e.to_string()))?;

        let text = api_response
            .choices
            .into_iter()
            .filter_map(|c| c.message.content)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ClassifyError::InvalidFormat("Empty response".to_string()));
        }

        Ok(text)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl Classifier for OpenAiCompatClassifier {
    async fn classify(&self, title: &str, description: &str) -> Result<String, ClassifyError> {
        let prompt = build_classification_prompt(title, description, &self.config.categories);

        let mut last_error = None;
        for attempt in 0..=self.config.retries {
            if attempt > 0 {
                tracing::warn!(attempt = attempt, "Retrying classification");
                tokio::time::sleep(Duration::from_millis(500 * 2_u64.pow(attempt))).await;
            }

            match self.call_api(&prompt).await {
                Ok(reply) => {
                    return match_category(&reply, &self.config.categories).ok_or_else(|| {
                        ClassifyError::InvalidFormat(format!(
                            "Reply is not a known category: {}",
                            reply.trim()
                        ))
                    });
                }
                Err(ClassifyError::RateLimited) => {
                    return Err(ClassifyError::RateLimited);
                }
                Err(e) => {
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ClassifyError::Api("Unknown error".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn classifier(server: &MockServer, retries: u32) -> OpenAiCompatClassifier {
        OpenAiCompatClassifier::new(
            SecretString::from("test-key"),
            format!("{}/v1/", server.uri()),
            ClassifierConfig {
                retries,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    #[tokio::test]
    async fn test_reply_is_mapped_to_category() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(reply("design"))
            .expect(1)
            .mount(&server)
            .await;

        let label = classifier(&server, 0)
            .classify("Poster study", "grid systems")
            .await
            .unwrap();
        assert_eq!(label, "Design");
    }

    #[tokio::test]
    async fn test_unknown_label_is_invalid_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(reply("Sports"))
            .mount(&server)
            .await;

        let err = classifier(&server, 0).classify("Match day", "").await.unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidFormat(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let err = classifier(&server, 2).classify("t", "").await.unwrap_err();
        assert!(matches!(err, ClassifyError::RateLimited));
    }
}
