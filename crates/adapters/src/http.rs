//! Shared HTTP client with bounded retry
//!
//! Every network attempt made by a source adapter goes through here. Retries
//! wrap a single request, never a whole fallback chain.

use feedloom_domain::SourceError;
use reqwest::{Client, header};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// HTTP behaviour shared by all adapters
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// Attempt budget per request (at least one)
    pub retries: u32,
    /// Delay unit between attempts; the n-th retry waits `n * backoff`
    pub backoff: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 2,
            backoff: Duration::from_millis(800),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HttpError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Request to {0} timed out")]
    Timeout(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP client setup failed: {0}")]
    Build(String),
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Worth another attempt: connection trouble, timeouts, 429 and 5xx
    fn is_retryable(&self) -> bool {
        match self {
            HttpError::Status { status, .. } => *status == 429 || *status >= 500,
            HttpError::Timeout(_) | HttpError::Network(_) => true,
            HttpError::Build(_) => false,
        }
    }
}

impl From<HttpError> for SourceError {
    fn from(e: HttpError) -> Self {
        SourceError::Transient(e.to_string())
    }
}

/// Per-request overrides
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(&'static str, String)>,
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
}

impl RequestOptions {
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

/// Successful response, body already read
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// URL after redirects
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: String,
}

/// reqwest client plus retry policy
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpConfig,
}

impl HttpClient {
    pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("en-US,en;q=0.5"),
        );

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        self.get_with(url, &RequestOptions::default()).await
    }

    /// GET with retry. The final attempt's error is returned.
    pub async fn get_with(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, HttpError> {
        let attempts = options.retries.unwrap_or(self.config.retries).max(1);
        let mut attempt = 0;

        loop {
            tracing::debug!(url = %url, attempt = attempt + 1, attempts, "HTTP GET");

            match self.get_once(url, options).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt + 1 < attempts && e.is_retryable() => {
                    attempt += 1;
                    tracing::debug!(url = %url, error = %e, attempt, "Retrying request");
                    tokio::time::sleep(self.config.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, HttpError> {
        let mut request = self.client.get(url);
        for (name, value) in &options.headers {
            request = request.header(*name, value);
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| map_reqwest(url, e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());

        let body = response.text().await.map_err(|e| map_reqwest(url, e))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            final_url,
            content_type,
            body,
        })
    }
}

fn map_reqwest(url: &str, e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        HttpError::Timeout(url.to_string())
    } else {
        HttpError::Network(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_matcher, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(retries: u32) -> HttpClient {
        HttpClient::new(HttpConfig {
            retries,
            backoff: Duration::from_millis(5),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/rss+xml")
                    .set_body_string("<rss/>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let response = client(3)
            .get(&format!("{}/feed", server.uri()))
            .await
            .unwrap();

        assert_eq!(response.body, "<rss/>");
        assert_eq!(
            response.content_type.as_deref(),
            Some("application/rss+xml")
        );
    }

    #[tokio::test]
    async fn test_final_error_propagates_after_budget() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(2)
            .get(&format!("{}/down", server.uri()))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(3)
            .get(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert!(matches!(
            SourceError::from(err),
            SourceError::Transient(_)
        ));
    }

    #[tokio::test]
    async fn test_per_request_headers_and_attempts() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api"))
            .and(header_matcher("origin", "https://wx.zsxq.com"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let options = RequestOptions::default()
            .header("Origin", "https://wx.zsxq.com")
            .retries(1);
        let result = client(3)
            .get_with(&format!("{}/api", server.uri()), &options)
            .await;

        assert!(result.is_err());
    }
}
