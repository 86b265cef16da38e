//! Proxied-feed (RSSHub) client and the platforms that rely on it entirely

use super::{capture_first, trim_base};
use crate::feed::{ParsedFeed, is_feed_content, parse_feed};
use crate::http::{HttpClient, HttpError, HttpResponse, RequestOptions};
use async_trait::async_trait;
use feedloom_domain::{FetchResult, Platform, SourceAdapter, SourceError};
use regex::Regex;
use std::sync::LazyLock;

/// Status RSSHub returns when the upstream blocked its scraper
const ANTI_BOT_STATUS: u16 = 503;

static BILIBILI_UID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"space\.bilibili\.com/(\d+)").expect("Valid regex"));
static WEIBO_U: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"weibo\.com/u/(\d+)").expect("Valid regex"));
static WEIBO_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"weibo\.com/(\d+)").expect("Valid regex"));
static DOUYIN_USER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"douyin\.com/user/([A-Za-z0-9_-]+)").expect("Valid regex"));
static USER_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"user/([A-Za-z0-9_-]+)").expect("Valid regex"));

/// Client for an RSSHub instance
#[derive(Clone)]
pub struct RssHub {
    http: HttpClient,
    base_url: String,
}

impl RssHub {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: trim_base(base_url),
        }
    }

    pub fn route_url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    pub async fn get(
        &self,
        route: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, HttpError> {
        self.http.get_with(&self.route_url(route), options).await
    }

    /// Fetch and parse a route in one step
    pub async fn feed(
        &self,
        route: &str,
        platform: Platform,
        options: &RequestOptions,
    ) -> Result<ParsedFeed, SourceError> {
        let response = self.get(route, options).await?;
        Self::parse(response, platform)
    }

    /// Reject non-feed payloads (login walls, error pages) before parsing
    pub fn parse(response: HttpResponse, platform: Platform) -> Result<ParsedFeed, SourceError> {
        if !is_feed_content(response.content_type.as_deref()) {
            return Err(SourceError::Transient(format!(
                "Non-feed content from RSSHub (HTTP {})",
                response.status
            )));
        }
        parse_feed(&response.body, platform)
    }
}

pub(crate) fn feed_result(result: Result<ParsedFeed, SourceError>) -> FetchResult {
    match result {
        Ok(feed) => FetchResult::ok(feed.items),
        Err(e) => FetchResult::failed(e),
    }
}

/// Bilibili: video route, then the dynamic route when the video route is blocked
pub struct BilibiliAdapter {
    rsshub: RssHub,
}

impl BilibiliAdapter {
    pub fn new(rsshub: RssHub) -> Self {
        Self { rsshub }
    }
}

#[async_trait]
impl SourceAdapter for BilibiliAdapter {
    fn platform(&self) -> Platform {
        Platform::Bilibili
    }

    async fn resolve_identifier(&self, url: &str) -> Option<String> {
        capture_first(&[&BILIBILI_UID], url)
    }

    async fn fetch_items(&self, url: &str) -> FetchResult {
        let Some(uid) = self.resolve_identifier(url).await else {
            return FetchResult::failed(SourceError::Identification(url.to_string()));
        };

        let options = RequestOptions::default();
        match self
            .rsshub
            .get(&format!("/bilibili/user/video/{uid}"), &options)
            .await
        {
            Ok(response) => feed_result(RssHub::parse(response, Platform::Bilibili)),
            Err(e) if e.status() == Some(ANTI_BOT_STATUS) => {
                tracing::warn!(uid = %uid, "Bilibili video route blocked, trying dynamic route");
                feed_result(
                    self.rsshub
                        .feed(
                            &format!("/bilibili/user/dynamic/{uid}"),
                            Platform::Bilibili,
                            &options,
                        )
                        .await,
                )
            }
            Err(e) => FetchResult::failed(e.into()),
        }
    }
}

pub struct WeiboAdapter {
    rsshub: RssHub,
}

impl WeiboAdapter {
    pub fn new(rsshub: RssHub) -> Self {
        Self { rsshub }
    }
}

#[async_trait]
impl SourceAdapter for WeiboAdapter {
    fn platform(&self) -> Platform {
        Platform::Weibo
    }

    async fn resolve_identifier(&self, url: &str) -> Option<String> {
        capture_first(&[&WEIBO_U, &WEIBO_BARE], url)
    }

    async fn fetch_items(&self, url: &str) -> FetchResult {
        let Some(uid) = self.resolve_identifier(url).await else {
            return FetchResult::failed(SourceError::Identification(url.to_string()));
        };

        feed_result(
            self.rsshub
                .feed(
                    &format!("/weibo/user/{uid}"),
                    Platform::Weibo,
                    &RequestOptions::default(),
                )
                .await,
        )
    }
}

/// Douyin: share links are resolved by following their redirect
pub struct DouyinAdapter {
    http: HttpClient,
    rsshub: RssHub,
}

impl DouyinAdapter {
    pub fn new(http: HttpClient, rsshub: RssHub) -> Self {
        Self { http, rsshub }
    }
}

#[async_trait]
impl SourceAdapter for DouyinAdapter {
    fn platform(&self) -> Platform {
        Platform::Douyin
    }

    async fn resolve_identifier(&self, url: &str) -> Option<String> {
        if let Some(sec_uid) = capture_first(&[&DOUYIN_USER], url) {
            return Some(sec_uid);
        }

        match self.http.get(url).await {
            Ok(response) => capture_first(&[&USER_PATH], &response.final_url),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Douyin short link did not resolve");
                None
            }
        }
    }

    async fn fetch_items(&self, url: &str) -> FetchResult {
        let Some(sec_uid) = self.resolve_identifier(url).await else {
            return FetchResult::failed(SourceError::Identification(url.to_string()));
        };

        feed_result(
            self.rsshub
                .feed(
                    &format!("/douyin/user/{sec_uid}"),
                    Platform::Douyin,
                    &RequestOptions::default(),
                )
                .await,
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::http::HttpConfig;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn single_attempt_http() -> HttpClient {
        HttpClient::new(HttpConfig {
            retries: 1,
            backoff: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap()
    }

    pub(crate) fn rss(title: &str, links: &[&str]) -> ResponseTemplate {
        let items: String = links
            .iter()
            .map(|l| {
                format!("<item><title>post {l}</title><link>{l}</link><guid>{l}</guid></item>")
            })
            .collect();
        ResponseTemplate::new(200)
            .insert_header("content-type", "application/rss+xml; charset=utf-8")
            .set_body_string(format!(
                "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>{title}</title>{items}</channel></rss>"
            ))
    }

    #[tokio::test]
    async fn test_bilibili_falls_back_once_on_anti_bot_block() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bilibili/user/video/42"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bilibili/user/dynamic/42"))
            .respond_with(rss("UP主", &["https://t.bilibili.com/1"]))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = BilibiliAdapter::new(RssHub::new(single_attempt_http(), &server.uri()));
        let result = adapter.fetch_items("https://space.bilibili.com/42").await;

        assert!(result.last_error.is_none());
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].channel_title.as_deref(), Some("UP主"));
    }

    #[tokio::test]
    async fn test_bilibili_primary_success_skips_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bilibili/user/video/42"))
            .respond_with(rss("UP主", &["https://b23.tv/a", "https://b23.tv/b"]))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bilibili/user/dynamic/42"))
            .respond_with(rss("UP主", &[]))
            .expect(0)
            .mount(&server)
            .await;

        let adapter = BilibiliAdapter::new(RssHub::new(single_attempt_http(), &server.uri()));
        let result = adapter.fetch_items("https://space.bilibili.com/42").await;

        assert_eq!(result.items.len(), 2);
    }

    #[tokio::test]
    async fn test_bilibili_other_errors_do_not_fall_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bilibili/user/video/42"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bilibili/user/dynamic/42"))
            .respond_with(rss("UP主", &[]))
            .expect(0)
            .mount(&server)
            .await;

        let adapter = BilibiliAdapter::new(RssHub::new(single_attempt_http(), &server.uri()));
        let result = adapter.fetch_items("https://space.bilibili.com/42").await;

        assert!(result.is_failure());
    }

    #[tokio::test]
    async fn test_non_feed_content_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weibo/user/1234567"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html>login</html>"),
            )
            .mount(&server)
            .await;

        let adapter = WeiboAdapter::new(RssHub::new(single_attempt_http(), &server.uri()));
        let result = adapter.fetch_items("https://weibo.com/u/1234567").await;

        assert!(result.is_failure());
        let message = result.last_error.unwrap().to_string();
        assert!(message.contains("Non-feed content"), "{message}");
    }

    #[tokio::test]
    async fn test_empty_feed_is_clean() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weibo/user/99"))
            .respond_with(rss("quiet", &[]))
            .mount(&server)
            .await;

        let adapter = WeiboAdapter::new(RssHub::new(single_attempt_http(), &server.uri()));
        let result = adapter.fetch_items("https://weibo.com/99").await;

        assert!(result.items.is_empty());
        assert!(result.last_error.is_none());
    }

    #[tokio::test]
    async fn test_weibo_identifier_shapes() {
        let adapter = WeiboAdapter::new(RssHub::new(single_attempt_http(), "http://unused"));
        assert_eq!(
            adapter.resolve_identifier("https://weibo.com/u/123").await.as_deref(),
            Some("123")
        );
        assert_eq!(
            adapter.resolve_identifier("https://weibo.com/456?tab=home").await.as_deref(),
            Some("456")
        );
        assert!(adapter.resolve_identifier("https://weibo.com/n/name").await.is_none());
    }

    #[tokio::test]
    async fn test_douyin_short_link_follows_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/share/xyz"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/user/MS4wLjAB-x_y", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/MS4wLjAB-x_y"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let http = single_attempt_http();
        let adapter = DouyinAdapter::new(http.clone(), RssHub::new(http, &server.uri()));

        assert_eq!(
            adapter
                .resolve_identifier(&format!("{}/share/xyz", server.uri()))
                .await
                .as_deref(),
            Some("MS4wLjAB-x_y")
        );
        assert_eq!(
            adapter
                .resolve_identifier("https://www.douyin.com/user/abc_123")
                .await
                .as_deref(),
            Some("abc_123")
        );
    }
}
