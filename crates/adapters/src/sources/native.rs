//! Platforms that publish their own per-account feed

use super::rsshub::feed_result;
use super::{capture_first, trim_base};
use crate::feed::parse_feed;
use crate::http::HttpClient;
use async_trait::async_trait;
use feedloom_domain::{FetchResult, Platform, SourceAdapter, SourceError};
use regex::Regex;
use std::sync::LazyLock;

static VIMEO_USER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"vimeo\.com/([^/?#]+)").expect("Valid regex"));
static BEHANCE_USER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"behance\.net/([^/?#]+)").expect("Valid regex"));

/// Behance answers 403 when it rate-limits feed readers
const BEHANCE_RATE_LIMIT_STATUS: u16 = 403;

pub struct VimeoAdapter {
    http: HttpClient,
    base_url: String,
}

impl VimeoAdapter {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: trim_base(base_url),
        }
    }
}

#[async_trait]
impl SourceAdapter for VimeoAdapter {
    fn platform(&self) -> Platform {
        Platform::Vimeo
    }

    async fn resolve_identifier(&self, url: &str) -> Option<String> {
        capture_first(&[&VIMEO_USER], url)
    }

    async fn fetch_items(&self, url: &str) -> FetchResult {
        let Some(user) = self.resolve_identifier(url).await else {
            return FetchResult::failed(SourceError::Identification(url.to_string()));
        };

        let feed_url = format!("{}/{}/videos/rss", self.base_url, user);
        match self.http.get(&feed_url).await {
            Ok(response) => feed_result(parse_feed(&response.body, Platform::Vimeo)),
            Err(e) => FetchResult::failed(e.into()),
        }
    }
}

pub struct BehanceAdapter {
    http: HttpClient,
    base_url: String,
}

impl BehanceAdapter {
    pub fn new(http: HttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: trim_base(base_url),
        }
    }
}

#[async_trait]
impl SourceAdapter for BehanceAdapter {
    fn platform(&self) -> Platform {
        Platform::Behance
    }

    async fn resolve_identifier(&self, url: &str) -> Option<String> {
        capture_first(&[&BEHANCE_USER], url)
    }

    async fn fetch_items(&self, url: &str) -> FetchResult {
        let Some(user) = self.resolve_identifier(url).await else {
            return FetchResult::failed(SourceError::Identification(url.to_string()));
        };

        let feed_url = format!("{}/feeds/user?username={}", self.base_url, user);
        match self.http.get(&feed_url).await {
            Ok(response) => feed_result(parse_feed(&response.body, Platform::Behance)),
            Err(e) if e.status() == Some(BEHANCE_RATE_LIMIT_STATUS) => {
                tracing::warn!(user = %user, "Behance rate limited, skipping this cycle");
                FetchResult::empty()
            }
            Err(e) => FetchResult::failed(e.into()),
        }
    }
}
