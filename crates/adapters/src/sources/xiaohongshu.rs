//! Xiaohongshu: cookie-authenticated browser capture, proxied feed as last resort

use super::browser::{BrowserCapture, CapturedPage, DomNote};
use super::capture_first;
use super::rsshub::RssHub;
use crate::feed::MAX_FEED_ENTRIES;
use crate::http::RequestOptions;
use async_trait::async_trait;
use feedloom_domain::dates::canonical;
use feedloom_domain::{FetchResult, ItemKey, Platform, RawItem, SourceAdapter, SourceError};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use time::OffsetDateTime;

static PROFILE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"user/profile/([a-zA-Z0-9]+)").expect("Valid regex"));
static BARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"xiaohongshu\.com/([a-zA-Z0-9]+)").expect("Valid regex"));
static NOTE_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/([a-f0-9]{24})(?:\?|$)").expect("Valid regex"));
static EXPLORE_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/explore/([a-f0-9]+)").expect("Valid regex"));

const UNTITLED: &str = "(无标题)";
const PINNED_BADGE: &str = "置顶";
const RSSHUB_TIMEOUT: Duration = Duration::from_secs(6);

pub struct XiaohongshuAdapter {
    browser: Option<Arc<dyn BrowserCapture>>,
    cookies_path: Option<PathBuf>,
    rsshub: RssHub,
}

impl XiaohongshuAdapter {
    pub fn new(
        browser: Option<Arc<dyn BrowserCapture>>,
        cookies_path: Option<PathBuf>,
        rsshub: RssHub,
    ) -> Self {
        Self {
            browser,
            cookies_path,
            rsshub,
        }
    }

    /// Browser path result: items, or the error that ended it
    async fn fetch_via_browser(
        &self,
        browser: &dyn BrowserCapture,
        cookies: &std::path::Path,
        user_id: &str,
    ) -> Result<Vec<RawItem>, SourceError> {
        let profile_url = format!("https://www.xiaohongshu.com/user/profile/{user_id}");
        let page = browser
            .capture(&profile_url, cookies)
            .await
            .map_err(|e| SourceError::Transient(e.to_string()))?;

        if page.final_url.contains("captcha") || page.final_url.contains("login") {
            return Err(SourceError::Auth(
                "Xiaohongshu cookies expired (login/captcha redirect), log in again to refresh the cookie file"
                    .to_string(),
            ));
        }

        let from_api = api_notes_to_items(&page);
        if !from_api.is_empty() {
            return Ok(from_api);
        }
        Ok(dom_notes_to_items(&page))
    }

    fn session(&self) -> Option<(&dyn BrowserCapture, &std::path::Path)> {
        let browser = self.browser.as_deref()?;
        let cookies = self.cookies_path.as_deref()?;
        cookies.exists().then_some((browser, cookies))
    }
}

#[async_trait]
impl SourceAdapter for XiaohongshuAdapter {
    fn platform(&self) -> Platform {
        Platform::Xiaohongshu
    }

    async fn resolve_identifier(&self, url: &str) -> Option<String> {
        capture_first(&[&PROFILE_ID, &BARE_ID], url)
    }

    async fn fetch_items(&self, url: &str) -> FetchResult {
        let Some(user_id) = self.resolve_identifier(url).await else {
            return FetchResult::failed(SourceError::Identification(url.to_string()));
        };

        let mut auth_error = None;
        if let Some((browser, cookies)) = self.session() {
            match self.fetch_via_browser(browser, cookies, &user_id).await {
                Ok(items) if !items.is_empty() => return FetchResult::ok(items),
                Ok(_) => {
                    tracing::warn!(user_id = %user_id, "Browser capture found no notes, trying RSSHub");
                }
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "Browser capture failed, trying RSSHub");
                    if e.is_actionable() {
                        auth_error = Some(e);
                    }
                }
            }
        }

        let options = RequestOptions::default()
            .timeout(RSSHUB_TIMEOUT)
            .retries(1);
        let fallback = self
            .rsshub
            .feed(
                &format!("/xiaohongshu/user/{user_id}/notes"),
                Platform::Xiaohongshu,
                &options,
            )
            .await;

        match (fallback, auth_error) {
            (Ok(feed), _) if !feed.items.is_empty() => FetchResult::ok(feed.items),
            (_, Some(auth)) => FetchResult::failed(auth),
            (Ok(feed), None) => FetchResult::ok(feed.items),
            (Err(e), None) => FetchResult::failed(e),
        }
    }
}

fn note_item(note_id: &str, title: &str) -> RawItem {
    let title = if title.trim().is_empty() {
        UNTITLED
    } else {
        title.trim()
    };
    RawItem::new(
        ItemKey::hashed(Platform::Xiaohongshu, note_id),
        title,
        format!("https://www.xiaohongshu.com/explore/{note_id}"),
    )
    .with_meta("note_id", note_id)
}

fn api_notes_to_items(page: &CapturedPage) -> Vec<RawItem> {
    page.api_notes
        .iter()
        .take(MAX_FEED_ENTRIES)
        .filter_map(|note| {
            let note_id = note.get("note_id").and_then(Value::as_str)?;
            if note_id.is_empty() {
                return None;
            }

            let title = note
                .get("display_title")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let millis = ["time", "last_update_time"]
                .iter()
                .filter_map(|f| note.get(*f).and_then(Value::as_i64))
                .find(|ms| *ms > 0);
            let pub_date = millis
                .and_then(|ms| {
                    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
                })
                .map(canonical);
            let author = note
                .pointer("/user/nickname")
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .or_else(|| page.author.clone());
            let cover_url = note
                .pointer("/cover/url")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let liked = note.get("liked_count").cloned().unwrap_or(Value::Null);

            Some(
                note_item(note_id, title)
                    .with_pub_date(pub_date)
                    .with_channel_title(author)
                    .with_meta("cover_url", cover_url)
                    .with_meta("liked_count", liked),
            )
        })
        .collect()
}

fn dom_notes_to_items(page: &CapturedPage) -> Vec<RawItem> {
    let author = page.author.as_deref().map(str::trim).unwrap_or_default();
    let mut seen = HashSet::new();

    page.dom_notes
        .iter()
        .filter_map(|note| {
            let note_id = capture_first(&[&NOTE_HREF, &EXPLORE_HREF], &note.href)?;
            seen.insert(note_id.clone()).then_some((note_id, note))
        })
        .take(MAX_FEED_ENTRIES)
        .map(|(note_id, note)| {
            note_item(&note_id, &dom_title(note, author))
                .with_channel_title(page.author.clone())
        })
        .collect()
}

/// Card text is `[置顶]\ntitle\nauthor\nlikes`; keep the first real line
fn dom_title(note: &DomNote, author: &str) -> String {
    note.text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .find(|line| {
            *line != PINNED_BADGE
                && !line.chars().all(|c| c.is_ascii_digit())
                && (author.is_empty() || *line != author)
        })
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::browser::BrowserError;
    use crate::sources::rsshub::tests::{rss, single_attempt_http};
    use serde_json::json;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FakeBrowser {
        page: Result<CapturedPage, String>,
        calls: AtomicUsize,
    }

    impl FakeBrowser {
        fn returning(page: CapturedPage) -> Arc<Self> {
            Arc::new(Self {
                page: Ok(page),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl BrowserCapture for FakeBrowser {
        async fn capture(&self, url: &str, _cookies: &Path) -> Result<CapturedPage, BrowserError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(url.ends_with("/user/profile/5a1b2c"));
            self.page.clone().map_err(BrowserError::Failed)
        }
    }

    const PROFILE: &str = "https://www.xiaohongshu.com/user/profile/5a1b2c";

    fn adapter(
        server: &MockServer,
        browser: Option<Arc<FakeBrowser>>,
        cookies: Option<&NamedTempFile>,
    ) -> XiaohongshuAdapter {
        XiaohongshuAdapter::new(
            browser.map(|b| b as Arc<dyn BrowserCapture>),
            cookies.map(|c| c.path().to_path_buf()),
            RssHub::new(single_attempt_http(), &server.uri()),
        )
    }

    async fn mount_rsshub(server: &MockServer, response: ResponseTemplate, expected: u64) {
        Mock::given(method("GET"))
            .and(path("/xiaohongshu/user/5a1b2c/notes"))
            .respond_with(response)
            .expect(expected)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_intercepted_notes_win() {
        let server = MockServer::start().await;
        mount_rsshub(&server, rss("unused", &[]), 0).await;
        let cookies = NamedTempFile::new().unwrap();

        let browser = FakeBrowser::returning(CapturedPage {
            final_url: PROFILE.to_string(),
            author: Some("Mei".to_string()),
            api_notes: vec![
                json!({
                    "note_id": "64f0a1",
                    "display_title": "Autumn palette",
                    "time": 1_700_000_000_000_i64,
                    "cover": {"url": "https://img/1.jpg"},
                    "user": {"nickname": "Mei Studio"},
                    "liked_count": "1.2万"
                }),
                json!({"note_id": "64f0a2"}),
            ],
            dom_notes: vec![DomNote {
                href: "/explore/ffffffffffffffffffffffff".to_string(),
                text: "ignored".to_string(),
            }],
        });

        let result = adapter(&server, Some(browser.clone()), Some(&cookies))
            .fetch_items(PROFILE)
            .await;

        assert_eq!(browser.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].title, "Autumn palette");
        assert_eq!(result.items[0].pub_date.as_deref(), Some("2023-11-14T22:13:20Z"));
        assert_eq!(result.items[0].channel_title.as_deref(), Some("Mei Studio"));
        assert_eq!(result.items[0].link, "https://www.xiaohongshu.com/explore/64f0a1");
        assert_eq!(result.items[1].title, UNTITLED);
        assert_eq!(result.items[1].channel_title.as_deref(), Some("Mei"));
    }

    #[tokio::test]
    async fn test_dom_notes_when_nothing_intercepted() {
        let server = MockServer::start().await;
        mount_rsshub(&server, rss("unused", &[]), 0).await;
        let cookies = NamedTempFile::new().unwrap();

        let note_id = "0123456789abcdef01234567";
        let browser = FakeBrowser::returning(CapturedPage {
            final_url: PROFILE.to_string(),
            author: Some("Mei".to_string()),
            api_notes: vec![],
            dom_notes: vec![
                DomNote {
                    href: format!("/user/profile/5a1b2c/{note_id}?xsec=1"),
                    text: "置顶\nWinter sketches\nMei\n233".to_string(),
                },
                DomNote {
                    href: format!("/explore/{note_id}"),
                    text: "duplicate".to_string(),
                },
                DomNote {
                    href: "/user/profile/5a1b2c".to_string(),
                    text: "not a note".to_string(),
                },
            ],
        });

        let result = adapter(&server, Some(browser), Some(&cookies))
            .fetch_items(PROFILE)
            .await;

        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].title, "Winter sketches");
        assert_eq!(result.items[0].metadata["note_id"], note_id);
    }

    #[tokio::test]
    async fn test_login_redirect_is_actionable_when_fallback_fails() {
        let server = MockServer::start().await;
        mount_rsshub(&server, ResponseTemplate::new(503), 1).await;
        let cookies = NamedTempFile::new().unwrap();

        let browser = FakeBrowser::returning(CapturedPage {
            final_url: "https://www.xiaohongshu.com/login?redirect=profile".to_string(),
            ..Default::default()
        });

        let result = adapter(&server, Some(browser), Some(&cookies))
            .fetch_items(PROFILE)
            .await;

        assert!(result.is_failure());
        let error = result.last_error.unwrap();
        assert!(error.is_actionable());
        assert!(matches!(error, SourceError::Auth(_)));
    }

    #[tokio::test]
    async fn test_login_redirect_recovered_by_fallback() {
        let server = MockServer::start().await;
        mount_rsshub(
            &server,
            rss("Mei", &["https://www.xiaohongshu.com/explore/1"]),
            1,
        )
        .await;
        let cookies = NamedTempFile::new().unwrap();

        let browser = FakeBrowser::returning(CapturedPage {
            final_url: "https://www.xiaohongshu.com/website-login/captcha".to_string(),
            ..Default::default()
        });

        let result = adapter(&server, Some(browser), Some(&cookies))
            .fetch_items(PROFILE)
            .await;

        assert_eq!(result.items.len(), 1);
        assert!(result.last_error.is_none());
    }

    #[tokio::test]
    async fn test_without_cookies_browser_is_skipped() {
        let server = MockServer::start().await;
        mount_rsshub(
            &server,
            rss("Mei", &["https://www.xiaohongshu.com/explore/1"]),
            1,
        )
        .await;

        let browser = FakeBrowser::returning(CapturedPage::default());
        let result = adapter(&server, Some(browser.clone()), None)
            .fetch_items(PROFILE)
            .await;

        assert_eq!(browser.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.items.len(), 1);
    }

    #[tokio::test]
    async fn test_browser_crash_falls_back_to_generic_error() {
        let server = MockServer::start().await;
        mount_rsshub(&server, ResponseTemplate::new(500), 1).await;
        let cookies = NamedTempFile::new().unwrap();

        let browser = Arc::new(FakeBrowser {
            page: Err("chromium crashed".to_string()),
            calls: AtomicUsize::new(0),
        });

        let result = adapter(&server, Some(browser), Some(&cookies))
            .fetch_items(PROFILE)
            .await;

        assert!(result.is_failure());
        assert!(!result.last_error.unwrap().is_actionable());
    }
}
