//! Per-platform source adapters and the registry that selects them
//!
//! Every adapter runs a private primary-then-fallback chain and reports a
//! `FetchResult`. An error is only recorded once the whole chain produced
//! nothing usable.

mod browser;
mod chromium;
mod native;
mod rsshub;
mod twitter;
mod xiaohongshu;
mod youtube;
mod zsxq;

pub use browser::{BrowserCapture, BrowserError, CapturedPage, CommandBrowser, DomNote};
pub use chromium::ChromiumBrowser;
pub use native::{BehanceAdapter, VimeoAdapter};
pub use rsshub::{BilibiliAdapter, DouyinAdapter, RssHub, WeiboAdapter};
pub use twitter::TwitterAdapter;
pub use xiaohongshu::XiaohongshuAdapter;
pub use youtube::YoutubeAdapter;
pub use zsxq::ZsxqAdapter;

use crate::http::HttpClient;
use feedloom_domain::{AdapterRegistry, Platform, SourceAdapter};
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

/// Upstream base URLs, overridable so tests can point at a local server
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub vimeo: String,
    pub behance: String,
    pub youtube: String,
    pub twitter_syndication: String,
    pub zsxq_api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            vimeo: "https://vimeo.com".to_string(),
            behance: "https://www.behance.net".to_string(),
            youtube: "https://www.youtube.com".to_string(),
            twitter_syndication: "https://syndication.twitter.com".to_string(),
            zsxq_api: "https://pub-api.zsxq.com".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct YoutubeConfig {
    /// Metadata extraction tool (yt-dlp compatible)
    pub ytdlp_command: String,
    /// Passed before the generated arguments (cookies, proxy, ...)
    pub extra_args: Vec<String>,
    pub timeout: Duration,
    pub playlist_items: u32,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            ytdlp_command: "yt-dlp".to_string(),
            extra_args: Vec::new(),
            timeout: Duration::from_secs(20),
            playlist_items: 15,
        }
    }
}

#[derive(Debug, Clone)]
pub struct XiaohongshuConfig {
    /// Overall bound on one browser capture
    pub timeout: Duration,
    /// External capture helper used instead of the built-in Chromium driver;
    /// `{url}` and `{cookies}` in args are substituted
    pub browser_command: Option<String>,
    pub browser_args: Vec<String>,
    /// Chrome/Chromium binary for the built-in driver, PATH lookup when unset
    pub chrome_executable: Option<PathBuf>,
    /// Session cookie file. Without it the browser path is skipped.
    pub cookies_path: Option<PathBuf>,
}

impl Default for XiaohongshuConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            browser_command: None,
            browser_args: vec!["{url}".to_string(), "{cookies}".to_string()],
            chrome_executable: None,
            cookies_path: None,
        }
    }
}

/// Everything the adapters need, built once at startup
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Proxied feed service (RSSHub)
    pub rsshub_base_url: String,
    pub endpoints: Endpoints,
    pub youtube: YoutubeConfig,
    pub xiaohongshu: XiaohongshuConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            rsshub_base_url: "http://localhost:1200".to_string(),
            endpoints: Endpoints::default(),
            youtube: YoutubeConfig::default(),
            xiaohongshu: XiaohongshuConfig::default(),
        }
    }
}

/// Registry with one adapter per supported platform
pub struct PlatformRegistry {
    adapters: HashMap<Platform, Arc<dyn SourceAdapter>>,
}

impl PlatformRegistry {
    /// Registry with every built-in adapter sharing one HTTP client
    pub fn new(http: HttpClient, config: &SourceConfig) -> Self {
        let rsshub = RssHub::new(http.clone(), &config.rsshub_base_url);

        let mut registry = Self::empty();
        registry.register(Arc::new(VimeoAdapter::new(
            http.clone(),
            &config.endpoints.vimeo,
        )));
        registry.register(Arc::new(BehanceAdapter::new(
            http.clone(),
            &config.endpoints.behance,
        )));
        registry.register(Arc::new(YoutubeAdapter::new(
            http.clone(),
            &config.endpoints.youtube,
            config.youtube.clone(),
        )));
        registry.register(Arc::new(BilibiliAdapter::new(rsshub.clone())));
        registry.register(Arc::new(WeiboAdapter::new(rsshub.clone())));
        registry.register(Arc::new(DouyinAdapter::new(http.clone(), rsshub.clone())));
        registry.register(Arc::new(TwitterAdapter::new(
            http.clone(),
            &config.endpoints.twitter_syndication,
            rsshub.clone(),
        )));
        registry.register(Arc::new(ZsxqAdapter::new(
            http.clone(),
            &config.endpoints.zsxq_api,
            rsshub.clone(),
        )));

        registry.register(Arc::new(XiaohongshuAdapter::new(
            xiaohongshu_browser(&config.xiaohongshu),
            config.xiaohongshu.cookies_path.clone(),
            rsshub,
        )));

        registry
    }

    pub fn empty() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Register (or replace) the adapter for its platform
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.adapters.keys().copied().collect();
        platforms.sort();
        platforms
    }
}

impl AdapterRegistry for PlatformRegistry {
    fn adapter_for(&self, platform: Platform) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&platform).cloned()
    }
}

/// Configured helper if any, else the built-in driver once a cookie file is set
fn xiaohongshu_browser(config: &XiaohongshuConfig) -> Option<Arc<dyn BrowserCapture>> {
    if let Some(command) = &config.browser_command {
        return Some(Arc::new(CommandBrowser::new(
            command.clone(),
            config.browser_args.clone(),
            config.timeout,
        )));
    }
    config.cookies_path.as_ref()?;
    Some(Arc::new(ChromiumBrowser::new(
        config.chrome_executable.clone(),
        config.timeout,
    )))
}

/// First capture group of the first matching pattern
pub(crate) fn capture_first(patterns: &[&LazyLock<Regex>], text: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    })
}

pub(crate) fn trim_base(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpConfig;

    #[test]
    fn test_registry_covers_every_platform() {
        let http = HttpClient::new(HttpConfig::default()).unwrap();
        let registry = PlatformRegistry::new(http, &SourceConfig::default());

        assert_eq!(registry.platforms(), {
            let mut all = Platform::ALL.to_vec();
            all.sort();
            all
        });
        for platform in Platform::ALL {
            let adapter = registry.adapter_for(platform).unwrap();
            assert_eq!(adapter.platform(), platform);
        }
    }

    #[test]
    fn test_detection_goes_through_registry() {
        let registry = PlatformRegistry::empty();
        assert_eq!(
            registry.detect_platform("https://space.bilibili.com/42"),
            Some(Platform::Bilibili)
        );
        assert!(registry.adapter_for(Platform::Bilibili).is_none());
    }

    #[test]
    fn test_no_browser_without_cookie_file() {
        assert!(xiaohongshu_browser(&XiaohongshuConfig::default()).is_none());
    }

    #[tokio::test]
    async fn test_cookie_file_enables_builtin_chromium() {
        let config = XiaohongshuConfig {
            cookies_path: Some(PathBuf::from("/nonexistent/cookies.json")),
            ..Default::default()
        };
        let browser = xiaohongshu_browser(&config).unwrap();

        let err = browser
            .capture(
                "https://www.xiaohongshu.com/user/profile/abc",
                std::path::Path::new("/nonexistent/cookies.json"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::Cookies { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_configured_helper_wins_over_chromium() {
        let config = XiaohongshuConfig {
            browser_command: Some("sh".to_string()),
            browser_args: vec![
                "-c".to_string(),
                r#"printf '{"final_url":"%s"}' "$1""#.to_string(),
                "helper".to_string(),
                "{url}".to_string(),
            ],
            cookies_path: Some(PathBuf::from("/nonexistent/cookies.json")),
            ..Default::default()
        };
        let browser = xiaohongshu_browser(&config).unwrap();

        let page = browser
            .capture(
                "https://www.xiaohongshu.com/user/profile/abc",
                std::path::Path::new("/nonexistent/cookies.json"),
            )
            .await
            .unwrap();
        assert_eq!(page.final_url, "https://www.xiaohongshu.com/user/profile/abc");
    }
}
