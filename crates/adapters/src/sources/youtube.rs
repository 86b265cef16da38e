//! YouTube: metadata-extraction tool first, channel Atom feed as fallback

use super::{YoutubeConfig, capture_first, trim_base};
use crate::feed::parse_feed_keyed;
use crate::http::{HttpClient, RequestOptions};
use async_trait::async_trait;
use feedloom_domain::dates::canonical;
use feedloom_domain::{FetchResult, ItemKey, Platform, RawItem, SourceAdapter, SourceError};
use regex::Regex;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use time::macros::format_description;
use time::{Date, Time};
use tokio::process::Command;

static HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"youtube\.com/(@[\w-]+)").expect("Valid regex"));
static CHANNEL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/channel/([\w-]+)").expect("Valid regex"));
static CUSTOM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/c/([\w-]+)").expect("Valid regex"));
static EXTERNAL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""externalId":"([A-Za-z0-9_-]+)""#).expect("Valid regex"));
static BROWSE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""browseId":"(UC[A-Za-z0-9_-]+)""#).expect("Valid regex"));

const SEPARATOR: &str = "|||";
const PRINT_FORMAT: &str = "%(id)s|||%(title)s|||%(upload_date)s|||%(duration)s|||%(view_count)s|||%(channel)s|||%(description).500s";
const CHANNEL_PAGE_TIMEOUT: Duration = Duration::from_secs(12);

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChannelRef {
    /// `@handle`, kept with its `@`
    Handle(String),
    /// `UC...` channel id
    Id(String),
    /// Legacy `/c/name` URL
    Custom(String),
}

impl ChannelRef {
    fn parse(url: &str) -> Option<Self> {
        if let Some(handle) = capture_first(&[&HANDLE], url) {
            return Some(ChannelRef::Handle(handle));
        }
        if let Some(id) = capture_first(&[&CHANNEL_ID], url) {
            return Some(ChannelRef::Id(id));
        }
        capture_first(&[&CUSTOM_NAME], url).map(ChannelRef::Custom)
    }

    fn path(&self) -> String {
        match self {
            ChannelRef::Handle(handle) => handle.clone(),
            ChannelRef::Id(id) => format!("channel/{id}"),
            ChannelRef::Custom(name) => format!("c/{name}"),
        }
    }

    fn identifier(&self) -> String {
        match self {
            ChannelRef::Handle(v) | ChannelRef::Id(v) | ChannelRef::Custom(v) => v.clone(),
        }
    }
}

#[derive(Debug, Error)]
enum ExtractError {
    #[error("{0} not found")]
    Missing(String),
    #[error("metadata extraction timed out after {0:?}")]
    Timeout(Duration),
    #[error("metadata extraction failed: {0}")]
    Failed(String),
}

pub struct YoutubeAdapter {
    http: HttpClient,
    base_url: String,
    config: YoutubeConfig,
}

impl YoutubeAdapter {
    pub fn new(http: HttpClient, base_url: &str, config: YoutubeConfig) -> Self {
        Self {
            http,
            base_url: trim_base(base_url),
            config,
        }
    }

    async fn run_extractor(&self, videos_url: &str) -> Result<Vec<RawItem>, ExtractError> {
        let mut command = Command::new(&self.config.ytdlp_command);
        command
            .args(&self.config.extra_args)
            .arg("--print")
            .arg(PRINT_FORMAT)
            .arg("--playlist-items")
            .arg(format!("1:{}", self.config.playlist_items))
            .arg("--no-warnings")
            .arg(videos_url)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        tracing::debug!(command = %self.config.ytdlp_command, url = %videos_url, "Running metadata extractor");

        let output = match tokio::time::timeout(self.config.timeout, command.output()).await {
            Err(_) => return Err(ExtractError::Timeout(self.config.timeout)),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ExtractError::Missing(self.config.ytdlp_command.clone()));
            }
            Ok(Err(e)) => return Err(ExtractError::Failed(e.to_string())),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr: String = String::from_utf8_lossy(&output.stderr)
                .trim()
                .chars()
                .take(200)
                .collect();
            return Err(ExtractError::Failed(if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            }));
        }

        Ok(parse_extractor_output(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    async fn fetch_via_feed(&self, channel: &ChannelRef) -> Result<Vec<RawItem>, SourceError> {
        let channel_id = match channel {
            ChannelRef::Id(id) => id.clone(),
            other => self.lookup_channel_id(other).await?,
        };

        let feed_url = format!(
            "{}/feeds/videos.xml?channel_id={}",
            self.base_url, channel_id
        );
        let response = self.http.get(&feed_url).await?;
        let feed = parse_feed_keyed(&response.body, Platform::Youtube, entry_key)?;
        Ok(feed.items)
    }

    /// Scrape the channel page for its `UC...` id
    async fn lookup_channel_id(&self, channel: &ChannelRef) -> Result<String, SourceError> {
        let page_url = format!("{}/{}", self.base_url, channel.path());
        let options = RequestOptions::default()
            .timeout(CHANNEL_PAGE_TIMEOUT)
            .retries(2);
        let page = self.http.get_with(&page_url, &options).await?;

        capture_first(&[&EXTERNAL_ID, &BROWSE_ID], &page.body).ok_or_else(|| {
            SourceError::Parse(format!("No channel id found on {}", channel.path()))
        })
    }
}

#[async_trait]
impl SourceAdapter for YoutubeAdapter {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    async fn resolve_identifier(&self, url: &str) -> Option<String> {
        ChannelRef::parse(url).map(|c| c.identifier())
    }

    async fn fetch_items(&self, url: &str) -> FetchResult {
        let Some(channel) = ChannelRef::parse(url) else {
            return FetchResult::failed(SourceError::Identification(url.to_string()));
        };

        let videos_url = format!("{}/{}/videos", self.base_url, channel.path());
        let primary_error = match self.run_extractor(&videos_url).await {
            Ok(items) => return FetchResult::ok(items),
            Err(e) => e,
        };

        tracing::warn!(
            channel = %channel.identifier(),
            error = %primary_error,
            "Metadata extractor failed, trying channel feed"
        );

        match self.fetch_via_feed(&channel).await {
            Ok(items) if !items.is_empty() => FetchResult::ok(items),
            Ok(_) => FetchResult::failed(SourceError::Transient(primary_error.to_string())),
            Err(e) => {
                tracing::warn!(channel = %channel.identifier(), error = %e, "Channel feed fallback failed");
                FetchResult::failed(SourceError::Transient(primary_error.to_string()))
            }
        }
    }
}

/// Atom entries carry `yt:video:<id>`; key them like extractor output
fn entry_key(id: &str, link: &str) -> ItemKey {
    match id.strip_prefix("yt:video:") {
        Some(video_id) => ItemKey::native(Platform::Youtube, video_id),
        None if id.is_empty() => ItemKey::hashed(Platform::Youtube, link),
        None => ItemKey::hashed(Platform::Youtube, id),
    }
}

fn parse_extractor_output(stdout: &str) -> Vec<RawItem> {
    stdout
        .lines()
        .filter(|line| line.contains(SEPARATOR))
        .filter_map(|line| {
            let parts: Vec<&str> = line.splitn(7, SEPARATOR).collect();
            if parts.len() < 6 {
                return None;
            }

            let video_id = parts[0].trim();
            if video_id.is_empty() || video_id == "NA" {
                return None;
            }
            let channel = not_available(parts[5]);
            let description = parts.get(6).copied().and_then(not_available);

            Some(
                RawItem::new(
                    ItemKey::native(Platform::Youtube, video_id),
                    parts[1].trim(),
                    format!("https://www.youtube.com/watch?v={video_id}"),
                )
                .with_description(description.unwrap_or_default())
                .with_pub_date(parse_upload_date(parts[2]))
                .with_channel_title(channel.clone())
                .with_meta("video_id", video_id)
                .with_meta("duration", parse_count(parts[3]))
                .with_meta("view_count", parse_count(parts[4]))
                .with_meta("channel", channel.unwrap_or_default()),
            )
        })
        .collect()
}

fn not_available(field: &str) -> Option<String> {
    let field = field.trim();
    (!field.is_empty() && field != "NA").then(|| field.to_string())
}

/// `YYYYMMDD` to a canonical midnight-UTC timestamp
fn parse_upload_date(raw: &str) -> Option<String> {
    let date = Date::parse(raw.trim(), format_description!("[year][month][day]")).ok()?;
    Some(canonical(date.with_time(Time::MIDNIGHT).assume_utc()))
}

fn parse_count(raw: &str) -> i64 {
    raw.trim().parse::<f64>().map(|v| v as i64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::rsshub::tests::single_attempt_http;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer, script: &str, timeout: Duration) -> YoutubeAdapter {
        YoutubeAdapter::new(
            single_attempt_http(),
            &server.uri(),
            YoutubeConfig {
                ytdlp_command: "sh".to_string(),
                extra_args: vec!["-c".to_string(), script.to_string(), "yt-dlp".to_string()],
                timeout,
                playlist_items: 15,
            },
        )
    }

    fn atom(video_id: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "application/atom+xml")
            .set_body_string(format!(
                r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Loud Channel</title>
  <id>yt:channel:UCabc</id>
  <updated>2024-01-16T00:00:00Z</updated>
  <entry>
    <id>yt:video:{video_id}</id>
    <title>From the feed</title>
    <link href="https://www.youtube.com/watch?v={video_id}"/>
    <published>2024-01-15T08:00:00+00:00</published>
    <updated>2024-01-15T08:00:00+00:00</updated>
  </entry>
</feed>"#
            ))
    }

    #[test]
    fn test_channel_refs() {
        assert_eq!(
            ChannelRef::parse("https://www.youtube.com/@loud-channel/videos"),
            Some(ChannelRef::Handle("@loud-channel".to_string()))
        );
        assert_eq!(
            ChannelRef::parse("https://www.youtube.com/channel/UC_x5XG1OV2P6uZZ5FSM9Ttw"),
            Some(ChannelRef::Id("UC_x5XG1OV2P6uZZ5FSM9Ttw".to_string()))
        );
        assert_eq!(
            ChannelRef::parse("https://www.youtube.com/c/LegacyName").map(|c| c.path()),
            Some("c/LegacyName".to_string())
        );
        assert_eq!(ChannelRef::parse("https://youtu.be/dQw4w9WgXcQ"), None);
    }

    #[test]
    fn test_parse_extractor_output() {
        let stdout = "abc123|||First video|||20240115|||212|||1000|||Loud Channel|||Hello there\n\
                      too|||short\n\
                      xyz789|||Second|||NA|||NA|||NA|||Loud Channel|||\n";
        let items = parse_extractor_output(stdout);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key.as_str(), "youtube_abc123");
        assert_eq!(items[0].link, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(items[0].pub_date.as_deref(), Some("2024-01-15T00:00:00Z"));
        assert_eq!(items[0].description, "Hello there");
        assert_eq!(items[0].channel_title.as_deref(), Some("Loud Channel"));
        assert_eq!(items[0].metadata["duration"], 212);
        assert_eq!(items[0].metadata["view_count"], 1000);

        assert!(items[1].pub_date.is_none());
        assert_eq!(items[1].metadata["duration"], 0);
    }

    #[test]
    fn test_feed_entry_without_id_keys_by_link() {
        let body = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>Loud</title>
  <entry><title>No id here</title><link href="https://www.youtube.com/watch?v=q9"/></entry>
</feed>"#;
        let feed = parse_feed_keyed(body, Platform::Youtube, entry_key).unwrap();

        assert_eq!(
            feed.items[0].key,
            ItemKey::hashed(Platform::Youtube, "https://www.youtube.com/watch?v=q9")
        );
        assert_eq!(entry_key("yt:video:q9", "").as_str(), "youtube_q9");
    }

    #[test]
    fn test_description_may_contain_separator() {
        let items = parse_extractor_output("id1|||t|||20240101|||1|||2|||ch|||a ||| b\n");
        assert_eq!(items[0].description, "a ||| b");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extractor_success_skips_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feeds/videos.xml"))
            .respond_with(atom("unused"))
            .expect(0)
            .mount(&server)
            .await;

        let script = r#"case "$*" in
  *"--playlist-items 1:15"*"/@loud/videos"*) printf 'abc123|||First|||20240115|||212|||1000|||Loud|||hi\n' ;;
  *) exit 3 ;;
esac"#;
        let adapter = adapter(&server, script, Duration::from_secs(10));
        let result = adapter.fetch_items("https://www.youtube.com/@loud").await;

        assert!(result.last_error.is_none(), "{:?}", result.last_error);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].key.as_str(), "youtube_abc123");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extractor_failure_falls_back_to_feed_via_handle_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/@loud"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<script>var x = {"externalId":"UCabc123"};</script>"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feeds/videos.xml"))
            .and(query_param("channel_id", "UCabc123"))
            .respond_with(atom("vid1"))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = adapter(
            &server,
            "echo 'ERROR: blocked' >&2; exit 1",
            Duration::from_secs(10),
        );
        let result = adapter.fetch_items("https://www.youtube.com/@loud").await;

        assert!(result.last_error.is_none());
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].key.as_str(), "youtube_vid1");
        assert_eq!(result.items[0].channel_title.as_deref(), Some("Loud Channel"));
    }

    #[tokio::test]
    async fn test_missing_tool_falls_back_with_channel_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feeds/videos.xml"))
            .and(query_param("channel_id", "UCdirect"))
            .respond_with(atom("vid2"))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = YoutubeAdapter::new(
            single_attempt_http(),
            &server.uri(),
            YoutubeConfig {
                ytdlp_command: "/nonexistent/feedloom-yt-dlp".to_string(),
                ..Default::default()
            },
        );
        let result = adapter
            .fetch_items("https://www.youtube.com/channel/UCdirect")
            .await;

        assert_eq!(result.items.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_then_failed_fallback_reports_primary_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feeds/videos.xml"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = adapter(&server, "sleep 5", Duration::from_millis(200));
        let result = adapter
            .fetch_items("https://www.youtube.com/channel/UCslow")
            .await;

        assert!(result.is_failure());
        let message = result.last_error.unwrap().to_string();
        assert!(message.contains("timed out"), "{message}");
    }
}
