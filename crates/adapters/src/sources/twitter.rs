//! Twitter/X: public syndication timeline, proxied feed as fallback

use super::rsshub::{RssHub, feed_result};
use super::{capture_first, trim_base};
use crate::feed::{MAX_DESCRIPTION_CHARS, MAX_FEED_ENTRIES, truncate_chars};
use crate::http::{HttpClient, RequestOptions};
use async_trait::async_trait;
use feedloom_domain::dates::canonical;
use feedloom_domain::{FetchResult, ItemKey, Platform, RawItem, SourceAdapter, SourceError};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::format_description;

static USERNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:x\.com|twitter\.com)/(@?\w+)").expect("Valid regex")
});
static NEXT_DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script\s+id="__NEXT_DATA__"\s+type="application/json">\s*(\{.+?\})\s*</script>"#)
        .expect("Valid regex")
});
static SHORT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://t\.co/\S+").expect("Valid regex"));

/// Paths on x.com that are not accounts
const RESERVED: &[&str] = &[
    "home",
    "explore",
    "search",
    "notifications",
    "messages",
    "settings",
    "i",
    "compose",
];

const TITLE_CHARS: usize = 120;
const SYNDICATION_TIMEOUT: Duration = Duration::from_secs(15);

pub struct TwitterAdapter {
    http: HttpClient,
    syndication_base: String,
    rsshub: RssHub,
}

impl TwitterAdapter {
    pub fn new(http: HttpClient, syndication_base: &str, rsshub: RssHub) -> Self {
        Self {
            http,
            syndication_base: trim_base(syndication_base),
            rsshub,
        }
    }

    async fn fetch_via_syndication(&self, username: &str) -> Result<Vec<RawItem>, SourceError> {
        let url = format!(
            "{}/srv/timeline-profile/screen-name/{}",
            self.syndication_base, username
        );
        let options = RequestOptions::default().timeout(SYNDICATION_TIMEOUT);
        let page = self.http.get_with(&url, &options).await?;

        let json = capture_first(&[&NEXT_DATA], &page.body).ok_or_else(|| {
            SourceError::Parse("No __NEXT_DATA__ in syndication response".to_string())
        })?;
        let data: Value = serde_json::from_str(&json)
            .map_err(|e| SourceError::Parse(format!("Syndication JSON: {e}")))?;

        let items = parse_timeline(&data, username);
        if items.is_empty() {
            return Err(SourceError::Transient(
                "Empty timeline from syndication".to_string(),
            ));
        }
        Ok(items)
    }
}

#[async_trait]
impl SourceAdapter for TwitterAdapter {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    async fn resolve_identifier(&self, url: &str) -> Option<String> {
        let name = capture_first(&[&USERNAME], url)?;
        let name = name.trim_start_matches('@');
        if RESERVED.contains(&name.to_lowercase().as_str()) {
            return None;
        }
        Some(name.to_string())
    }

    async fn fetch_items(&self, url: &str) -> FetchResult {
        let Some(username) = self.resolve_identifier(url).await else {
            return FetchResult::failed(SourceError::Identification(url.to_string()));
        };

        match self.fetch_via_syndication(&username).await {
            Ok(items) => FetchResult::ok(items),
            Err(e) => {
                tracing::warn!(username = %username, error = %e, "Syndication failed, trying RSSHub");
                feed_result(
                    self.rsshub
                        .feed(
                            &format!("/twitter/user/{username}"),
                            Platform::Twitter,
                            &RequestOptions::default(),
                        )
                        .await,
                )
            }
        }
    }
}

fn parse_timeline(data: &Value, username: &str) -> Vec<RawItem> {
    let Some(entries) = data
        .pointer("/props/pageProps/timeline/entries")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let channel_title = entries.iter().find_map(|entry| {
        tweet_of(entry)
            .pointer("/user/name")
            .and_then(Value::as_str)
            .filter(|n| !n.trim().is_empty())
            .map(str::to_string)
    });

    entries
        .iter()
        .take(MAX_FEED_ENTRIES)
        .filter_map(|entry| {
            let tweet = tweet_of(entry);
            let tweet_id = tweet.get("id_str").and_then(Value::as_str)?;
            if tweet_id.is_empty() {
                return None;
            }

            let text = tweet
                .get("full_text")
                .or_else(|| tweet.get("text"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let screen_name = tweet
                .pointer("/user/screen_name")
                .and_then(Value::as_str)
                .unwrap_or(username);
            let pub_date = tweet
                .get("created_at")
                .and_then(Value::as_str)
                .map(parse_created_at);

            Some(
                RawItem::new(
                    ItemKey::hashed(Platform::Twitter, tweet_id),
                    tweet_title(text, screen_name),
                    format!("https://x.com/{screen_name}/status/{tweet_id}"),
                )
                .with_description(truncate_chars(text, MAX_DESCRIPTION_CHARS))
                .with_pub_date(pub_date)
                .with_channel_title(Some(
                    channel_title
                        .clone()
                        .unwrap_or_else(|| format!("@{screen_name}")),
                ))
                .with_meta("tweet_id", tweet_id)
                .with_meta("favorite_count", counter(tweet, "favorite_count"))
                .with_meta("retweet_count", counter(tweet, "retweet_count")),
            )
        })
        .collect()
}

/// Some entries nest the tweet under `content.tweet`, others are the tweet
fn tweet_of(entry: &Value) -> &Value {
    let content = entry.get("content").unwrap_or(entry);
    content.get("tweet").unwrap_or(content)
}

fn counter(tweet: &Value, field: &str) -> i64 {
    tweet.get(field).and_then(Value::as_i64).unwrap_or(0)
}

fn tweet_title(text: &str, screen_name: &str) -> String {
    let clean = SHORT_LINK.replace_all(text, "");
    let clean = clean.trim();
    if clean.is_empty() {
        return format!("Tweet by @{screen_name}");
    }
    if clean.chars().count() > TITLE_CHARS {
        format!("{}...", truncate_chars(clean, TITLE_CHARS))
    } else {
        clean.to_string()
    }
}

/// `Thu Jun 19 02:01:31 +0000 2025`, kept verbatim when it does not parse
fn parse_created_at(raw: &str) -> String {
    let format = format_description!(
        "[weekday repr:short] [month repr:short] [day] [hour]:[minute]:[second] [offset_hour sign:mandatory][offset_minute] [year]"
    );
    OffsetDateTime::parse(raw.trim(), format)
        .map(canonical)
        .unwrap_or_else(|_| raw.to_string())
}
