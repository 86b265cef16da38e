//! Zsxq (knowledge planet): public group API, proxied feed as fallback

use super::rsshub::{RssHub, feed_result};
use super::{capture_first, trim_base};
use crate::feed::{MAX_DESCRIPTION_CHARS, MAX_FEED_ENTRIES, truncate_chars};
use crate::http::{HttpClient, RequestOptions};
use async_trait::async_trait;
use feedloom_domain::dates::canonical;
use feedloom_domain::{FetchResult, ItemKey, Platform, RawItem, SourceAdapter, SourceError};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::LazyLock;
use time::OffsetDateTime;
use time::macros::format_description;

static GROUP_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"zsxq\.com(?:/dweb2/index)?/groups?/(\d+)").expect("Valid regex")
});
static GROUP_QUERY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"group_id=(\d+)").expect("Valid regex"));
static REDIRECTED_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/groups?/(\d+)").expect("Valid regex"));
static EMBEDDED_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/groups?/(\d{10,})").expect("Valid regex"));

const TITLE_CHARS: usize = 120;

#[derive(Debug, Deserialize)]
struct GroupResponse {
    #[serde(default)]
    succeeded: bool,
    info: Option<String>,
    #[serde(default)]
    resp_data: GroupData,
}

#[derive(Debug, Default, Deserialize)]
struct GroupData {
    #[serde(default)]
    group: GroupInfo,
    #[serde(default)]
    topics: Vec<Topic>,
}

#[derive(Debug, Default, Deserialize)]
struct GroupInfo {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Topic {
    /// Number or string depending on the endpoint version
    topic_id: Option<Value>,
    title: Option<String>,
    talk: Option<Post>,
    question: Option<Post>,
    create_time: Option<String>,
    #[serde(default)]
    likes_count: i64,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    text: String,
    owner: Option<Owner>,
}

#[derive(Debug, Deserialize)]
struct Owner {
    #[serde(default)]
    name: String,
}

pub struct ZsxqAdapter {
    http: HttpClient,
    api_base: String,
    rsshub: RssHub,
}

impl ZsxqAdapter {
    pub fn new(http: HttpClient, api_base: &str, rsshub: RssHub) -> Self {
        Self {
            http,
            api_base: trim_base(api_base),
            rsshub,
        }
    }

    async fn resolve_short_link(&self, url: &str) -> Option<String> {
        match self.http.get(url).await {
            Ok(response) => capture_first(&[&REDIRECTED_GROUP], &response.final_url)
                .or_else(|| capture_first(&[&EMBEDDED_GROUP], &response.body)),
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Zsxq short link did not resolve");
                None
            }
        }
    }

    async fn fetch_via_api(&self, group_id: &str) -> Result<Vec<RawItem>, SourceError> {
        let url = format!("{}/v2/groups/{}", self.api_base, group_id);
        let options = RequestOptions::default()
            .header("Origin", "https://wx.zsxq.com")
            .header("Referer", "https://wx.zsxq.com/");
        let response = self.http.get_with(&url, &options).await?;

        let parsed: GroupResponse = serde_json::from_str(&response.body)
            .map_err(|e| SourceError::Parse(format!("Zsxq API response: {e}")))?;
        if !parsed.succeeded {
            return Err(SourceError::Transient(
                parsed
                    .info
                    .unwrap_or_else(|| "API returned failure".to_string()),
            ));
        }

        let group_name = parsed.resp_data.group.name;
        let items: Vec<RawItem> = parsed
            .resp_data
            .topics
            .into_iter()
            .take(MAX_FEED_ENTRIES)
            .filter_map(|topic| topic_to_item(topic, &group_name))
            .collect();

        if items.is_empty() {
            return Err(SourceError::Transient(
                "Empty topics from group API".to_string(),
            ));
        }
        Ok(items)
    }
}

#[async_trait]
impl SourceAdapter for ZsxqAdapter {
    fn platform(&self) -> Platform {
        Platform::Zsxq
    }

    async fn resolve_identifier(&self, url: &str) -> Option<String> {
        if let Some(id) = capture_first(&[&GROUP_PATH], url) {
            return Some(id);
        }
        if url.contains("t.zsxq.com") {
            return self.resolve_short_link(url).await;
        }
        capture_first(&[&GROUP_QUERY], url)
    }

    async fn fetch_items(&self, url: &str) -> FetchResult {
        let Some(group_id) = self.resolve_identifier(url).await else {
            return FetchResult::failed(SourceError::Identification(url.to_string()));
        };

        match self.fetch_via_api(&group_id).await {
            Ok(items) => FetchResult::ok(items),
            Err(e) => {
                tracing::warn!(group_id = %group_id, error = %e, "Group API failed, trying RSSHub");
                feed_result(
                    self.rsshub
                        .feed(
                            &format!("/zsxq/group/{group_id}"),
                            Platform::Zsxq,
                            &RequestOptions::default(),
                        )
                        .await,
                )
            }
        }
    }
}

fn topic_to_item(topic: Topic, group_name: &str) -> Option<RawItem> {
    let topic_id = match topic.topic_id? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if topic_id.is_empty() {
        return None;
    }

    let post = topic.talk.or(topic.question);
    let text = post.as_ref().map(|p| p.text.clone()).unwrap_or_default();
    let author = post
        .and_then(|p| p.owner)
        .map(|o| o.name)
        .unwrap_or_default();

    let pub_date = topic.create_time.as_deref().map(parse_create_time);

    Some(
        RawItem::new(
            ItemKey::hashed(Platform::Zsxq, &topic_id),
            topic_title(topic.title.as_deref(), &text, &topic_id),
            format!("https://wx.zsxq.com/topic/{topic_id}"),
        )
        .with_description(truncate_chars(&text, MAX_DESCRIPTION_CHARS))
        .with_pub_date(pub_date)
        .with_channel_title(Some(group_name.to_string()))
        .with_meta("topic_id", topic_id.as_str())
        .with_meta("author", author)
        .with_meta("likes_count", topic.likes_count),
    )
}

fn topic_title(title: Option<&str>, text: &str, topic_id: &str) -> String {
    let raw = match title.filter(|t| !t.trim().is_empty()) {
        Some(title) => title.to_string(),
        None => truncate_chars(text, TITLE_CHARS),
    };
    let clean = raw.replace('\n', " ").trim().to_string();

    if clean.is_empty() {
        let tail: String = {
            let chars: Vec<char> = topic_id.chars().collect();
            chars[chars.len().saturating_sub(6)..].iter().collect()
        };
        return format!("知识星球主题 #{tail}");
    }
    if clean.chars().count() > TITLE_CHARS {
        format!("{}...", truncate_chars(&clean, TITLE_CHARS))
    } else {
        clean
    }
}

/// `2024-01-15T12:00:00.000+0800`, kept verbatim when it does not parse
fn parse_create_time(raw: &str) -> String {
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour sign:mandatory][offset_minute]"
    );
    OffsetDateTime::parse(raw.trim(), format)
        .map(canonical)
        .unwrap_or_else(|_| raw.to_string())
}
