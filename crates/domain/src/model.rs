//! Domain models and value objects

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// A content platform the aggregator knows how to fetch from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Bilibili,
    Xiaohongshu,
    Weibo,
    Youtube,
    Vimeo,
    Behance,
    Douyin,
    Twitter,
    Zsxq,
}

impl Platform {
    pub const ALL: [Platform; 9] = [
        Platform::Bilibili,
        Platform::Xiaohongshu,
        Platform::Weibo,
        Platform::Youtube,
        Platform::Vimeo,
        Platform::Behance,
        Platform::Douyin,
        Platform::Twitter,
        Platform::Zsxq,
    ];

    /// Detect the platform from a raw subscription URL.
    ///
    /// Matching is by host substring of the lowercased URL, checked in a fixed
    /// order. Returns `None` for unsupported sources.
    pub fn detect(url: &str) -> Option<Self> {
        let url = url.to_lowercase();

        if url.contains("bilibili.com") {
            Some(Platform::Bilibili)
        } else if url.contains("xiaohongshu.com") || url.contains("xhslink.com") {
            Some(Platform::Xiaohongshu)
        } else if url.contains("weibo.com") {
            Some(Platform::Weibo)
        } else if url.contains("youtube.com") || url.contains("youtu.be") {
            Some(Platform::Youtube)
        } else if url.contains("vimeo.com") {
            Some(Platform::Vimeo)
        } else if url.contains("behance.net") {
            Some(Platform::Behance)
        } else if url.contains("douyin.com") {
            Some(Platform::Douyin)
        } else if url.contains("x.com") || url.contains("twitter.com") {
            Some(Platform::Twitter)
        } else if url.contains("zsxq.com") {
            Some(Platform::Zsxq)
        } else {
            None
        }
    }

    /// Stable lowercase tag, used in storage and item keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Bilibili => "bilibili",
            Platform::Xiaohongshu => "xiaohongshu",
            Platform::Weibo => "weibo",
            Platform::Youtube => "youtube",
            Platform::Vimeo => "vimeo",
            Platform::Behance => "behance",
            Platform::Douyin => "douyin",
            Platform::Twitter => "twitter",
            Platform::Zsxq => "zsxq",
        }
    }

    /// Human-readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Bilibili => "Bilibili",
            Platform::Xiaohongshu => "Xiaohongshu",
            Platform::Weibo => "Weibo",
            Platform::Youtube => "YouTube",
            Platform::Vimeo => "Vimeo",
            Platform::Behance => "Behance",
            Platform::Douyin => "Douyin",
            Platform::Twitter => "Twitter",
            Platform::Zsxq => "Zsxq",
        }
    }

    /// Title given to a subscription before a fetch reveals the real name
    pub fn placeholder_title(&self) -> String {
        format!("{} Subscription", self.display_name())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

/// Whether a subscription title is still system-generated and may be
/// overwritten by a fetched channel name
pub fn is_placeholder_title(title: &str) -> bool {
    let title = title.trim();
    title.is_empty() || title.ends_with(" Subscription")
}

/// Deterministic dedup identifier for an item, unique across all subscriptions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    /// Key from a platform-native id that is already short and stable
    /// (e.g. a video id): `youtube_dQw4w9WgXcQ`
    pub fn native(platform: Platform, native_id: &str) -> Self {
        Self(format!("{}_{}", platform.as_str(), native_id.trim()))
    }

    /// Key from a stable but arbitrary source field (GUID, permalink):
    /// `{platform}_{first 12 hex chars of sha256(field)}`
    pub fn hashed(platform: Platform, stable_field: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(stable_field.trim().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self(format!("{}_{}", platform.as_str(), &digest[..12]))
    }

    /// Wrap a key read back from storage
    pub fn from_stored(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A followed source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    /// Source URL, unique across subscriptions
    pub url: String,
    pub platform: Platform,
    pub title: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
    /// Last time a fetch was attempted for this subscription
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_updated: Option<OffsetDateTime>,
    pub active: bool,
}

/// Candidate item produced by a source adapter, not yet stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawItem {
    pub key: ItemKey,
    pub title: String,
    pub description: String,
    pub link: String,
    /// Publish date as the source reported it; normalized at write time
    pub pub_date: Option<String>,
    /// Display name of the channel/account, when the source exposes one
    pub channel_title: Option<String>,
    /// Platform-specific extras (engagement counters, native ids, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RawItem {
    pub fn new(key: ItemKey, title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            key,
            title: title.into(),
            description: String::new(),
            link: link.into(),
            pub_date: None,
            channel_title: None,
            metadata: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_pub_date(mut self, pub_date: Option<String>) -> Self {
        self.pub_date = pub_date.filter(|d| !d.trim().is_empty());
        self
    }

    pub fn with_channel_title(mut self, channel_title: Option<String>) -> Self {
        self.channel_title = channel_title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Item ready for insertion into the store
#[derive(Debug, Clone)]
pub struct NewItem {
    pub key: ItemKey,
    pub subscription_id: i64,
    pub title: String,
    pub description: String,
    pub link: String,
    pub category: String,
    pub pub_date: Option<String>,
    pub fetched_at: OffsetDateTime,
    pub metadata: Map<String, Value>,
}

/// Item as persisted, optionally joined with its subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredItem {
    pub id: i64,
    pub key: ItemKey,
    pub subscription_id: i64,
    pub title: String,
    pub description: String,
    pub link: String,
    pub category: String,
    /// Canonical timestamp when parseable, otherwise the source's string
    pub pub_date: String,
    pub fetched_at: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub platform: Option<Platform>,
    pub subscription_url: Option<String>,
    pub subscription_title: Option<String>,
}

/// Outcome of one adapter fetch.
///
/// `items` is in source-native order (usually newest first). `last_error` is
/// only set when every path in the adapter's chain was exhausted; an empty
/// list without an error means the source simply had nothing.
#[derive(Debug, Default)]
pub struct FetchResult {
    pub items: Vec<RawItem>,
    pub last_error: Option<crate::ports::SourceError>,
}

impl FetchResult {
    pub fn ok(items: Vec<RawItem>) -> Self {
        Self {
            items,
            last_error: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failed(error: crate::ports::SourceError) -> Self {
        Self {
            items: vec![],
            last_error: Some(error),
        }
    }

    /// Empty with a recorded error: the fetch itself failed
    pub fn is_failure(&self) -> bool {
        self.items.is_empty() && self.last_error.is_some()
    }
}

/// Aggregate counts over the whole store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub subscriptions: usize,
    pub active_subscriptions: usize,
    pub items: usize,
    /// Descending by count
    pub by_category: Vec<(String, usize)>,
    /// Descending by count
    pub by_platform: Vec<(Platform, usize)>,
}

/// Per-subscription failure surfaced in the run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionFailure {
    pub subscription_id: i64,
    pub platform: Platform,
    pub url: String,
    pub error: String,
    /// Whether the user has to act (e.g. refresh expired cookies)
    pub actionable: bool,
}

/// Aggregate result of an update run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    /// Subscriptions in the run's snapshot
    pub total_subscriptions: usize,
    /// Subscriptions whose fetch was attempted
    pub processed: usize,
    /// Items this run actually created in the store
    pub new_item_count: usize,
    pub errors: Vec<SubscriptionFailure>,
    /// Subscriptions never started because the run was interrupted
    pub skipped: usize,
    pub cancelled: bool,
    /// Items handed to report collaborators (digest or new-since-start)
    pub report_items: Vec<StoredItem>,
}

impl UpdateSummary {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

/// Result of processing a single subscription inside a run
#[derive(Debug)]
pub enum SubscriptionOutcome {
    /// Fetch succeeded; `new_items` may be zero
    Fetched { new_items: usize },
    /// Fetch chain exhausted, storing broke off, the worker panicked, or the
    /// task timed out. `new_items` counts rows stored before the failure.
    Failed {
        error: String,
        actionable: bool,
        new_items: usize,
    },
    /// Never started because the run was interrupted
    NotStarted,
}

impl SubscriptionOutcome {
    /// Failure before anything was stored
    pub fn failed(error: impl Into<String>, actionable: bool) -> Self {
        Self::Failed {
            error: error.into(),
            actionable,
            new_items: 0,
        }
    }
}
