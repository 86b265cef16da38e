//! Port definitions (traits) for external dependencies
//!
//! These traits define the boundaries between the domain and external systems.
//! Adapters implement these traits to connect to real infrastructure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{
    FetchResult, ItemKey, NewItem, Platform, StoreStats, StoredItem, Subscription,
};

/// Error type for item store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Persistent table of subscriptions and fetched items.
///
/// Every mutating call is a single short statement; implementations must
/// tolerate concurrent callers.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert a subscription, or return the existing id when the URL is
    /// already known. Never fails on a duplicate URL.
    async fn add_subscription(
        &self,
        url: &str,
        platform: Platform,
        title: &str,
        description: &str,
    ) -> Result<i64, StoreError>;

    async fn subscription_exists(&self, url: &str) -> Result<bool, StoreError>;

    async fn get_subscription(&self, id: i64) -> Result<Option<Subscription>, StoreError>;

    async fn get_subscriptions(&self, active_only: bool) -> Result<Vec<Subscription>, StoreError>;

    /// Soft (de)activation. Returns false when no such subscription exists.
    async fn set_subscription_active(&self, id: i64, active: bool) -> Result<bool, StoreError>;

    /// Cheap read-side check
    async fn item_exists(&self, key: &ItemKey) -> Result<bool, StoreError>;

    /// Atomic insert-if-absent. Returns true only for the call that created
    /// the row; an existing key is left untouched.
    async fn add_item(&self, item: &NewItem) -> Result<bool, StoreError>;

    async fn update_subscription_timestamp(
        &self,
        id: i64,
        at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Back-fill the title, but only over a placeholder or empty title.
    /// Returns true when the title changed.
    async fn update_subscription_title(&self, id: i64, title: &str) -> Result<bool, StoreError>;

    /// All items, newest first, bounded by `limit`
    async fn all_items(&self, limit: usize) -> Result<Vec<StoredItem>, StoreError>;

    /// Items fetched at or after `since`, with subscription context, ordered
    /// by category then recency
    async fn new_items_since(&self, since: OffsetDateTime)
    -> Result<Vec<StoredItem>, StoreError>;

    /// The single most recent item of every subscription, newest first
    async fn latest_per_subscription(&self) -> Result<Vec<StoredItem>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// Error type for source adapters
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// No platform-native identifier could be derived from the URL
    #[error("Cannot identify account from {0}")]
    Identification(String),
    /// Network, timeout, rate-limit or anti-bot failure
    #[error("Transient fetch failure: {0}")]
    Transient(String),
    /// Credentials expired or missing; the user must act
    #[error("Authentication required: {0}")]
    Auth(String),
    /// Payload could not be understood
    #[error("Parse error: {0}")]
    Parse(String),
    /// No adapter registered for the platform
    #[error("Unsupported platform: {0}")]
    Unsupported(String),
}

impl SourceError {
    /// Failures the user must fix by hand rather than wait out
    pub fn is_actionable(&self) -> bool {
        matches!(self, SourceError::Auth(_) | SourceError::Identification(_))
    }
}

/// Platform-specific fetch strategy
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Derive the platform-native account identifier from a URL. May touch
    /// the network to resolve short links.
    async fn resolve_identifier(&self, url: &str) -> Option<String>;

    /// Fetch candidate items for a subscription URL, walking the adapter's
    /// fallback chain. Never panics on source failure; failures are carried
    /// in `FetchResult::last_error`.
    async fn fetch_items(&self, url: &str) -> FetchResult;
}

/// Maps platforms to adapters
pub trait AdapterRegistry: Send + Sync {
    fn detect_platform(&self, url: &str) -> Option<Platform> {
        Platform::detect(url)
    }

    fn adapter_for(&self, platform: Platform) -> Option<Arc<dyn SourceAdapter>>;
}

/// Error type for classifier operations
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Classifier API error: {0}")]
    Api(String),
    #[error("Invalid response format: {0}")]
    InvalidFormat(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Timeout")]
    Timeout,
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Opaque categorization collaborator: text in, category label out
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, title: &str, description: &str) -> Result<String, ClassifyError>;
}

/// Identity of the current run-lock holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
}

/// Error type for run lock acquisition
#[derive(Debug, Error)]
pub enum LockError {
    /// Another run holds the lock; callers treat this as a benign no-op
    #[error("Update already running{}", holder_suffix(.holder))]
    AlreadyRunning { holder: Option<LockHolder> },
    #[error("Lock IO error: {0}")]
    Io(String),
}

fn holder_suffix(holder: &Option<LockHolder>) -> String {
    match holder {
        Some(h) => format!(" (pid {}, since {})", h.pid, h.started_at),
        None => String::new(),
    }
}

/// Held lock; released when dropped
pub trait RunLockGuard: Send {
    fn holder(&self) -> &LockHolder;
}

/// Process-wide mutual exclusion between update runs against one store.
/// Acquisition never waits.
pub trait RunLock: Send + Sync {
    fn try_acquire(&self) -> Result<Box<dyn RunLockGuard>, LockError>;
}

/// Port for time/clock operations (enables deterministic testing)
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> OffsetDateTime;
}

/// Real clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}
