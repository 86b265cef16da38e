//! In-memory fakes shared by the use case tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;
use time::macros::datetime;

use crate::model::{
    FetchResult, ItemKey, NewItem, Platform, RawItem, StoreStats, StoredItem, Subscription,
    is_placeholder_title,
};
use crate::ports::{AdapterRegistry, Clock, ItemStore, SourceAdapter, StoreError};

#[derive(Default)]
pub(crate) struct FakeStore {
    pub(crate) subscriptions: Mutex<Vec<Subscription>>,
    pub(crate) items: Mutex<Vec<NewItem>>,
    /// Inserts fail once this many items are stored
    pub(crate) insert_limit: Mutex<Option<usize>>,
}

impl FakeStore {
    pub(crate) fn with_subscriptions(subs: &[(i64, Platform, &str)]) -> Self {
        let store = Self::default();
        for (id, platform, url) in subs {
            store.subscriptions.lock().unwrap().push(Subscription {
                id: *id,
                url: url.to_string(),
                platform: *platform,
                title: platform.placeholder_title(),
                description: String::new(),
                added_at: datetime!(2024-01-01 0:00 UTC),
                last_updated: None,
                active: true,
            });
        }
        store
    }

    pub(crate) fn seed_item(&self, key: ItemKey, subscription_id: i64) {
        self.items.lock().unwrap().push(NewItem {
            key,
            subscription_id,
            title: "seeded".into(),
            description: String::new(),
            link: String::new(),
            category: "Other".into(),
            pub_date: None,
            fetched_at: datetime!(2024-01-01 0:00 UTC),
            metadata: Default::default(),
        });
    }

    pub(crate) fn subscription(&self, id: i64) -> Subscription {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .unwrap()
    }

    pub(crate) fn item(&self, key: &ItemKey) -> NewItem {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|i| &i.key == key)
            .cloned()
            .unwrap()
    }

    pub(crate) fn stored(item: &NewItem) -> StoredItem {
        StoredItem {
            id: 0,
            key: item.key.clone(),
            subscription_id: item.subscription_id,
            title: item.title.clone(),
            description: item.description.clone(),
            link: item.link.clone(),
            category: item.category.clone(),
            pub_date: item.pub_date.clone().unwrap_or_default(),
            fetched_at: item.fetched_at.to_string(),
            metadata: item.metadata.clone(),
            platform: None,
            subscription_url: None,
            subscription_title: None,
        }
    }
}

#[async_trait]
impl ItemStore for FakeStore {
    async fn add_subscription(
        &self,
        url: &str,
        platform: Platform,
        title: &str,
        description: &str,
    ) -> Result<i64, StoreError> {
        let mut subs = self.subscriptions.lock().unwrap();
        if let Some(existing) = subs.iter().find(|s| s.url == url) {
            return Ok(existing.id);
        }
        let id = subs.len() as i64 + 1;
        subs.push(Subscription {
            id,
            url: url.to_string(),
            platform,
            title: title.to_string(),
            description: description.to_string(),
            added_at: datetime!(2024-01-01 0:00 UTC),
            last_updated: None,
            active: true,
        });
        Ok(id)
    }

    async fn subscription_exists(&self, url: &str) -> Result<bool, StoreError> {
        Ok(self.subscriptions.lock().unwrap().iter().any(|s| s.url == url))
    }

    async fn get_subscription(&self, id: i64) -> Result<Option<Subscription>, StoreError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn get_subscriptions(
        &self,
        active_only: bool,
    ) -> Result<Vec<Subscription>, StoreError> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| !active_only || s.active)
            .cloned()
            .collect())
    }

    async fn set_subscription_active(&self, id: i64, active: bool) -> Result<bool, StoreError> {
        let mut subs = self.subscriptions.lock().unwrap();
        match subs.iter_mut().find(|s| s.id == id) {
            Some(sub) => {
                sub.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn item_exists(&self, key: &ItemKey) -> Result<bool, StoreError> {
        Ok(self.items.lock().unwrap().iter().any(|i| &i.key == key))
    }

    async fn add_item(&self, item: &NewItem) -> Result<bool, StoreError> {
        let mut items = self.items.lock().unwrap();
        if items.iter().any(|i| i.key == item.key) {
            return Ok(false);
        }
        if self.insert_limit.lock().unwrap().is_some_and(|n| items.len() >= n) {
            return Err(StoreError::Database("disk I/O error".into()));
        }
        items.push(item.clone());
        Ok(true)
    }

    async fn update_subscription_timestamp(
        &self,
        id: i64,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        if let Some(sub) = self
            .subscriptions
            .lock()
            .unwrap()
            .iter_mut()
            .find(|s| s.id == id)
        {
            sub.last_updated = Some(at);
        }
        Ok(())
    }

    async fn update_subscription_title(&self, id: i64, title: &str) -> Result<bool, StoreError> {
        let mut subs = self.subscriptions.lock().unwrap();
        match subs.iter_mut().find(|s| s.id == id) {
            Some(sub) if is_placeholder_title(&sub.title) => {
                sub.title = title.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn all_items(&self, limit: usize) -> Result<Vec<StoredItem>, StoreError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .take(limit)
            .map(Self::stored)
            .collect())
    }

    async fn new_items_since(
        &self,
        since: OffsetDateTime,
    ) -> Result<Vec<StoredItem>, StoreError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.fetched_at >= since)
            .map(Self::stored)
            .collect())
    }

    async fn latest_per_subscription(&self) -> Result<Vec<StoredItem>, StoreError> {
        let items = self.items.lock().unwrap();
        let mut latest: HashMap<i64, &NewItem> = HashMap::new();
        for item in items.iter() {
            latest.insert(item.subscription_id, item);
        }
        Ok(latest.values().map(|i| Self::stored(i)).collect())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats::default())
    }
}

pub(crate) struct StaticAdapter {
    pub(crate) platform: Platform,
    pub(crate) items: Vec<RawItem>,
}

#[async_trait]
impl SourceAdapter for StaticAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn resolve_identifier(&self, _url: &str) -> Option<String> {
        Some("id".into())
    }

    async fn fetch_items(&self, _url: &str) -> FetchResult {
        FetchResult::ok(self.items.clone())
    }
}

#[derive(Default)]
pub(crate) struct FakeRegistry {
    adapters: HashMap<Platform, Arc<dyn SourceAdapter>>,
}

impl FakeRegistry {
    pub(crate) fn with(
        mut self,
        platform: Platform,
        adapter: impl SourceAdapter + 'static,
    ) -> Self {
        self.adapters.insert(platform, Arc::new(adapter));
        self
    }
}

impl AdapterRegistry for FakeRegistry {
    fn adapter_for(&self, platform: Platform) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&platform).cloned()
    }
}

pub(crate) struct FixedClock;

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        datetime!(2024-06-01 12:00 UTC)
    }
}
