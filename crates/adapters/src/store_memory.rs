//! In-memory item store for testing and dry runs

use async_trait::async_trait;
use feedloom_domain::dates::{canonical_precise, normalize_pub_date};
use feedloom_domain::{
    ItemKey, ItemStore, NewItem, Platform, StoreError, StoreStats, StoredItem, Subscription,
    is_placeholder_title,
};
use std::collections::HashMap;
use std::sync::RwLock;
use time::OffsetDateTime;

#[derive(Default)]
struct Tables {
    subscriptions: Vec<Subscription>,
    items: Vec<StoredItem>,
    keys: HashMap<ItemKey, usize>,
}

/// In-memory item store implementation
#[derive(Default)]
pub struct InMemoryItemStore {
    tables: RwLock<Tables>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(f(&tables))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> Result<T, StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(f(&mut tables))
    }
}

impl Tables {
    fn joined(&self, item: &StoredItem) -> StoredItem {
        let mut item = item.clone();
        if let Some(sub) = self
            .subscriptions
            .iter()
            .find(|s| s.id == item.subscription_id)
        {
            item.platform = Some(sub.platform);
            item.subscription_url = Some(sub.url.clone());
            item.subscription_title = Some(sub.title.clone());
        }
        item
    }
}

#[async_trait]
impl ItemStore for InMemoryItemStore {
    async fn add_subscription(
        &self,
        url: &str,
        platform: Platform,
        title: &str,
        description: &str,
    ) -> Result<i64, StoreError> {
        self.write(|t| {
            if let Some(existing) = t.subscriptions.iter().find(|s| s.url == url) {
                return existing.id;
            }
            let id = t.subscriptions.len() as i64 + 1;
            t.subscriptions.push(Subscription {
                id,
                url: url.to_string(),
                platform,
                title: title.to_string(),
                description: description.to_string(),
                added_at: OffsetDateTime::now_utc(),
                last_updated: None,
                active: true,
            });
            id
        })
    }

    async fn subscription_exists(&self, url: &str) -> Result<bool, StoreError> {
        self.read(|t| t.subscriptions.iter().any(|s| s.url == url))
    }

    async fn get_subscription(&self, id: i64) -> Result<Option<Subscription>, StoreError> {
        self.read(|t| t.subscriptions.iter().find(|s| s.id == id).cloned())
    }

    async fn get_subscriptions(&self, active_only: bool) -> Result<Vec<Subscription>, StoreError> {
        self.read(|t| {
            t.subscriptions
                .iter()
                .filter(|s| !active_only || s.active)
                .cloned()
                .collect()
        })
    }

    async fn set_subscription_active(&self, id: i64, active: bool) -> Result<bool, StoreError> {
        self.write(|t| match t.subscriptions.iter_mut().find(|s| s.id == id) {
            Some(sub) => {
                sub.active = active;
                true
            }
            None => false,
        })
    }

    async fn item_exists(&self, key: &ItemKey) -> Result<bool, StoreError> {
        self.read(|t| t.keys.contains_key(key))
    }

    async fn add_item(&self, item: &NewItem) -> Result<bool, StoreError> {
        self.write(|t| {
            if !t.subscriptions.iter().any(|s| s.id == item.subscription_id) {
                return Err(StoreError::Database(format!(
                    "Unknown subscription {}",
                    item.subscription_id
                )));
            }
            if t.keys.contains_key(&item.key) {
                return Ok(false);
            }

            let id = t.items.len() as i64 + 1;
            t.keys.insert(item.key.clone(), t.items.len());
            t.items.push(StoredItem {
                id,
                key: item.key.clone(),
                subscription_id: item.subscription_id,
                title: item.title.clone(),
                description: item.description.clone(),
                link: item.link.clone(),
                category: item.category.clone(),
                pub_date: normalize_pub_date(item.pub_date.as_deref(), item.fetched_at),
                fetched_at: canonical_precise(item.fetched_at),
                metadata: item.metadata.clone(),
                platform: None,
                subscription_url: None,
                subscription_title: None,
            });
            Ok(true)
        })?
    }

    async fn update_subscription_timestamp(
        &self,
        id: i64,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.write(|t| {
            if let Some(sub) = t.subscriptions.iter_mut().find(|s| s.id == id) {
                sub.last_updated = Some(at);
            }
        })
    }

    async fn update_subscription_title(&self, id: i64, title: &str) -> Result<bool, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(false);
        }

        self.write(|t| match t.subscriptions.iter_mut().find(|s| s.id == id) {
            Some(sub) if is_placeholder_title(&sub.title) => {
                sub.title = title.to_string();
                true
            }
            _ => false,
        })
    }

    async fn all_items(&self, limit: usize) -> Result<Vec<StoredItem>, StoreError> {
        self.read(|t| {
            let mut items: Vec<StoredItem> = t.items.iter().map(|i| t.joined(i)).collect();
            items.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at).then(b.id.cmp(&a.id)));
            items.truncate(limit);
            items
        })
    }

    async fn new_items_since(
        &self,
        since: OffsetDateTime,
    ) -> Result<Vec<StoredItem>, StoreError> {
        let since = canonical_precise(since);
        self.read(|t| {
            let mut items: Vec<StoredItem> = t
                .items
                .iter()
                .filter(|i| i.fetched_at >= since)
                .map(|i| t.joined(i))
                .collect();
            items.sort_by(|a, b| {
                a.category
                    .cmp(&b.category)
                    .then(b.pub_date.cmp(&a.pub_date))
            });
            items
        })
    }

    async fn latest_per_subscription(&self) -> Result<Vec<StoredItem>, StoreError> {
        self.read(|t| {
            let mut latest: HashMap<i64, &StoredItem> = HashMap::new();
            for item in &t.items {
                let newer = latest.get(&item.subscription_id).is_none_or(|current| {
                    (&item.pub_date, item.id) > (&current.pub_date, current.id)
                });
                if newer {
                    latest.insert(item.subscription_id, item);
                }
            }

            let mut items: Vec<StoredItem> = latest
                .into_values()
                .filter(|i| {
                    t.subscriptions
                        .iter()
                        .any(|s| s.id == i.subscription_id && s.active)
                })
                .map(|i| t.joined(i))
                .collect();
            items.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
            items
        })
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.read(|t| {
            let mut by_category: HashMap<String, usize> = HashMap::new();
            let mut by_platform: HashMap<Platform, usize> = HashMap::new();
            for item in &t.items {
                *by_category.entry(item.category.clone()).or_default() += 1;
                if let Some(platform) = t.joined(item).platform {
                    *by_platform.entry(platform).or_default() += 1;
                }
            }

            let mut by_category: Vec<_> = by_category.into_iter().collect();
            by_category.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            let mut by_platform: Vec<_> = by_platform.into_iter().collect();
            by_platform.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.as_str().cmp(b.0.as_str())));

            StoreStats {
                subscriptions: t.subscriptions.len(),
                active_subscriptions: t.subscriptions.iter().filter(|s| s.active).count(),
                items: t.items.len(),
                by_category,
                by_platform,
            }
        })
    }
}
