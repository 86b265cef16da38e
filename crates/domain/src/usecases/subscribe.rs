//! Subscription management - add, (de)activate, list

use std::sync::Arc;

use thiserror::Error;

use crate::{
    model::{StoreStats, Subscription},
    ports::{AdapterRegistry, ItemStore, SourceError, StoreError},
};

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("Unsupported source URL: {0}")]
    UnsupportedUrl(String),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Subscription {0} not found")]
    NotFound(i64),
}

/// Result of a subscribe call
#[derive(Debug, Clone)]
pub struct Subscribed {
    pub subscription: Subscription,
    /// Platform-native account identifier the URL resolved to
    pub identifier: String,
    /// False when the URL was already subscribed
    pub created: bool,
}

/// Subscription bookkeeping on top of the store and adapter registry
pub struct SubscriptionManager<St, R>
where
    St: ItemStore + ?Sized,
    R: AdapterRegistry + ?Sized,
{
    store: Arc<St>,
    registry: Arc<R>,
}

impl<St, R> SubscriptionManager<St, R>
where
    St: ItemStore + ?Sized,
    R: AdapterRegistry + ?Sized,
{
    pub fn new(store: Arc<St>, registry: Arc<R>) -> Self {
        Self { store, registry }
    }

    /// Subscribe to a source URL.
    ///
    /// The URL must belong to a supported platform and resolve to an account
    /// identifier; otherwise nothing is stored. Re-subscribing an existing URL
    /// returns the existing subscription.
    pub async fn subscribe(&self, url: &str) -> Result<Subscribed, SubscribeError> {
        let url = url.trim();
        let platform = self
            .registry
            .detect_platform(url)
            .ok_or_else(|| SubscribeError::UnsupportedUrl(url.to_string()))?;

        let adapter = self
            .registry
            .adapter_for(platform)
            .ok_or_else(|| SourceError::Unsupported(platform.to_string()))?;

        let identifier = adapter
            .resolve_identifier(url)
            .await
            .ok_or_else(|| SourceError::Identification(url.to_string()))?;

        let existed = self.store.subscription_exists(url).await?;
        let id = self
            .store
            .add_subscription(
                url,
                platform,
                &platform.placeholder_title(),
                &format!("Content from {}", platform.display_name()),
            )
            .await?;

        let subscription = self
            .store
            .get_subscription(id)
            .await?
            .ok_or(SubscribeError::NotFound(id))?;

        if existed {
            tracing::info!(subscription_id = id, url = %url, "Already subscribed");
        } else {
            tracing::info!(
                subscription_id = id,
                platform = %platform,
                identifier = %identifier,
                "Subscribed"
            );
        }

        Ok(Subscribed {
            subscription,
            identifier,
            created: !existed,
        })
    }

    /// Soft (de)activation; inactive subscriptions are left out of runs
    pub async fn set_active(&self, id: i64, active: bool) -> Result<Subscription, SubscribeError> {
        if !self.store.set_subscription_active(id, active).await? {
            return Err(SubscribeError::NotFound(id));
        }

        tracing::info!(subscription_id = id, active, "Subscription state changed");

        self.store
            .get_subscription(id)
            .await?
            .ok_or(SubscribeError::NotFound(id))
    }

    pub async fn list(&self, active_only: bool) -> Result<Vec<Subscription>, SubscribeError> {
        Ok(self.store.get_subscriptions(active_only).await?)
    }

    pub async fn stats(&self) -> Result<StoreStats, SubscribeError> {
        Ok(self.store.stats().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FetchResult, Platform};
    use crate::ports::SourceAdapter;
    use crate::usecases::fakes::{FakeRegistry, FakeStore, StaticAdapter};
    use async_trait::async_trait;

    struct UnidentifiableAdapter;

    #[async_trait]
    impl SourceAdapter for UnidentifiableAdapter {
        fn platform(&self) -> Platform {
            Platform::Twitter
        }

        async fn resolve_identifier(&self, _url: &str) -> Option<String> {
            None
        }

        async fn fetch_items(&self, _url: &str) -> FetchResult {
            FetchResult::empty()
        }
    }

    fn manager() -> (Arc<FakeStore>, SubscriptionManager<FakeStore, FakeRegistry>) {
        let store = Arc::new(FakeStore::default());
        let registry = FakeRegistry::default()
            .with(
                Platform::Youtube,
                StaticAdapter {
                    platform: Platform::Youtube,
                    items: vec![],
                },
            )
            .with(Platform::Twitter, UnidentifiableAdapter);
        (
            Arc::clone(&store),
            SubscriptionManager::new(store, Arc::new(registry)),
        )
    }

    #[tokio::test]
    async fn test_subscribe_uses_placeholder_title() {
        let (_, manager) = manager();

        let subscribed = manager
            .subscribe("https://www.youtube.com/@rustconf")
            .await
            .unwrap();

        assert!(subscribed.created);
        assert_eq!(subscribed.subscription.platform, Platform::Youtube);
        assert_eq!(subscribed.subscription.title, "YouTube Subscription");
        assert_eq!(subscribed.subscription.description, "Content from YouTube");
    }

    #[tokio::test]
    async fn test_subscribe_twice_returns_same_id() {
        let (store, manager) = manager();

        let first = manager.subscribe("https://www.youtube.com/@a").await.unwrap();
        let second = manager.subscribe("https://www.youtube.com/@a").await.unwrap();

        assert_eq!(first.subscription.id, second.subscription.id);
        assert!(!second.created);
        assert_eq!(store.subscriptions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_url_is_rejected() {
        let (store, manager) = manager();

        let err = manager
            .subscribe("https://example.com/feed.xml")
            .await
            .unwrap_err();

        assert!(matches!(err, SubscribeError::UnsupportedUrl(_)));
        assert!(store.subscriptions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identification_failure_stores_nothing() {
        let (store, manager) = manager();

        let err = manager.subscribe("https://x.com/home").await.unwrap_err();

        assert!(matches!(
            err,
            SubscribeError::Source(SourceError::Identification(_))
        ));
        assert!(store.subscriptions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_platform_without_adapter_is_unsupported() {
        let (_, manager) = manager();

        let err = manager.subscribe("https://vimeo.com/someone").await.unwrap_err();

        assert!(matches!(err, SubscribeError::Source(SourceError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_deactivate_and_reactivate() {
        let (_, manager) = manager();
        let id = manager
            .subscribe("https://www.youtube.com/@a")
            .await
            .unwrap()
            .subscription
            .id;

        let sub = manager.set_active(id, false).await.unwrap();
        assert!(!sub.active);
        assert!(manager.list(true).await.unwrap().is_empty());
        assert_eq!(manager.list(false).await.unwrap().len(), 1);

        let sub = manager.set_active(id, true).await.unwrap();
        assert!(sub.active);

        assert!(matches!(
            manager.set_active(99, false).await.unwrap_err(),
            SubscribeError::NotFound(99)
        ));
    }
}
