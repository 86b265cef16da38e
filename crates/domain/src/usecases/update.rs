//! Update orchestrator - fans fetches out over all active subscriptions
//!
//! A run takes the run lock, snapshots the active subscriptions, and drives
//! one fetch-classify-store task per subscription on a bounded pool. Every
//! task yields a tagged outcome; failures are aggregated, never raised.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::{Duration, timeout};

use crate::{
    model::{
        NewItem, RawItem, StoredItem, Subscription, SubscriptionFailure, SubscriptionOutcome,
        UpdateSummary,
    },
    ports::{
        AdapterRegistry, Classifier, Clock, ItemStore, LockError, RunLock, SourceError, StoreError,
    },
};

/// Configuration for update runs
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Worker pool size
    pub max_workers: usize,
    /// Upper bound on one subscription's fetch-classify-store sequence
    pub task_timeout: Duration,
    /// Upper bound on a single classification call
    pub classify_timeout: Duration,
    /// Label used when classification is off or fails
    pub default_category: String,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            task_timeout: Duration::from_secs(180),
            classify_timeout: Duration::from_secs(30),
            default_category: "Other".to_string(),
        }
    }
}

/// Errors fatal to a whole run
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl UpdateError {
    /// Another run holds the lock; callers treat this as a no-op
    pub fn is_already_running(&self) -> bool {
        matches!(self, UpdateError::Lock(LockError::AlreadyRunning { .. }))
    }
}

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Locked,
    FanningOut,
    Collecting,
    Finalizing,
}

/// Collaborators shared by the coordinator and every worker task
struct Workers<St: ?Sized, R: ?Sized, C: ?Sized, Cl: ?Sized> {
    store: Arc<St>,
    registry: Arc<R>,
    classifier: Arc<C>,
    clock: Arc<Cl>,
    config: UpdateConfig,
}

/// Update orchestrator
pub struct UpdateOrchestrator<St, R, C, L, Cl>
where
    St: ItemStore + ?Sized + 'static,
    R: AdapterRegistry + ?Sized + 'static,
    C: Classifier + ?Sized + 'static,
    L: RunLock + ?Sized,
    Cl: Clock + ?Sized + 'static,
{
    workers: Arc<Workers<St, R, C, Cl>>,
    lock: Arc<L>,
    phase: watch::Sender<RunPhase>,
}

impl<St, R, C, L, Cl> UpdateOrchestrator<St, R, C, L, Cl>
where
    St: ItemStore + ?Sized + 'static,
    R: AdapterRegistry + ?Sized + 'static,
    C: Classifier + ?Sized + 'static,
    L: RunLock + ?Sized,
    Cl: Clock + ?Sized + 'static,
{
    pub fn new(
        store: Arc<St>,
        registry: Arc<R>,
        classifier: Arc<C>,
        lock: Arc<L>,
        clock: Arc<Cl>,
        config: UpdateConfig,
    ) -> Self {
        let (phase, _) = watch::channel(RunPhase::Idle);
        Self {
            workers: Arc::new(Workers {
                store,
                registry,
                classifier,
                clock,
                config,
            }),
            lock,
            phase,
        }
    }

    /// Current phase of the run (Idle between runs)
    pub fn phase(&self) -> RunPhase {
        *self.phase.borrow()
    }

    /// Observe phase transitions
    pub fn watch_phase(&self) -> watch::Receiver<RunPhase> {
        self.phase.subscribe()
    }

    /// Run one update over all active subscriptions
    pub async fn run_update(
        &self,
        use_classification: bool,
        digest: bool,
    ) -> Result<UpdateSummary, UpdateError> {
        self.run_update_until(use_classification, digest, std::future::pending())
            .await
    }

    /// Run one update, stopping early when `shutdown` resolves.
    ///
    /// On shutdown no further subscription is started; tasks already running
    /// finish normally. Unstarted subscriptions are counted as skipped and
    /// keep their previous `last_updated`.
    pub async fn run_update_until<F>(
        &self,
        use_classification: bool,
        digest: bool,
        shutdown: F,
    ) -> Result<UpdateSummary, UpdateError>
    where
        F: Future<Output = ()>,
    {
        let _guard = self.lock.try_acquire()?;
        self.phase.send_replace(RunPhase::Locked);

        let result = self
            .run_locked(use_classification, digest, shutdown)
            .await;

        self.phase.send_replace(RunPhase::Idle);
        result
    }

    async fn run_locked<F>(
        &self,
        use_classification: bool,
        digest: bool,
        shutdown: F,
    ) -> Result<UpdateSummary, UpdateError>
    where
        F: Future<Output = ()>,
    {
        let started_at = self.workers.clock.now();
        let subscriptions = self.workers.store.get_subscriptions(true).await?;
        let total = subscriptions.len();

        tracing::info!(
            subscriptions = total,
            max_workers = self.workers.config.max_workers,
            use_classification,
            digest,
            "Starting update run"
        );

        self.phase.send_replace(RunPhase::FanningOut);

        let semaphore = Arc::new(Semaphore::new(self.workers.config.max_workers.max(1)));
        let mut join_set: JoinSet<SubscriptionOutcome> = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, Subscription> = HashMap::new();

        for subscription in subscriptions {
            let workers = Arc::clone(&self.workers);
            let semaphore = Arc::clone(&semaphore);
            let task_subscription = subscription.clone();

            let handle = join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return SubscriptionOutcome::NotStarted,
                };
                workers
                    .refresh_bounded(&task_subscription, use_classification)
                    .await
            });
            in_flight.insert(handle.id(), subscription);
        }

        self.phase.send_replace(RunPhase::Collecting);

        let mut summary = UpdateSummary {
            started_at,
            finished_at: started_at,
            total_subscriptions: total,
            processed: 0,
            new_item_count: 0,
            errors: vec![],
            skipped: 0,
            cancelled: false,
            report_items: vec![],
        };

        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            let next = if summary.cancelled {
                join_set.join_next_with_id().await
            } else {
                tokio::select! {
                    next = join_set.join_next_with_id() => next,
                    _ = &mut shutdown => {
                        tracing::warn!(
                            "Update interrupted; letting in-flight subscriptions finish"
                        );
                        summary.cancelled = true;
                        semaphore.close();
                        continue;
                    }
                }
            };

            let Some(joined) = next else {
                break;
            };

            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(join_error) => {
                    let id = join_error.id();
                    let error = if join_error.is_panic() {
                        format!(
                            "worker panicked: {}",
                            panic_message(join_error.into_panic().as_ref())
                        )
                    } else {
                        "worker task was cancelled".to_string()
                    };
                    (id, SubscriptionOutcome::failed(error, false))
                }
            };

            let Some(subscription) = in_flight.remove(&id) else {
                tracing::warn!(task_id = %id, "Result for unknown task");
                continue;
            };

            self.workers.record(&subscription, outcome, &mut summary).await;
        }

        self.phase.send_replace(RunPhase::Finalizing);

        summary.report_items = self.workers.report_items(digest, started_at).await;
        summary.finished_at = self.workers.clock.now();

        tracing::info!(
            processed = summary.processed,
            new_items = summary.new_item_count,
            errors = summary.error_count(),
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            "Update run finished"
        );

        Ok(summary)
    }

    /// Fetch a single subscription outside of a run (initial fetch after
    /// subscribing). Advances the subscription's timestamp like a run does.
    pub async fn refresh_one(
        &self,
        subscription: &Subscription,
        use_classification: bool,
    ) -> SubscriptionOutcome {
        let outcome = self
            .workers
            .refresh_bounded(subscription, use_classification)
            .await;
        self.workers.touch(subscription).await;
        outcome
    }
}

impl<St, R, C, Cl> Workers<St, R, C, Cl>
where
    St: ItemStore + ?Sized,
    R: AdapterRegistry + ?Sized,
    C: Classifier + ?Sized,
    Cl: Clock + ?Sized,
{
    async fn refresh_bounded(
        &self,
        subscription: &Subscription,
        use_classification: bool,
    ) -> SubscriptionOutcome {
        match timeout(
            self.config.task_timeout,
            self.refresh(subscription, use_classification),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => SubscriptionOutcome::failed(
                format!(
                    "timed out after {}s",
                    self.config.task_timeout.as_secs_f64()
                ),
                false,
            ),
        }
    }

    /// Fetch, dedup, classify and store one subscription's items
    async fn refresh(
        &self,
        subscription: &Subscription,
        use_classification: bool,
    ) -> SubscriptionOutcome {
        let Some(adapter) = self.registry.adapter_for(subscription.platform) else {
            let error = SourceError::Unsupported(subscription.platform.to_string());
            return SubscriptionOutcome::failed(error.to_string(), error.is_actionable());
        };

        tracing::debug!(
            subscription_id = subscription.id,
            platform = %subscription.platform,
            url = %subscription.url,
            "Fetching subscription"
        );

        let result = adapter.fetch_items(&subscription.url).await;

        if result.is_failure() {
            let error = result
                .last_error
                .unwrap_or_else(|| SourceError::Transient("fetch failed".to_string()));
            return SubscriptionOutcome::failed(error.to_string(), error.is_actionable());
        }

        if let Some(error) = &result.last_error {
            tracing::warn!(
                subscription_id = subscription.id,
                error = %error,
                "Fetch returned items alongside an error"
            );
        }

        let channel_title = result
            .items
            .iter()
            .find_map(|item| item.channel_title.clone());

        let mut new_items = 0;
        for raw in &result.items {
            match self.store_item(subscription, raw, use_classification).await {
                Ok(true) => new_items += 1,
                Ok(false) => {}
                Err(e) => {
                    return SubscriptionOutcome::Failed {
                        error: e.to_string(),
                        actionable: false,
                        new_items,
                    };
                }
            }
        }

        if let Some(title) = channel_title {
            match self
                .store
                .update_subscription_title(subscription.id, &title)
                .await
            {
                Ok(true) => tracing::info!(
                    subscription_id = subscription.id,
                    title = %title,
                    "Back-filled subscription title"
                ),
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    subscription_id = subscription.id,
                    error = %e,
                    "Failed to back-fill subscription title"
                ),
            }
        }

        SubscriptionOutcome::Fetched { new_items }
    }

    /// Returns true when this call created the item
    async fn store_item(
        &self,
        subscription: &Subscription,
        raw: &RawItem,
        use_classification: bool,
    ) -> Result<bool, StoreError> {
        if self.store.item_exists(&raw.key).await? {
            return Ok(false);
        }

        let category = self.categorize(raw, use_classification).await;
        let item = NewItem {
            key: raw.key.clone(),
            subscription_id: subscription.id,
            title: raw.title.clone(),
            description: raw.description.clone(),
            link: raw.link.clone(),
            category,
            pub_date: raw.pub_date.clone(),
            fetched_at: self.clock.now(),
            metadata: raw.metadata.clone(),
        };

        self.store.add_item(&item).await
    }

    async fn categorize(&self, raw: &RawItem, use_classification: bool) -> String {
        if !use_classification {
            return self.config.default_category.clone();
        }

        match timeout(
            self.config.classify_timeout,
            self.classifier.classify(&raw.title, &raw.description),
        )
        .await
        {
            Ok(Ok(label)) if !label.trim().is_empty() => label.trim().to_string(),
            Ok(Ok(_)) => self.config.default_category.clone(),
            Ok(Err(e)) => {
                tracing::debug!(key = %raw.key, error = %e, "Classification failed, using default");
                self.config.default_category.clone()
            }
            Err(_) => {
                tracing::debug!(key = %raw.key, "Classification timed out, using default");
                self.config.default_category.clone()
            }
        }
    }

    async fn record(
        &self,
        subscription: &Subscription,
        outcome: SubscriptionOutcome,
        summary: &mut UpdateSummary,
    ) {
        match outcome {
            SubscriptionOutcome::Fetched { new_items } => {
                summary.processed += 1;
                summary.new_item_count += new_items;
                tracing::info!(
                    subscription_id = subscription.id,
                    platform = %subscription.platform,
                    new_items,
                    "Subscription updated"
                );
                self.touch(subscription).await;
            }
            SubscriptionOutcome::Failed {
                error,
                actionable,
                new_items,
            } => {
                summary.processed += 1;
                summary.new_item_count += new_items;
                tracing::warn!(
                    subscription_id = subscription.id,
                    platform = %subscription.platform,
                    url = %subscription.url,
                    error = %error,
                    actionable,
                    new_items,
                    "Subscription failed"
                );
                summary.errors.push(SubscriptionFailure {
                    subscription_id: subscription.id,
                    platform: subscription.platform,
                    url: subscription.url.clone(),
                    error,
                    actionable,
                });
                self.touch(subscription).await;
            }
            SubscriptionOutcome::NotStarted => {
                summary.skipped += 1;
                tracing::debug!(subscription_id = subscription.id, "Subscription skipped");
            }
        }
    }

    /// Advance `last_updated`; a fetch was attempted
    async fn touch(&self, subscription: &Subscription) {
        if let Err(e) = self
            .store
            .update_subscription_timestamp(subscription.id, self.clock.now())
            .await
        {
            tracing::warn!(
                subscription_id = subscription.id,
                error = %e,
                "Failed to advance subscription timestamp"
            );
        }
    }

    async fn report_items(&self, digest: bool, since: OffsetDateTime) -> Vec<StoredItem> {
        let items = if digest {
            self.store.latest_per_subscription().await
        } else {
            self.store.new_items_since(since).await
        };

        items.unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to load report items");
            vec![]
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
