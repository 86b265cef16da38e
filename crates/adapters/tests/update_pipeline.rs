use feedloom_adapters::classify::KeywordClassifier;
use feedloom_adapters::http::{HttpClient, HttpConfig};
use feedloom_adapters::lock::InProcessRunLock;
use feedloom_adapters::sources::{Endpoints, PlatformRegistry, SourceConfig};
use feedloom_adapters::store::SqliteItemStore;
use feedloom_domain::usecases::{SubscriptionManager, UpdateConfig, UpdateOrchestrator};
use feedloom_domain::{Classifier, ItemStore, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn vimeo_feed() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/rss+xml")
        .set_body_string(
            r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Someone's Videos</title>
<item><title>Rust GPU notes</title><link>https://vimeo.com/1</link><guid>https://vimeo.com/1</guid></item>
<item><title>Sunset timelapse</title><link>https://vimeo.com/2</link><guid>https://vimeo.com/2</guid></item>
</channel></rss>"#,
        )
}

async fn setup(
    server: &MockServer,
) -> (
    Arc<SqliteItemStore>,
    Arc<PlatformRegistry>,
    UpdateOrchestrator<
        SqliteItemStore,
        PlatformRegistry,
        dyn Classifier,
        InProcessRunLock,
        SystemClock,
    >,
) {
    let http = HttpClient::new(HttpConfig {
        retries: 1,
        timeout: Duration::from_secs(5),
        ..Default::default()
    })
    .unwrap();
    let config = SourceConfig {
        rsshub_base_url: server.uri(),
        endpoints: Endpoints {
            vimeo: server.uri(),
            ..Default::default()
        },
        ..Default::default()
    };

    let store = Arc::new(SqliteItemStore::in_memory().await.unwrap());
    let registry = Arc::new(PlatformRegistry::new(http, &config));
    let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier::with_default_rules("Other"));

    let orchestrator = UpdateOrchestrator::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        classifier,
        Arc::new(InProcessRunLock::new()),
        Arc::new(SystemClock),
        UpdateConfig::default(),
    );

    (store, registry, orchestrator)
}

#[tokio::test]
async fn update_stores_new_items_and_isolates_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/someone/videos/rss"))
        .respond_with(vimeo_feed())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/weibo/user/777"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let (store, registry, orchestrator) = setup(&server).await;
    let manager = SubscriptionManager::new(Arc::clone(&store), registry);
    let vimeo = manager.subscribe("https://vimeo.com/someone").await.unwrap();
    manager.subscribe("https://weibo.com/u/777").await.unwrap();

    let first = orchestrator.run_update(true, false).await.unwrap();
    assert_eq!(first.total_subscriptions, 2);
    assert_eq!(first.processed, 2);
    assert_eq!(first.new_item_count, 2);
    assert_eq!(first.error_count(), 1);
    assert!(first.errors[0].url.contains("weibo"));
    assert!(!first.errors[0].actionable);
    assert_eq!(first.report_items.len(), 2);

    let categories: Vec<_> = first
        .report_items
        .iter()
        .map(|i| (i.title.as_str(), i.category.as_str()))
        .collect();
    assert!(categories.contains(&("Rust GPU notes", "Tech")));
    assert!(categories.contains(&("Sunset timelapse", "Other")));

    let subscription = store
        .get_subscription(vimeo.subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscription.title, "Someone's Videos");
    assert!(subscription.last_updated.is_some());

    let second = orchestrator.run_update(true, false).await.unwrap();
    assert_eq!(second.new_item_count, 0);
    assert!(second.report_items.is_empty());
    assert_eq!(store.stats().await.unwrap().items, 2);
}

#[tokio::test]
async fn digest_reports_latest_item_per_subscription() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/someone/videos/rss"))
        .respond_with(vimeo_feed())
        .mount(&server)
        .await;

    let (store, registry, orchestrator) = setup(&server).await;
    let manager = SubscriptionManager::new(Arc::clone(&store), registry);
    manager.subscribe("https://vimeo.com/someone").await.unwrap();

    orchestrator.run_update(false, false).await.unwrap();
    let digest = orchestrator.run_update(false, true).await.unwrap();

    assert_eq!(digest.new_item_count, 0);
    assert_eq!(digest.report_items.len(), 1);
    assert_eq!(digest.report_items[0].category, "Other");
}
