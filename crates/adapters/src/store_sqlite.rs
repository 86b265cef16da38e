//! SQLite item store implementation

use async_trait::async_trait;
use feedloom_domain::dates::{canonical_precise, normalize_pub_date, parse_timestamp};
use feedloom_domain::{
    ItemKey, ItemStore, NewItem, Platform, StoreError, StoreStats, StoredItem, Subscription,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

type SubscriptionRow = (i64, String, String, String, String, String, Option<String>, bool);

type ItemRow = (
    i64,
    String,
    i64,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

const SUBSCRIPTION_COLUMNS: &str =
    "id, url, platform, title, description, added_at, last_updated, active";

const ITEM_COLUMNS: &str = r#"
    i.id, i.item_key, i.subscription_id, i.title, i.description, i.link, i.category,
    i.pub_date, i.fetched_at, i.metadata, s.platform, s.url, s.title
"#;

/// SQLite-backed item store
pub struct SqliteItemStore {
    pool: SqlitePool,
}

impl SqliteItemStore {
    /// Open (creating if needed) the database file and apply the schema
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(format!("Failed to create directory: {}", e)))?;
        }

        // Workers write concurrently; readers must not block on them
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Database(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                platform TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                added_at TEXT NOT NULL,
                last_updated TEXT,
                active INTEGER NOT NULL DEFAULT 1
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_key TEXT NOT NULL UNIQUE,
                subscription_id INTEGER NOT NULL REFERENCES subscriptions(id),
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                link TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL,
                pub_date TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_items_key ON items(item_key)",
            "CREATE INDEX IF NOT EXISTS idx_items_subscription ON items(subscription_id)",
            "CREATE INDEX IF NOT EXISTS idx_items_category ON items(category)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        Ok(())
    }

    async fn query_items(
        &self,
        tail: &str,
        bind: Option<String>,
    ) -> Result<Vec<StoredItem>, StoreError> {
        let sql = format!(
            "SELECT {} FROM items i LEFT JOIN subscriptions s ON s.id = i.subscription_id {}",
            ITEM_COLUMNS, tail
        );

        let mut query = sqlx::query_as::<_, ItemRow>(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter().map(item_from_row).collect()
    }
}

fn parse_platform(tag: &str) -> Result<Platform, StoreError> {
    tag.parse::<Platform>()
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

fn parse_stored_time(value: &str) -> Result<OffsetDateTime, StoreError> {
    parse_timestamp(value)
        .ok_or_else(|| StoreError::Serialization(format!("Invalid timestamp: {}", value)))
}

fn subscription_from_row(row: SubscriptionRow) -> Result<Subscription, StoreError> {
    let (id, url, platform, title, description, added_at, last_updated, active) = row;

    Ok(Subscription {
        id,
        url,
        platform: parse_platform(&platform)?,
        title,
        description,
        added_at: parse_stored_time(&added_at)?,
        last_updated: last_updated.as_deref().map(parse_stored_time).transpose()?,
        active,
    })
}

fn item_from_row(row: ItemRow) -> Result<StoredItem, StoreError> {
    let (
        id,
        key,
        subscription_id,
        title,
        description,
        link,
        category,
        pub_date,
        fetched_at,
        metadata,
        platform,
        subscription_url,
        subscription_title,
    ) = row;

    let metadata = serde_json::from_str(&metadata)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    Ok(StoredItem {
        id,
        key: ItemKey::from_stored(key),
        subscription_id,
        title,
        description,
        link,
        category,
        pub_date,
        fetched_at,
        metadata,
        platform: platform.as_deref().map(parse_platform).transpose()?,
        subscription_url,
        subscription_title,
    })
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn add_subscription(
        &self,
        url: &str,
        platform: Platform,
        title: &str,
        description: &str,
    ) -> Result<i64, StoreError> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO subscriptions (url, platform, title, description, added_at, active)
            VALUES (?, ?, ?, ?, ?, 1)
            ON CONFLICT(url) DO UPDATE SET url = excluded.url
            RETURNING id
            "#,
        )
        .bind(url)
        .bind(platform.as_str())
        .bind(title)
        .bind(description)
        .bind(canonical_precise(OffsetDateTime::now_utc()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(id)
    }

    async fn subscription_exists(&self, url: &str) -> Result<bool, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE url = ?")
            .bind(url)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(count.0 > 0)
    }

    async fn get_subscription(&self, id: i64) -> Result<Option<Subscription>, StoreError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE id = ?",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        row.map(subscription_from_row).transpose()
    }

    async fn get_subscriptions(&self, active_only: bool) -> Result<Vec<Subscription>, StoreError> {
        let filter = if active_only { "WHERE active = 1" } else { "" };
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions {} ORDER BY id",
            SUBSCRIPTION_COLUMNS, filter
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        rows.into_iter().map(subscription_from_row).collect()
    }

    async fn set_subscription_active(&self, id: i64, active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE subscriptions SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn item_exists(&self, key: &ItemKey) -> Result<bool, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items WHERE item_key = ?")
            .bind(key.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(count.0 > 0)
    }

    async fn add_item(&self, item: &NewItem) -> Result<bool, StoreError> {
        let metadata = serde_json::to_string(&item.metadata)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let pub_date = normalize_pub_date(item.pub_date.as_deref(), item.fetched_at);

        let result = sqlx::query(
            r#"
            INSERT INTO items
            (item_key, subscription_id, title, description, link, category, pub_date, fetched_at, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(item_key) DO NOTHING
            "#,
        )
        .bind(item.key.as_str())
        .bind(item.subscription_id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.link)
        .bind(&item.category)
        .bind(&pub_date)
        .bind(canonical_precise(item.fetched_at))
        .bind(&metadata)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_subscription_timestamp(
        &self,
        id: i64,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE subscriptions SET last_updated = ? WHERE id = ?")
            .bind(canonical_precise(at))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    async fn update_subscription_title(&self, id: i64, title: &str) -> Result<bool, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET title = ?
            WHERE id = ?
              AND (title IS NULL OR TRIM(title) = '' OR title LIKE '% Subscription')
            "#,
        )
        .bind(title)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn all_items(&self, limit: usize) -> Result<Vec<StoredItem>, StoreError> {
        self.query_items(
            &format!("ORDER BY i.fetched_at DESC, i.id DESC LIMIT {}", limit),
            None,
        )
        .await
    }

    async fn new_items_since(
        &self,
        since: OffsetDateTime,
    ) -> Result<Vec<StoredItem>, StoreError> {
        self.query_items(
            "WHERE i.fetched_at >= ? ORDER BY i.category, i.pub_date DESC",
            Some(canonical_precise(since)),
        )
        .await
    }

    async fn latest_per_subscription(&self) -> Result<Vec<StoredItem>, StoreError> {
        self.query_items(
            r#"
            WHERE s.active = 1
              AND i.id = (
                SELECT i2.id FROM items i2
                WHERE i2.subscription_id = i.subscription_id
                ORDER BY i2.pub_date DESC, i2.id DESC
                LIMIT 1
              )
            ORDER BY i.pub_date DESC
            "#,
            None,
        )
        .await
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let (subscriptions, active): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(active), 0) FROM subscriptions")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

        let (items,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let by_category: Vec<(String, i64)> = sqlx::query_as(
            "SELECT category, COUNT(*) AS n FROM items GROUP BY category ORDER BY n DESC, category",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        let by_platform: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT s.platform, COUNT(*) AS n
            FROM items i JOIN subscriptions s ON s.id = i.subscription_id
            GROUP BY s.platform
            ORDER BY n DESC, s.platform
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(StoreStats {
            subscriptions: subscriptions as usize,
            active_subscriptions: active as usize,
            items: items as usize,
            by_category: by_category
                .into_iter()
                .map(|(category, n)| (category, n as usize))
                .collect(),
            by_platform: by_platform
                .into_iter()
                .map(|(platform, n)| Ok((parse_platform(&platform)?, n as usize)))
                .collect::<Result<_, StoreError>>()?,
        })
    }
}
