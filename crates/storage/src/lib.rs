use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use pastewatch_core::PastyRecord;

/// The durable pasty catalog. The single persistence worker owns the only
/// handle; SQLite is not assumed to tolerate concurrent writers.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let store = Self::connect(options).await?;
        info!(file = %path.display(), "opened sqlite store");
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self> {
        Self::connect(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert or refresh the row keyed by `(site, id)`.
    pub async fn upsert(&self, record: &PastyRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO pasties (site, id, md5, url, local_path, timestamp, matches)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (site, id) DO UPDATE SET
                md5 = excluded.md5,
                url = excluded.url,
                local_path = excluded.local_path,
                timestamp = excluded.timestamp,
                matches = excluded.matches",
        )
        .bind(&record.site)
        .bind(&record.id)
        .bind(&record.md5)
        .bind(&record.url)
        .bind(&record.local_path)
        .bind(chrono::Utc::now())
        .bind(&record.matches)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pasties")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Fetch `(md5, matches, local_path)` for one pasty, if recorded.
    pub async fn get(&self, site: &str, id: &str) -> Result<Option<(String, String, String)>> {
        let row = sqlx::query_as("SELECT md5, matches, local_path FROM pasties WHERE site = ?1 AND id = ?2")
            .bind(site)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(site: &str, id: &str, md5: &str, matches: &str) -> PastyRecord {
        PastyRecord {
            site: site.into(),
            id: id.into(),
            md5: md5.into(),
            url: format!("https://paste.example/raw/{}", id),
            local_path: String::new(),
            matches: matches.into(),
        }
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let store = Store::open_in_memory().await.unwrap();
        store.upsert(&record("demo", "abc", "d41d", "")).await.unwrap();
        store
            .upsert(&record("demo", "abc", "d41d", "[aws-key]"))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        let (md5, matches, _) = store.get("demo", "abc").await.unwrap().unwrap();
        assert_eq!(md5, "d41d");
        assert_eq!(matches, "[aws-key]");
    }

    #[tokio::test]
    async fn test_rows_are_keyed_by_site_and_id() {
        let store = Store::open_in_memory().await.unwrap();
        store.upsert(&record("demo", "abc", "1", "")).await.unwrap();
        store.upsert(&record("demo", "def", "2", "")).await.unwrap();
        store.upsert(&record("other", "abc", "3", "")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_get_missing_row() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.get("demo", "nope").await.unwrap().is_none());
    }
}
