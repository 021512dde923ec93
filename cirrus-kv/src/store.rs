//! SQLite-backed hierarchical key-value store.
//!
//! Keys form a `/`-separated namespace. Values are opaque strings (the
//! control plane stores one JSON document per entity). Writers serialize
//! per key through the connection pool; there are no multi-key
//! transactions.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::Result;

/// A single stored entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvPair {
    pub key: String,
    pub value: String,
}

/// Durable string→string store with prefix listing.
#[derive(Clone)]
pub struct KvStore {
    pool: SqlitePool,
}

impl KvStore {
    /// Open (or create) a store at `data_dir/cirrus.db`.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("cirrus.db");
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an ephemeral in-memory store.
    pub async fn open_in_memory() -> Result<Self> {
        // A single connection keeps the in-memory database alive for the
        // lifetime of the pool.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or replace a value.
    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a value.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    /// True if the key is present.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Delete a key. Returns whether anything was removed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List all entries whose key starts with `prefix`, ordered by key.
    pub async fn list(&self, prefix: &str) -> Result<Vec<KvPair>> {
        let pattern = format!("{}%", escape_like(prefix));
        let rows = sqlx::query(
            r#"
            SELECT key, value FROM kv
            WHERE key LIKE ? ESCAPE '\'
            ORDER BY key
            "#,
        )
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| KvPair {
                key: r.get::<String, _>(0),
                value: r.get::<String, _>(1),
            })
            .collect())
    }

    /// Delete every key under `prefix`. Returns the number of removed keys.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let pattern = format!("{}%", escape_like(prefix));
        let result = sqlx::query(r#"DELETE FROM kv WHERE key LIKE ? ESCAPE '\'"#)
            .bind(&pattern)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Keep only entries whose key has exactly `depth` path segments after
/// `prefix`.
///
/// With prefix `/ns/default/resources/vNet` and depth 1, the entry
/// `/ns/default/resources/vNet/vnet1` is kept while
/// `/ns/default/resources/vNet/vnet1/subnet/sn1` (depth 3) is not.
pub fn filter_by_depth(entries: Vec<KvPair>, prefix: &str, depth: usize) -> Vec<KvPair> {
    entries
        .into_iter()
        .filter(|e| {
            let rest = match e.key.strip_prefix(prefix) {
                Some(r) => r.trim_start_matches('/'),
                None => return false,
            };
            !rest.is_empty() && rest.split('/').count() == depth
        })
        .collect()
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> KvStore {
        KvStore::open_in_memory().await.expect("open store")
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let kv = store().await;

        kv.put("/ns/default", r#"{"id":"default"}"#).await.unwrap();
        let v = kv.get("/ns/default").await.unwrap();
        assert_eq!(v.as_deref(), Some(r#"{"id":"default"}"#));

        // Overwrite wins.
        kv.put("/ns/default", r#"{"id":"default","description":"x"}"#)
            .await
            .unwrap();
        let v = kv.get("/ns/default").await.unwrap();
        assert_eq!(v.as_deref(), Some(r#"{"id":"default","description":"x"}"#));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let kv = store().await;
        assert!(kv.get("/nope").await.unwrap().is_none());
        assert!(!kv.exists("/nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete() {
        let kv = store().await;
        kv.put("/a", "1").await.unwrap();

        assert!(kv.delete("/a").await.unwrap());
        assert!(kv.get("/a").await.unwrap().is_none());
        // Deleting again reports nothing removed.
        assert!(!kv.delete("/a").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_prefix_ordered() {
        let kv = store().await;
        kv.put("/ns/default/resources/vNet/v2", "b").await.unwrap();
        kv.put("/ns/default/resources/vNet/v1", "a").await.unwrap();
        kv.put("/ns/other/resources/vNet/v3", "c").await.unwrap();

        let entries = kv.list("/ns/default/resources/vNet/").await.unwrap();
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "/ns/default/resources/vNet/v1",
                "/ns/default/resources/vNet/v2"
            ]
        );
    }

    #[tokio::test]
    async fn test_filter_by_depth() {
        let kv = store().await;
        kv.put("/ns/default/resources/vNet/vnet1", "v").await.unwrap();
        kv.put("/ns/default/resources/vNet/vnet1/subnet/sn1", "s")
            .await
            .unwrap();
        kv.put("/ns/default/resources/vNet/vnet1/subnet/sn2", "s")
            .await
            .unwrap();

        let all = kv.list("/ns/default/resources/vNet").await.unwrap();
        assert_eq!(all.len(), 3);

        let vnets = filter_by_depth(all.clone(), "/ns/default/resources/vNet", 1);
        assert_eq!(vnets.len(), 1);
        assert_eq!(vnets[0].key, "/ns/default/resources/vNet/vnet1");

        let subnets = filter_by_depth(all, "/ns/default/resources/vNet/vnet1/subnet", 1);
        assert_eq!(subnets.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_prefix_removes_subtree() {
        let kv = store().await;
        kv.put("/ns/default/resources/vNet/vnet1", "v").await.unwrap();
        kv.put("/ns/default/resources/vNet/vnet1/subnet/sn1", "s")
            .await
            .unwrap();
        kv.put("/ns/default/resources/sshKey/k1", "k").await.unwrap();

        let removed = kv.delete_prefix("/ns/default/resources/vNet/vnet1").await.unwrap();
        assert_eq!(removed, 2);
        assert!(kv.list("/ns/default/resources/vNet/vnet1").await.unwrap().is_empty());
        // Unrelated keys survive.
        assert!(kv.exists("/ns/default/resources/sshKey/k1").await.unwrap());
    }

    #[tokio::test]
    async fn test_like_wildcards_are_literal() {
        let kv = store().await;
        kv.put("/a%b/x", "1").await.unwrap();
        kv.put("/axxb/x", "2").await.unwrap();

        let entries = kv.list("/a%b").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "/a%b/x");
    }

    #[tokio::test]
    async fn test_on_disk_store_persists() {
        let dir = tempfile::tempdir().unwrap();

        {
            let kv = KvStore::open(dir.path()).await.unwrap();
            kv.put("/ns/default", "{}").await.unwrap();
        }

        let kv = KvStore::open(dir.path()).await.unwrap();
        assert_eq!(kv.get("/ns/default").await.unwrap().as_deref(), Some("{}"));
    }
}
