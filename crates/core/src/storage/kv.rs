use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()>;
}

pub async fn load_json<T: DeserializeOwned>(
    kv: &dyn KvStore,
    key: &str,
) -> anyhow::Result<Option<T>> {
    let Some(bytes) = kv.get(key).await? else {
        return Ok(None);
    };
    let value = serde_json::from_slice::<T>(&bytes)
        .with_context(|| format!("stored value under {key:?} is not valid JSON"))?;
    Ok(Some(value))
}

pub async fn save_json<T: Serialize + ?Sized>(
    kv: &dyn KvStore,
    key: &str,
    value: &T,
) -> anyhow::Result<()> {
    let bytes =
        serde_json::to_vec(value).with_context(|| format!("failed to serialize {key:?}"))?;
    kv.put(key, bytes).await
}

#[derive(Debug, Default)]
pub struct MemoryKv {
    inner: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let map = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory kv lock poisoned"))?;
        Ok(map.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory kv lock poisoned"))?;
        map.insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PgKv {
    pool: sqlx::PgPool,
}

impl PgKv {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl KvStore for PgKv {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT value FROM kv_blobs WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("select kv_blobs failed (key={key})"))?;
        Ok(row.map(|r| r.0))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO kv_blobs (key, value, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("upsert kv_blobs failed (key={key})"))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct FailingKv;

    #[async_trait::async_trait]
    impl KvStore for FailingKv {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn put(&self, key: &str, _value: Vec<u8>) -> anyhow::Result<()> {
            anyhow::bail!("write to {key} refused")
        }
    }

    #[tokio::test]
    async fn memory_kv_round_trips_json() {
        let kv = MemoryKv::new();
        assert_eq!(load_json::<Vec<String>>(&kv, "watchlist").await.unwrap(), None);

        save_json(&kv, "watchlist", &vec!["600519".to_string()])
            .await
            .unwrap();
        let got: Vec<String> = load_json(&kv, "watchlist").await.unwrap().unwrap();
        assert_eq!(got, vec!["600519"]);
    }

    #[tokio::test]
    async fn garbled_blob_is_an_error() {
        let kv = MemoryKv::new();
        kv.put("watchlist", b"not json".to_vec()).await.unwrap();
        assert!(load_json::<Vec<String>>(&kv, "watchlist").await.is_err());
    }
}
