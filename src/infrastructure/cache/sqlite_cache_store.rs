use crate::application::ports::cache_store::CacheStore;
use crate::domain::entities::CachedEntry;
use crate::domain::value_objects::{CacheGeneration, RequestKey};
use crate::infrastructure::database::millis_to_datetime;
use crate::shared::error::AppError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, Pool, Sqlite, SqliteConnection};

#[derive(Debug, FromRow)]
struct CacheEntryRow {
    generation: String,
    request_key: String,
    status: i64,
    content_type: Option<String>,
    body: Vec<u8>,
    body_hash: String,
    stored_at: i64,
}

pub struct SqliteCacheStore {
    pool: Pool<Sqlite>,
}

impl SqliteCacheStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

fn body_hash(body: &[u8]) -> String {
    format!("{:x}", Sha256::digest(body))
}

async fn write_entry(conn: &mut SqliteConnection, entry: &CachedEntry) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO cache_entries (
            generation, request_key, status, content_type, body, body_hash, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(generation, request_key) DO UPDATE SET
            status = excluded.status,
            content_type = excluded.content_type,
            body = excluded.body,
            body_hash = excluded.body_hash,
            stored_at = excluded.stored_at
        "#,
    )
    .bind(entry.generation.as_str())
    .bind(entry.request_key.as_str())
    .bind(i64::from(entry.status))
    .bind(entry.content_type.as_deref())
    .bind(entry.body.as_ref())
    .bind(body_hash(&entry.body))
    .bind(entry.stored_at.timestamp_millis())
    .execute(conn)
    .await?;
    Ok(())
}

fn entry_from_row(row: CacheEntryRow) -> Result<CachedEntry, AppError> {
    if body_hash(&row.body) != row.body_hash {
        return Err(AppError::StoreCorruption(format!(
            "cached body for {} does not match its hash",
            row.request_key
        )));
    }

    Ok(CachedEntry {
        request_key: RequestKey::from_stored(row.request_key).map_err(AppError::StoreCorruption)?,
        generation: CacheGeneration::new(row.generation).map_err(AppError::StoreCorruption)?,
        status: u16::try_from(row.status)
            .map_err(|_| AppError::StoreCorruption(format!("invalid status {}", row.status)))?,
        content_type: row.content_type,
        body: Bytes::from(row.body),
        stored_at: millis_to_datetime(row.stored_at)?,
    })
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn install_generation(
        &self,
        generation: &CacheGeneration,
        entries: &[CachedEntry],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO cache_generations (name, is_active, installed_at)
            VALUES (?1, 0, ?2)
            ON CONFLICT(name) DO UPDATE SET installed_at = excluded.installed_at
            "#,
        )
        .bind(generation.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        for entry in entries {
            if &entry.generation != generation {
                return Err(AppError::Cache(format!(
                    "entry {} belongs to {}, not {}",
                    entry.request_key, entry.generation, generation
                )));
            }
            write_entry(&mut *tx, entry).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn is_installed(&self, generation: &CacheGeneration) -> Result<bool, AppError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_generations WHERE name = ?1")
            .bind(generation.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn put(&self, entry: &CachedEntry) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        write_entry(&mut *conn, entry).await
    }

    async fn get(
        &self,
        generation: &CacheGeneration,
        key: &RequestKey,
    ) -> Result<Option<CachedEntry>, AppError> {
        let row = sqlx::query_as::<_, CacheEntryRow>(
            r#"
            SELECT generation, request_key, status, content_type, body, body_hash, stored_at
            FROM cache_entries
            WHERE generation = ?1 AND request_key = ?2
            "#,
        )
        .bind(generation.as_str())
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(entry_from_row).transpose()
    }

    async fn delete(
        &self,
        generation: &CacheGeneration,
        key: &RequestKey,
    ) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM cache_entries WHERE generation = ?1 AND request_key = ?2")
                .bind(generation.as_str())
                .bind(key.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_generations(&self) -> Result<Vec<CacheGeneration>, AppError> {
        let names: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT name FROM cache_generations
            UNION
            SELECT DISTINCT generation FROM cache_entries
            ORDER BY 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        names
            .into_iter()
            .map(|(name,)| CacheGeneration::new(name).map_err(AppError::StoreCorruption))
            .collect()
    }

    async fn active_generation(&self) -> Result<Option<CacheGeneration>, AppError> {
        let name: Option<(String,)> =
            sqlx::query_as("SELECT name FROM cache_generations WHERE is_active = 1 LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        name.map(|(name,)| CacheGeneration::new(name).map_err(AppError::StoreCorruption))
            .transpose()
    }

    async fn activate(
        &self,
        generation: &CacheGeneration,
    ) -> Result<Vec<CacheGeneration>, AppError> {
        let stale = self
            .list_generations()
            .await?
            .into_iter()
            .filter(|name| name != generation)
            .collect::<Vec<_>>();

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE cache_generations SET is_active = 1, activated_at = ?2 WHERE name = ?1",
        )
        .bind(generation.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::Cache(format!(
                "cache generation {generation} is not installed"
            )));
        }

        sqlx::query("DELETE FROM cache_entries WHERE generation != ?1")
            .bind(generation.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM cache_generations WHERE name != ?1")
            .bind(generation.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use url::Url;

    async fn setup_store() -> SqliteCacheStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        SqliteCacheStore::new(pool)
    }

    fn entry(generation: &str, path: &str, body: &'static str) -> CachedEntry {
        let url = Url::parse("https://collector.example").unwrap().join(path).unwrap();
        CachedEntry {
            request_key: RequestKey::new("GET", &url).unwrap(),
            generation: CacheGeneration::new(generation.into()).unwrap(),
            status: 200,
            content_type: Some("text/html".into()),
            body: Bytes::from_static(body.as_bytes()),
            stored_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn install_and_activate_purges_other_generations() {
        let store = setup_store().await;
        let v1 = CacheGeneration::new("shell-v1".into()).unwrap();
        let v2 = CacheGeneration::new("shell-v2".into()).unwrap();

        store
            .install_generation(&v1, &[entry("shell-v1", "/", "old")])
            .await
            .unwrap();
        store.activate(&v1).await.unwrap();
        store
            .install_generation(&v2, &[entry("shell-v2", "/", "new")])
            .await
            .unwrap();

        let purged = store.activate(&v2).await.unwrap();
        assert_eq!(purged, vec![v1.clone()]);
        assert_eq!(store.list_generations().await.unwrap(), vec![v2.clone()]);
        assert_eq!(store.active_generation().await.unwrap(), Some(v2.clone()));

        let key = entry("shell-v2", "/", "").request_key;
        assert!(store.get(&v1, &key).await.unwrap().is_none());
        let cached = store.get(&v2, &key).await.unwrap().unwrap();
        assert_eq!(cached.body, Bytes::from_static(b"new"));
    }

    #[tokio::test]
    async fn activate_requires_install() {
        let store = setup_store().await;
        let missing = CacheGeneration::new("never-installed".into()).unwrap();
        assert!(matches!(
            store.activate(&missing).await,
            Err(AppError::Cache(_))
        ));
    }

    #[tokio::test]
    async fn put_overwrites_by_request_key() {
        let store = setup_store().await;
        let v1 = CacheGeneration::new("shell-v1".into()).unwrap();
        store.install_generation(&v1, &[]).await.unwrap();

        store.put(&entry("shell-v1", "/api/rates", "a")).await.unwrap();
        store.put(&entry("shell-v1", "/api/rates", "b")).await.unwrap();

        let key = entry("shell-v1", "/api/rates", "").request_key;
        let cached = store.get(&v1, &key).await.unwrap().unwrap();
        assert_eq!(cached.body, Bytes::from_static(b"b"));
    }
}
