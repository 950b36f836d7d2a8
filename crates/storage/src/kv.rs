use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use snafu::ResultExt;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tokio::sync::RwLock;

use super::error::{
    CreateSqliteDirectorySnafu, SqliteConnectOptionsSnafu, SqliteConnectSnafu, SqliteMigrateSnafu,
    SqlitePragmaSnafu, SqliteQuerySnafu, StorageResult,
};
use super::types::now_unix_ms;

pub const IN_MEMORY_DATABASE_URL: &str = "sqlite::memory:";

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opaque string-keyed blob store underneath the persistence adapter.
///
/// The adapter never interprets values; it hands whole JSON snapshots down
/// and gets them back verbatim.
pub trait KeyValueStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<Option<String>>>;
    fn put<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, StorageResult<()>>;
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<()>>;
}

#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    pub async fn open(database_location: &str) -> StorageResult<Self> {
        ensure_database_directory(database_location)?;

        let database_url = normalize_database_url(database_location);
        let connect_options = SqliteConnectOptions::from_str(&database_url)
            .context(SqliteConnectOptionsSnafu {
                stage: "kv-open-parse-url",
                database_url: database_url.clone(),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5_000));

        // A single connection keeps last-writer-wins semantics trivially true
        // and keeps in-memory databases alive for the pool's whole lifetime.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .context(SqliteConnectSnafu {
                stage: "kv-open-connect",
                database_url: database_url.clone(),
            })?;

        sqlx::query("PRAGMA busy_timeout = 5000;")
            .execute(&pool)
            .await
            .context(SqlitePragmaSnafu {
                stage: "kv-open-pragma-busy-timeout",
                pragma: "busy_timeout",
            })?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context(SqliteMigrateSnafu {
                stage: "kv-open-migrate",
            })?;

        Ok(Self { pool })
    }

    pub async fn open_in_memory() -> StorageResult<Self> {
        Self::open(IN_MEMORY_DATABASE_URL).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<Option<String>>> {
        Box::pin(async move {
            sqlx::query_scalar::<_, String>("SELECT value FROM kv_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .context(SqliteQuerySnafu { stage: "kv-get" })
        })
    }

    fn put<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO kv_entries (key, value, updated_at_unix_ms) VALUES (?, ?, ?) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
                 updated_at_unix_ms = excluded.updated_at_unix_ms",
            )
            .bind(key)
            .bind(value)
            .bind(now_unix_ms_for_row())
            .execute(&self.pool)
            .await
            .context(SqliteQuerySnafu { stage: "kv-put" })?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM kv_entries WHERE key = ?")
                .bind(key)
                .execute(&self.pool)
                .await
                .context(SqliteQuerySnafu { stage: "kv-delete" })?;
            Ok(())
        })
    }
}

/// Ephemeral store for tests and credential-less dry runs.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<Option<String>>> {
        Box::pin(async move { Ok(self.entries.read().await.get(key).cloned()) })
    }

    fn put<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            self.entries.write().await.insert(key.to_string(), value);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            self.entries.write().await.remove(key);
            Ok(())
        })
    }
}

fn normalize_database_url(database_location: &str) -> String {
    if database_location.starts_with("sqlite:") {
        database_location.to_string()
    } else {
        format!("sqlite://{database_location}")
    }
}

fn ensure_database_directory(database_location: &str) -> StorageResult<()> {
    if database_location.contains(":memory:") {
        return Ok(());
    }

    let path = database_location.trim_start_matches("sqlite://");
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateSqliteDirectorySnafu {
            stage: "kv-ensure-directory",
            path: parent.display().to_string(),
        })?;
    }

    Ok(())
}

fn now_unix_ms_for_row() -> i64 {
    i64::try_from(now_unix_ms()).unwrap_or(i64::MAX)
}
