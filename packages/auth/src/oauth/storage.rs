// ABOUTME: Key-value persistence for the access token, refresh token, and expiration time
// ABOUTME: Provides the TokenStore seam with a SQLite implementation and an in-memory one

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::{
    error::{AuthError, AuthResult},
    oauth::types::TokenRecord,
};

/// The persisted entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKey {
    AccessToken,
    RefreshToken,
    ExpirationTime,
}

impl TokenKey {
    pub const ALL: [TokenKey; 3] = [
        TokenKey::AccessToken,
        TokenKey::RefreshToken,
        TokenKey::ExpirationTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
            Self::ExpirationTime => "expiration_time",
        }
    }
}

/// Local key-value persistence for tokens.
///
/// Values are opaque strings; interpretation happens in [`TokenRecord`].
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: TokenKey) -> AuthResult<Option<String>>;

    async fn set(&self, key: TokenKey, value: &str) -> AuthResult<()>;

    async fn remove(&self, key: TokenKey) -> AuthResult<()>;

    /// Write several entries; implementations may make this atomic
    async fn set_many(&self, entries: &[(TokenKey, String)]) -> AuthResult<()> {
        for (key, value) in entries {
            self.set(*key, value).await?;
        }
        Ok(())
    }

    /// Read all three entries
    async fn load_record(&self) -> AuthResult<TokenRecord> {
        Ok(TokenRecord {
            access_token: self.get(TokenKey::AccessToken).await?,
            refresh_token: self.get(TokenKey::RefreshToken).await?,
            expires_at: self.get(TokenKey::ExpirationTime).await?,
        })
    }

    /// Remove every entry (logout)
    async fn clear(&self) -> AuthResult<()> {
        for key in TokenKey::ALL {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// SQLite-backed token store
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    /// Wrap an existing pool, creating the table if needed
    pub async fn new(pool: SqlitePool) -> AuthResult<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS token_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (unixepoch())
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| {
            error!("Failed to create token_store table: {}", e);
            AuthError::Storage(format!("Failed to initialize token store: {}", e))
        })?;

        Ok(Self { pool })
    }

    /// Open (or create) a database file at `path`
    pub async fn open(path: &Path) -> AuthResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&database_url)
            .await
            .map_err(|e| AuthError::Storage(format!("Failed to connect to database: {}", e)))?;

        Self::new(pool).await
    }

    /// Open the database at the default location
    pub async fn open_default() -> AuthResult<Self> {
        let path = Self::default_path()?;
        debug!("Opening token store at {}", path.display());
        Self::open(&path).await
    }

    /// `$GCAL_DATABASE_PATH`, or `~/.gcal/gcal.db`
    pub fn default_path() -> AuthResult<PathBuf> {
        if let Ok(path) = std::env::var(gcal_config::constants::GCAL_DATABASE_PATH) {
            if !path.trim().is_empty() {
                return Ok(PathBuf::from(path));
            }
        }

        Ok(dirs::home_dir()
            .ok_or_else(|| {
                AuthError::Configuration("Could not determine home directory".to_string())
            })?
            .join(".gcal")
            .join("gcal.db"))
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn get(&self, key: TokenKey) -> AuthResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM token_store WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: TokenKey, value: &str) -> AuthResult<()> {
        self.set_many(&[(key, value.to_string())]).await
    }

    async fn remove(&self, key: TokenKey) -> AuthResult<()> {
        debug!("Removing {} from token store", key.as_str());

        sqlx::query("DELETE FROM token_store WHERE key = ?")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn set_many(&self, entries: &[(TokenKey, String)]) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        for (key, value) in entries {
            debug!("Storing {}", key.as_str());
            sqlx::query(
                r#"
                INSERT INTO token_store (key, value, updated_at)
                VALUES (?, ?, unixepoch())
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = unixepoch()
                "#,
            )
            .bind(key.as_str())
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to store {}: {}", key.as_str(), e);
                AuthError::Storage(format!("Failed to store {}: {}", key.as_str(), e))
            })?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// In-memory token store, for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: RwLock<HashMap<TokenKey, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with a record
    pub fn with_record(record: TokenRecord) -> Self {
        let mut entries = HashMap::new();
        let pairs = [
            (TokenKey::AccessToken, record.access_token),
            (TokenKey::RefreshToken, record.refresh_token),
            (TokenKey::ExpirationTime, record.expires_at),
        ];
        for (key, value) in pairs {
            if let Some(value) = value {
                entries.insert(key, value);
            }
        }
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: TokenKey) -> AuthResult<Option<String>> {
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn set(&self, key: TokenKey, value: &str) -> AuthResult<()> {
        self.entries.write().await.insert(key, value.to_string());
        Ok(())
    }

    async fn remove(&self, key: TokenKey) -> AuthResult<()> {
        self.entries.write().await.remove(&key);
        Ok(())
    }
}
