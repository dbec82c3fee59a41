use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use twitch_helix::{AuthError, AuthResult, Token, TokenKind, TokenStore};

const MAX_CONNECTIONS: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Token table in a SQLite database, one row per [`TokenKind`].
#[derive(Clone)]
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    /// Opens (creating if needed) the database at `database_url`, e.g.
    /// `sqlite:yapdap.db`, and applies pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?;
        Self::connect_with(options).await
    }

    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        Self::connect_with(SqliteConnectOptions::new().filename(path)).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Self, sqlx::Error> {
        let options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        tracing::info!("Running token store migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("💾 Token store ready");

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn get(&self, kind: TokenKind) -> AuthResult<Option<Token>> {
        let row: Option<(String, DateTime<Utc>)> =
            sqlx::query_as("SELECT token, obtained_at FROM tokens WHERE id = ?")
                .bind(kind.key())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AuthError::persistence(kind, "read", e.to_string()))?;

        Ok(row.map(|(value, obtained_at)| Token {
            kind,
            value,
            obtained_at,
        }))
    }

    async fn set(&self, kind: TokenKind, value: &str) -> AuthResult<Token> {
        let token = Token::new(kind, value);

        sqlx::query(
            "INSERT INTO tokens (id, token, obtained_at) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET token = excluded.token, obtained_at = excluded.obtained_at",
        )
        .bind(kind.key())
        .bind(&token.value)
        .bind(token.obtained_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::persistence(kind, "write", e.to_string()))?;

        tracing::debug!("Stored {} token", kind);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store_in(dir: &TempDir) -> SqliteTokenStore {
        SqliteTokenStore::open(&dir.path().join("tokens.db")).await.unwrap()
    }

    #[tokio::test]
    async fn test_get_on_empty_table_is_none() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        assert!(store.get(TokenKind::App).await.unwrap().is_none());
        assert!(store.get(TokenKind::UserRefresh).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_then_get_for_both_kinds_with_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        store.set(TokenKind::App, "app-1").await.unwrap();
        store.set(TokenKind::UserRefresh, "refresh-1").await.unwrap();
        store.set(TokenKind::App, "app-2").await.unwrap();

        assert_eq!(store.get(TokenKind::App).await.unwrap().unwrap().value, "app-2");
        assert_eq!(store.get(TokenKind::UserRefresh).await.unwrap().unwrap().value, "refresh-1");
    }

    #[tokio::test]
    async fn test_repeated_set_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        store.set(TokenKind::UserRefresh, "same").await.unwrap();
        store.set(TokenKind::UserRefresh, "same").await.unwrap();

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tokens")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(store.get(TokenKind::UserRefresh).await.unwrap().unwrap().value, "same");
    }

    #[tokio::test]
    async fn test_tokens_survive_reopen() {
        let dir = TempDir::new().unwrap();

        let store = store_in(&dir).await;
        let written = store.set(TokenKind::UserRefresh, "durable").await.unwrap();
        store.close().await;

        let reopened = store_in(&dir).await;
        let read = reopened.get(TokenKind::UserRefresh).await.unwrap().unwrap();
        assert_eq!(read.value, "durable");
        assert_eq!(read.obtained_at, written.obtained_at);
    }
}
