//! Database repository for access and refresh tokens.
//!
//! Both token kinds share one row shape and differ only in their table, so
//! every operation is written once and parameterised by [`TokenKind`].

use crate::database::models::TokenRecord;
use crate::errors::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn table(self) -> &'static str {
        match self {
            TokenKind::Access => "access_tokens",
            TokenKind::Refresh => "refresh_tokens",
        }
    }
}

/// Repository for token database operations.
pub struct TokenRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> TokenRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_access_token(
        &self,
        user_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        insert_token(self.pool, TokenKind::Access, user_id, token, expires_at).await
    }

    pub async fn create_refresh_token(
        &self,
        user_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        insert_token(self.pool, TokenKind::Refresh, user_id, token, expires_at).await
    }

    /// Resolves an access token to its owner.
    ///
    /// # Errors
    /// `NotFound` if the token was never issued or has been revoked,
    /// `Expired` if it exists but `expires_at <= now`.
    pub async fn find_user_id_by_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<String> {
        self.find_user_id(TokenKind::Access, token, now).await
    }

    /// Same semantics as [`Self::find_user_id_by_access_token`].
    pub async fn find_user_id_by_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<String> {
        self.find_user_id(TokenKind::Refresh, token, now).await
    }

    /// Revokes every access and refresh token of a user in one transaction.
    ///
    /// Returns the number of rows removed across both tables.
    pub async fn delete_all_tokens_for_user(&self, user_id: &str) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await?;

        let access = sqlx::query("DELETE FROM access_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let refresh = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(access.rows_affected() + refresh.rows_affected())
    }

    /// Drops tokens whose expiry has passed. Returns the number of rows removed.
    pub async fn delete_expired_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut removed = 0;
        for kind in [TokenKind::Access, TokenKind::Refresh] {
            let sql = format!("DELETE FROM {} WHERE expires_at <= ?", kind.table());
            let result = sqlx::query(&sql)
                .bind(now.timestamp())
                .execute(self.pool)
                .await?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }

    async fn find_user_id(
        &self,
        kind: TokenKind,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<String> {
        let sql = format!(
            "SELECT id, user_id, token, expires_at, created_at FROM {} WHERE token = ?",
            kind.table()
        );
        let record = sqlx::query_as::<_, TokenRecord>(&sql)
            .bind(token)
            .fetch_optional(self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;

        if record.is_expired_at(now) {
            return Err(StoreError::Expired);
        }
        Ok(record.user_id)
    }
}

/// Stores one token through `conn`, which may be inside a transaction.
///
/// Expiries are stored as whole unix seconds.
pub async fn insert_token_with(
    conn: &mut SqliteConnection,
    kind: TokenKind,
    user_id: &str,
    token: &str,
    expires_at: DateTime<Utc>,
) -> StoreResult<()> {
    insert_token(conn, kind, user_id, token, expires_at).await
}

async fn insert_token<'e, E>(
    executor: E,
    kind: TokenKind,
    user_id: &str,
    token: &str,
    expires_at: DateTime<Utc>,
) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "INSERT INTO {} (user_id, token, expires_at, created_at) VALUES (?, ?, ?, ?)",
        kind.table()
    );
    sqlx::query(&sql)
        .bind(user_id)
        .bind(token)
        .bind(expires_at.timestamp())
        .bind(Utc::now().timestamp())
        .execute(executor)
        .await?;
    Ok(())
}
