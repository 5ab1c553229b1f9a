/// Session Store
///
/// The revocation ledger for refresh tokens. Only the token id (`jti`) is
/// persisted, never the token itself. A record is usable while it is not
/// revoked and its expiry lies in the future. Records are never deleted on
/// the request path; `purge_expired` exists for an external sweep.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, DatabaseError};

/// A persisted refresh-token record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub token_id: Uuid,
    pub account_id: i64,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && now < self.expires_at
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new record. A duplicate `token_id` is a unique violation.
    async fn save(
        &self,
        token_id: Uuid,
        account_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Flip `revoked` to true. Unknown or already revoked ids are a no-op.
    async fn revoke_by_id(&self, token_id: Uuid) -> Result<(), AppError>;

    /// True iff the record exists, is not revoked and has not expired.
    async fn is_valid(&self, token_id: Uuid) -> Result<bool, AppError>;

    async fn find(&self, token_id: Uuid) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Atomically revoke a record that is currently valid and return its
    /// owner. `None` means the id was unknown, expired or already revoked,
    /// so of two concurrent callers at most one gets `Some`.
    async fn consume(&self, token_id: Uuid) -> Result<Option<i64>, AppError>;

    /// Revoke every live record of an account; returns how many flipped.
    async fn revoke_all_for_account(&self, account_id: i64) -> Result<u64, AppError>;

    /// Delete records that expired before `before`; returns how many went.
    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, AppError>;
}

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn save(
        &self,
        token_id: Uuid,
        account_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_id, account_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(token_id)
        .bind(account_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn revoke_by_id(&self, token_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, updated_at = now()
            WHERE token_id = $1 AND revoked = false
            "#,
        )
        .bind(token_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(token_id = %token_id, "Refresh token already revoked or unknown");
        }
        Ok(())
    }

    async fn is_valid(&self, token_id: Uuid) -> Result<bool, AppError> {
        let valid = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM refresh_tokens
                WHERE token_id = $1 AND revoked = false AND expires_at > now()
            )
            "#,
        )
        .bind(token_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(valid)
    }

    async fn find(&self, token_id: Uuid) -> Result<Option<RefreshTokenRecord>, AppError> {
        let row = sqlx::query_as::<_, (Uuid, i64, DateTime<Utc>, bool, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            SELECT token_id, account_id, expires_at, revoked, created_at, updated_at
            FROM refresh_tokens
            WHERE token_id = $1
            "#,
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(token_id, account_id, expires_at, revoked, created_at, updated_at)| RefreshTokenRecord {
                token_id,
                account_id,
                expires_at,
                revoked,
                created_at,
                updated_at,
            },
        ))
    }

    async fn consume(&self, token_id: Uuid) -> Result<Option<i64>, AppError> {
        let owner = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, updated_at = now()
            WHERE token_id = $1 AND revoked = false AND expires_at > now()
            RETURNING account_id
            "#,
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(owner)
    }

    async fn revoke_all_for_account(&self, account_id: i64) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = true, updated_at = now()
            WHERE account_id = $1 AND revoked = false
            "#,
        )
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(account_id = account_id, revoked = result.rows_affected(), "Refresh tokens revoked for account");
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Process-local session store for tests and local experimentation
#[derive(Default)]
pub struct InMemorySessionStore {
    records: Mutex<HashMap<Uuid, RefreshTokenRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, RefreshTokenRecord>>, AppError> {
        self.records
            .lock()
            .map_err(|_| AppError::Internal("session store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(
        &self,
        token_id: Uuid,
        account_id: i64,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut records = self.lock()?;
        if records.contains_key(&token_id) {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "refresh token id already exists".to_string(),
            )));
        }
        let now = Utc::now();
        records.insert(
            token_id,
            RefreshTokenRecord {
                token_id,
                account_id,
                expires_at,
                revoked: false,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn revoke_by_id(&self, token_id: Uuid) -> Result<(), AppError> {
        let mut records = self.lock()?;
        if let Some(record) = records.get_mut(&token_id).filter(|r| !r.revoked) {
            record.revoked = true;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn is_valid(&self, token_id: Uuid) -> Result<bool, AppError> {
        let records = self.lock()?;
        Ok(records
            .get(&token_id)
            .is_some_and(|r| r.is_valid_at(Utc::now())))
    }

    async fn find(&self, token_id: Uuid) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(self.lock()?.get(&token_id).cloned())
    }

    async fn consume(&self, token_id: Uuid) -> Result<Option<i64>, AppError> {
        let mut records = self.lock()?;
        let now = Utc::now();
        match records.get_mut(&token_id) {
            Some(record) if record.is_valid_at(now) => {
                record.revoked = true;
                record.updated_at = now;
                Ok(Some(record.account_id))
            }
            _ => Ok(None),
        }
    }

    async fn revoke_all_for_account(&self, account_id: i64) -> Result<u64, AppError> {
        let mut records = self.lock()?;
        let now = Utc::now();
        let mut revoked = 0;
        for record in records
            .values_mut()
            .filter(|r| r.account_id == account_id && !r.revoked)
        {
            record.revoked = true;
            record.updated_at = now;
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let mut records = self.lock()?;
        let len = records.len();
        records.retain(|_, r| r.expires_at >= before);
        Ok((len - records.len()) as u64)
    }
}
