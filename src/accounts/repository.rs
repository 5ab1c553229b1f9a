/// Account persistence
///
/// `AccountRepository` is the seam between the services and the store.
/// `PgAccountRepository` is the production implementation; soft-deleted
/// rows (`deleted_at IS NOT NULL`) are invisible to every lookup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::accounts::model::{Account, AccountChanges, NewAccount, Profile};
use crate::error::AppError;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Case-insensitive match on username OR email.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, AppError>;

    async fn get(&self, id: i64) -> Result<Option<Account>, AppError>;

    /// All live accounts ordered by id.
    async fn list(&self) -> Result<Vec<Account>, AppError>;

    /// Fails with a unique-violation error on duplicate username/email.
    async fn create(&self, account: NewAccount) -> Result<Account, AppError>;

    /// Returns `None` when the account does not exist.
    async fn update(&self, id: i64, changes: AccountChanges) -> Result<Option<Account>, AppError>;

    /// Returns `false` when nothing was deleted.
    async fn soft_delete(&self, id: i64) -> Result<bool, AppError>;

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError>;
}

const ACCOUNT_COLUMNS: &str = r#"
    id, username, email, password_hash, full_name, phone, gender, date_of_birth,
    avatar_url, street, city, state, country, postal_code, role, status,
    last_login_at, created_at, updated_at
"#;

pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_enum<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr<Err = crate::error::ValidationError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn account_from_row(row: &PgRow) -> Result<Account, sqlx::Error> {
    let gender: Option<String> = row.try_get("gender")?;
    let gender = gender
        .map(|g| g.parse())
        .transpose()
        .map_err(|e: crate::error::ValidationError| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Account {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        profile: Profile {
            full_name: row.try_get("full_name")?,
            phone: row.try_get("phone")?,
            gender,
            date_of_birth: row.try_get("date_of_birth")?,
            avatar_url: row.try_get("avatar_url")?,
            street: row.try_get("street")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            country: row.try_get("country")?,
            postal_code: row.try_get("postal_code")?,
        },
        role: decode_enum(row, "role")?,
        status: decode_enum(row, "status")?,
        last_login_at: row.try_get("last_login_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, AppError> {
        let query = format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            WHERE deleted_at IS NULL
              AND (lower(username) = lower($1) OR lower(email) = lower($1))
            ORDER BY id
            LIMIT 1
            "#
        );
        let row = sqlx::query(&query)
            .bind(identifier.trim())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(account_from_row).transpose()?)
    }

    async fn get(&self, id: i64) -> Result<Option<Account>, AppError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(account_from_row).transpose()?)
    }

    async fn list(&self) -> Result<Vec<Account>, AppError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE deleted_at IS NULL ORDER BY id"
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(account_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn create(&self, account: NewAccount) -> Result<Account, AppError> {
        let query = format!(
            r#"
            INSERT INTO accounts (
                username, email, password_hash, full_name, phone, gender, date_of_birth,
                avatar_url, street, city, state, country, postal_code, role, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let p = &account.profile;
        let row = sqlx::query(&query)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(&p.full_name)
            .bind(&p.phone)
            .bind(p.gender.map(|g| g.as_str()))
            .bind(p.date_of_birth)
            .bind(&p.avatar_url)
            .bind(&p.street)
            .bind(&p.city)
            .bind(&p.state)
            .bind(&p.country)
            .bind(&p.postal_code)
            .bind(account.role.as_str())
            .bind(account.status.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(account_from_row(&row)?)
    }

    async fn update(&self, id: i64, changes: AccountChanges) -> Result<Option<Account>, AppError> {
        let query = format!(
            r#"
            UPDATE accounts SET
                username = $2,
                email = $3,
                password_hash = COALESCE($4, password_hash),
                full_name = $5,
                phone = $6,
                gender = $7,
                date_of_birth = $8,
                avatar_url = $9,
                street = $10,
                city = $11,
                state = $12,
                country = $13,
                postal_code = $14,
                role = COALESCE($15, role),
                status = COALESCE($16, status),
                updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        let p = &changes.profile;
        let row = sqlx::query(&query)
            .bind(id)
            .bind(&changes.username)
            .bind(&changes.email)
            .bind(&changes.password_hash)
            .bind(&p.full_name)
            .bind(&p.phone)
            .bind(p.gender.map(|g| g.as_str()))
            .bind(p.date_of_birth)
            .bind(&p.avatar_url)
            .bind(&p.street)
            .bind(&p.city)
            .bind(&p.state)
            .bind(&p.country)
            .bind(&p.postal_code)
            .bind(changes.role.map(|r| r.as_str()))
            .bind(changes.status.map(|s| s.as_str()))
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(account_from_row).transpose()?)
    }

    async fn soft_delete(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET deleted_at = now(), updated_at = now()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE accounts SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
