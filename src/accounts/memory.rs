/// In-memory account repository
///
/// Mirrors the Postgres semantics (case-insensitive uniqueness among live
/// rows, soft delete) for tests and local experimentation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::accounts::model::{Account, AccountChanges, NewAccount};
use crate::accounts::repository::AccountRepository;
use crate::error::{AppError, DatabaseError};

struct StoredAccount {
    account: Account,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Accounts {
    next_id: i64,
    rows: BTreeMap<i64, StoredAccount>,
}

impl Accounts {
    fn live(&self) -> impl Iterator<Item = &Account> {
        self.rows
            .values()
            .filter(|r| r.deleted_at.is_none())
            .map(|r| &r.account)
    }

    fn ensure_unique(&self, username: &str, email: &str, except: Option<i64>) -> Result<(), AppError> {
        let clash = self.live().any(|a| {
            Some(a.id) != except
                && (a.username.eq_ignore_ascii_case(username) || a.email.eq_ignore_ascii_case(email))
        });
        if clash {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "username or email already exists".to_string(),
            )));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAccountRepository {
    inner: Mutex<Accounts>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Accounts>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::Internal("account store lock poisoned".to_string()))
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, AppError> {
        let identifier = identifier.trim();
        let accounts = self.lock()?;
        let found = accounts
            .live()
            .find(|a| {
                a.username.eq_ignore_ascii_case(identifier) || a.email.eq_ignore_ascii_case(identifier)
            })
            .cloned();
        Ok(found)
    }

    async fn get(&self, id: i64) -> Result<Option<Account>, AppError> {
        let accounts = self.lock()?;
        let found = accounts.live().find(|a| a.id == id).cloned();
        Ok(found)
    }

    async fn list(&self) -> Result<Vec<Account>, AppError> {
        let accounts = self.lock()?;
        let all = accounts.live().cloned().collect();
        Ok(all)
    }

    async fn create(&self, new: NewAccount) -> Result<Account, AppError> {
        let mut accounts = self.lock()?;
        accounts.ensure_unique(&new.username, &new.email, None)?;

        accounts.next_id += 1;
        let now = Utc::now();
        let account = Account {
            id: accounts.next_id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            profile: new.profile,
            role: new.role,
            status: new.status,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        accounts.rows.insert(
            account.id,
            StoredAccount {
                account: account.clone(),
                deleted_at: None,
            },
        );
        Ok(account)
    }

    async fn update(&self, id: i64, changes: AccountChanges) -> Result<Option<Account>, AppError> {
        let mut accounts = self.lock()?;
        if accounts.live().all(|a| a.id != id) {
            return Ok(None);
        }
        accounts.ensure_unique(&changes.username, &changes.email, Some(id))?;

        let Some(stored) = accounts.rows.get_mut(&id) else {
            return Ok(None);
        };
        let account = &mut stored.account;
        account.username = changes.username;
        account.email = changes.email;
        if let Some(hash) = changes.password_hash {
            account.password_hash = hash;
        }
        account.profile = changes.profile;
        if let Some(role) = changes.role {
            account.role = role;
        }
        if let Some(status) = changes.status {
            account.status = status;
        }
        account.updated_at = Utc::now();
        Ok(Some(account.clone()))
    }

    async fn soft_delete(&self, id: i64) -> Result<bool, AppError> {
        let mut accounts = self.lock()?;
        match accounts.rows.get_mut(&id) {
            Some(stored) if stored.deleted_at.is_none() => {
                stored.deleted_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut accounts = self.lock()?;
        if let Some(stored) = accounts.rows.get_mut(&id) {
            stored.account.last_login_at = Some(at);
        }
        Ok(())
    }
}
