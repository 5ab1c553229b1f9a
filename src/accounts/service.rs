/// Account management
///
/// Validates raw input into `NewAccount` / `AccountChanges` and drives the
/// repository. Deleting an account also revokes every refresh token it
/// still holds.

use serde::Deserialize;
use std::sync::Arc;

use crate::accounts::model::{Account, AccountChanges, AccountStatus, NewAccount, Profile, Role};
use crate::accounts::repository::AccountRepository;
use crate::auth::password::hash_password_with_cost;
use crate::auth::session_store::SessionStore;
use crate::configuration::AdminSettings;
use crate::error::{AppError, DatabaseError, ValidationError};
use crate::validators::{
    is_valid_email, is_valid_password, is_valid_username, optional_date, optional_phone,
    optional_text, optional_url,
};

const MAX_NAME_LENGTH: usize = 100;
const MAX_ADDRESS_LENGTH: usize = 255;
const MAX_POSTAL_CODE_LENGTH: usize = 20;

/// Self-service sign-up payload
#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

/// Admin create/update payload. Everything arrives as text and is
/// validated here.
#[derive(Debug, Default, Deserialize)]
pub struct AccountInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub avatar_url: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
}

fn blank_to_none(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl AccountInput {
    fn profile(&self) -> Result<Profile, ValidationError> {
        Ok(Profile {
            full_name: optional_text("full_name", self.full_name.as_deref(), MAX_NAME_LENGTH)?,
            phone: optional_phone(self.phone.as_deref())?,
            gender: blank_to_none(self.gender.as_deref())
                .map(str::parse)
                .transpose()?,
            date_of_birth: optional_date("date_of_birth", self.date_of_birth.as_deref())?,
            avatar_url: optional_url("avatar_url", self.avatar_url.as_deref())?,
            street: optional_text("street", self.street.as_deref(), MAX_ADDRESS_LENGTH)?,
            city: optional_text("city", self.city.as_deref(), MAX_NAME_LENGTH)?,
            state: optional_text("state", self.state.as_deref(), MAX_NAME_LENGTH)?,
            country: optional_text("country", self.country.as_deref(), MAX_NAME_LENGTH)?,
            postal_code: optional_text(
                "postal_code",
                self.postal_code.as_deref(),
                MAX_POSTAL_CODE_LENGTH,
            )?,
        })
    }

    fn identity(&self) -> Result<(String, String), ValidationError> {
        let username = is_valid_username(self.username.as_deref().unwrap_or_default())?;
        let email = is_valid_email(self.email.as_deref().unwrap_or_default())?;
        Ok((username, email))
    }

    fn role(&self) -> Result<Option<Role>, ValidationError> {
        blank_to_none(self.role.as_deref()).map(str::parse).transpose()
    }

    fn status(&self) -> Result<Option<AccountStatus>, ValidationError> {
        blank_to_none(self.status.as_deref()).map(str::parse).transpose()
    }
}

fn not_found(id: i64) -> AppError {
    AppError::Database(DatabaseError::NotFound(format!("account {}", id)))
}

#[derive(Clone)]
pub struct AccountService {
    accounts: Arc<dyn AccountRepository>,
    sessions: Arc<dyn SessionStore>,
    hash_cost: u32,
}

impl AccountService {
    pub fn new(accounts: Arc<dyn AccountRepository>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            accounts,
            sessions,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Override the bcrypt work factor (tests use the minimum).
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    fn hash(&self, password: &str) -> Result<String, AppError> {
        hash_password_with_cost(password, self.hash_cost)
    }

    /// Create a plain user account from an email and password.
    ///
    /// The username is the local part of the email. Does not log in.
    #[tracing::instrument(name = "accounts.register", skip(self, input))]
    pub async fn register(&self, input: RegisterInput) -> Result<Account, AppError> {
        let email = is_valid_email(&input.email)?;
        is_valid_password(&input.password)?;
        if input.password != input.confirm_password {
            return Err(ValidationError::Mismatch(
                "confirm_password".to_string(),
                "password".to_string(),
            )
            .into());
        }

        let local_part = email.split('@').next().unwrap_or_default();
        let username = is_valid_username(local_part)?;

        let account = self
            .accounts
            .create(NewAccount {
                username,
                email,
                password_hash: self.hash(&input.password)?,
                profile: Profile::default(),
                role: Role::User,
                status: AccountStatus::Active,
            })
            .await?;

        tracing::info!(account_id = account.id, "Account registered");
        Ok(account)
    }

    pub async fn list(&self) -> Result<Vec<Account>, AppError> {
        self.accounts.list().await
    }

    pub async fn get(&self, id: i64) -> Result<Account, AppError> {
        self.accounts.get(id).await?.ok_or_else(|| not_found(id))
    }

    #[tracing::instrument(name = "accounts.create", skip(self, input))]
    pub async fn create(&self, input: AccountInput) -> Result<Account, AppError> {
        let (username, email) = input.identity()?;
        let password = input.password.as_deref().unwrap_or_default();
        is_valid_password(password)?;

        let account = self
            .accounts
            .create(NewAccount {
                username,
                email,
                password_hash: self.hash(password)?,
                profile: input.profile()?,
                role: input.role()?.unwrap_or(Role::User),
                status: input.status()?.unwrap_or(AccountStatus::Active),
            })
            .await?;

        tracing::info!(account_id = account.id, role = %account.role, "Account created");
        Ok(account)
    }

    /// Replace an account's fields. The password is re-hashed only when a
    /// non-blank one is supplied; role and status keep their stored value
    /// when omitted.
    #[tracing::instrument(name = "accounts.update", skip(self, input))]
    pub async fn update(&self, id: i64, input: AccountInput) -> Result<Account, AppError> {
        let (username, email) = input.identity()?;

        let password_hash = match blank_to_none(input.password.as_deref()) {
            Some(_) => {
                let password = input.password.as_deref().unwrap_or_default();
                is_valid_password(password)?;
                Some(self.hash(password)?)
            }
            None => None,
        };

        let changes = AccountChanges {
            username,
            email,
            password_hash,
            profile: input.profile()?,
            role: input.role()?,
            status: input.status()?,
        };

        let account = self
            .accounts
            .update(id, changes)
            .await?
            .ok_or_else(|| not_found(id))?;

        tracing::info!(account_id = account.id, "Account updated");
        Ok(account)
    }

    /// Soft-delete an account and revoke its live refresh tokens.
    #[tracing::instrument(name = "accounts.delete", skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        if !self.accounts.soft_delete(id).await? {
            return Err(not_found(id));
        }

        let revoked = self.sessions.revoke_all_for_account(id).await?;
        tracing::info!(account_id = id, revoked_sessions = revoked, "Account deleted");
        Ok(())
    }

    /// Make sure the configured administrator exists and holds the admin
    /// role. An existing account with that email is promoted, never
    /// re-passworded.
    pub async fn ensure_admin(&self, admin: &AdminSettings) -> Result<Account, AppError> {
        let email = is_valid_email(&admin.email)?;

        if let Some(existing) = self.accounts.find_by_identifier(&email).await? {
            if existing.role == Role::Admin {
                return Ok(existing);
            }

            let promoted = self
                .accounts
                .update(
                    existing.id,
                    AccountChanges {
                        username: existing.username.clone(),
                        email: existing.email.clone(),
                        password_hash: None,
                        profile: existing.profile.clone(),
                        role: Some(Role::Admin),
                        status: None,
                    },
                )
                .await?
                .ok_or_else(|| not_found(existing.id))?;
            tracing::info!(account_id = promoted.id, "Existing account promoted to admin");
            return Ok(promoted);
        }

        let account = self
            .create(AccountInput {
                username: Some(admin.username.clone()),
                email: Some(email),
                password: Some(admin.password.clone()),
                role: Some(Role::Admin.to_string()),
                ..AccountInput::default()
            })
            .await?;
        tracing::info!(account_id = account.id, "Admin account seeded");
        Ok(account)
    }
}
