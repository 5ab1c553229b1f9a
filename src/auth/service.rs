/// Authentication Service
///
/// Per-session lifecycle: unauthenticated -> authenticated (pair issued,
/// refresh id recorded) -> revoked (refresh id invalidated). Nothing leads
/// from revoked back to authenticated except a fresh login.

use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use std::sync::Arc;
use uuid::Uuid;

use crate::accounts::{Account, AccountRepository};
use crate::auth::claims::TokenKind;
use crate::auth::jwt::TokenCodec;
use crate::auth::password::verify_password;
use crate::auth::session_store::SessionStore;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, TokenError};

lazy_static! {
    // Verified against when the identifier is unknown so both failure paths
    // pay for one bcrypt comparison.
    static ref DUMMY_HASH: String =
        bcrypt::hash("dummy-password-for-timing", bcrypt::DEFAULT_COST).unwrap_or_default();
}

/// Outcome of a successful login or refresh
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub refresh_token_id: Uuid,
    pub account: Account,
}

#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountRepository>,
    sessions: Arc<dyn SessionStore>,
    codec: TokenCodec,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        sessions: Arc<dyn SessionStore>,
        settings: &JwtSettings,
    ) -> Self {
        Self {
            accounts,
            sessions,
            codec: TokenCodec::from_settings(settings),
            access_ttl: Duration::seconds(settings.access_token_expiry),
            refresh_ttl: Duration::seconds(settings.refresh_token_expiry),
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Verify credentials and open a session.
    ///
    /// Unknown identifier and wrong password both end in
    /// `InvalidCredentials`. No token pair is returned unless its refresh
    /// id has been recorded.
    #[tracing::instrument(name = "auth.login", skip(self, password))]
    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginResult, AppError> {
        let account = match self.accounts.find_by_identifier(identifier).await? {
            Some(account) if verify_password(password, &account.password_hash) => account,
            Some(account) => {
                tracing::warn!(account_id = account.id, "Login failed: password mismatch");
                return Err(AuthError::InvalidCredentials.into());
            }
            None => {
                verify_password(password, &DUMMY_HASH);
                tracing::warn!("Login failed: unknown identifier");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let result = self.open_session(account).await?;

        if let Err(e) = self.accounts.touch_last_login(result.account.id, Utc::now()).await {
            tracing::warn!(account_id = result.account.id, error = %e, "Failed to record last login");
        }

        tracing::info!(account_id = result.account.id, "Login succeeded");
        Ok(result)
    }

    /// Revoke a refresh token id. Blank or unparseable ids, unknown ids and
    /// already revoked ids all succeed without touching anything.
    #[tracing::instrument(name = "auth.logout", skip(self))]
    pub async fn logout(&self, refresh_token_id: &str) -> Result<(), AppError> {
        let raw = refresh_token_id.trim();
        if raw.is_empty() {
            return Ok(());
        }

        let Ok(token_id) = Uuid::parse_str(raw) else {
            tracing::debug!("Logout with a token id that is not a UUID");
            return Ok(());
        };

        self.sessions.revoke_by_id(token_id).await?;
        tracing::info!(token_id = %token_id, "Refresh token revoked");
        Ok(())
    }

    /// Logout starting from the signed refresh token (the cookie value).
    ///
    /// A token that does not verify, or is already expired, has nothing
    /// left to revoke and is ignored.
    pub async fn logout_with_token(&self, refresh_token: &str) -> Result<(), AppError> {
        if refresh_token.trim().is_empty() {
            return Ok(());
        }

        match self.codec.decode(refresh_token) {
            Ok(claims) if claims.kind == TokenKind::Refresh => match claims.token_id {
                Some(token_id) => self.logout(&token_id.to_string()).await,
                None => Ok(()),
            },
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::debug!(error = %e, "Logout with an unusable refresh token");
                Ok(())
            }
        }
    }

    /// Trade a live refresh token for a new pair, revoking the old one.
    ///
    /// The old id is consumed atomically, so replaying a refresh token (or
    /// racing two refreshes) yields at most one new session.
    #[tracing::instrument(name = "auth.refresh", skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<LoginResult, AppError> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::MissingToken.into());
        }

        let claims = self.codec.decode(refresh_token)?;
        if claims.kind != TokenKind::Refresh {
            return Err(TokenError::Malformed.into());
        }
        let token_id = claims.token_id.ok_or(AuthError::InvalidClaims)?;

        let owner = self
            .sessions
            .consume(token_id)
            .await?
            .ok_or(AuthError::SessionInvalid)?;
        if owner != claims.account_id {
            tracing::warn!(token_id = %token_id, "Refresh token subject does not match its record");
            return Err(AuthError::SessionInvalid.into());
        }

        let account = self
            .accounts
            .get(owner)
            .await?
            .ok_or(AuthError::SessionInvalid)?;

        let result = self.open_session(account).await?;
        tracing::info!(account_id = result.account.id, "Session refreshed");
        Ok(result)
    }

    async fn open_session(&self, account: Account) -> Result<LoginResult, AppError> {
        let subject = account.public_profile();

        let access = self
            .codec
            .issue(&subject, TokenKind::Access, self.access_ttl, Uuid::new_v4())?;

        let refresh_token_id = Uuid::new_v4();
        let refresh = self
            .codec
            .issue(&subject, TokenKind::Refresh, self.refresh_ttl, refresh_token_id)?;

        // Without a recorded refresh id there is no revocation path, so the
        // pair must not leave this function.
        self.sessions
            .save(refresh_token_id, account.id, refresh.expires_at)
            .await
            .map_err(|e| {
                tracing::error!(account_id = account.id, error = %e, "Failed to persist refresh token");
                AppError::Internal("Failed to persist session".to_string())
            })?;

        Ok(LoginResult {
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.expires_at,
            refresh_token_id,
            account,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{
        AccountChanges, AccountStatus, InMemoryAccountRepository, NewAccount, Profile, Role,
    };
    use crate::auth::gate::authenticate;
    use crate::auth::password::hash_password_with_cost;
    use crate::auth::session_store::{InMemorySessionStore, RefreshTokenRecord};
    use async_trait::async_trait;

    fn settings() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 15 * 60,
            refresh_token_expiry: 168 * 60 * 60,
            issuer: "test".to_string(),
            refresh_cookie_name: "refresh_token".to_string(),
            cookie_secure: false,
        }
    }

    struct Fixture {
        service: AuthService,
        accounts: Arc<InMemoryAccountRepository>,
        sessions: Arc<InMemorySessionStore>,
        alice: Account,
    }

    async fn fixture() -> Fixture {
        let accounts = Arc::new(InMemoryAccountRepository::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let alice = accounts
            .create(NewAccount {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: hash_password_with_cost("correct-pw", 4).unwrap(),
                profile: Profile::default(),
                role: Role::User,
                status: AccountStatus::Active,
            })
            .await
            .unwrap();
        let service = AuthService::new(accounts.clone(), sessions.clone(), &settings());
        Fixture {
            service,
            accounts,
            sessions,
            alice,
        }
    }

    #[tokio::test]
    async fn test_login_issues_pair_and_records_session() {
        let fx = fixture().await;
        let before = Utc::now();

        let result = fx.service.login("alice", "correct-pw").await.unwrap();

        let access_ttl = result.access_expires_at - before;
        assert!(access_ttl > Duration::minutes(14) && access_ttl <= Duration::minutes(15));
        let refresh_ttl = result.refresh_expires_at - before;
        assert!(refresh_ttl > Duration::hours(167) && refresh_ttl <= Duration::hours(168));

        let record = fx.sessions.find(result.refresh_token_id).await.unwrap().unwrap();
        assert!(!record.revoked);
        assert_eq!(record.account_id, fx.alice.id);
        assert_eq!(record.expires_at, result.refresh_expires_at);
        assert_eq!(result.account.id, fx.alice.id);
    }

    #[tokio::test]
    async fn test_login_then_authenticate_round_trips_identity() {
        let fx = fixture().await;

        for identifier in ["alice", "ALICE@example.com"] {
            let result = fx.service.login(identifier, "correct-pw").await.unwrap();
            let account = authenticate(fx.service.codec(), &result.access_token).unwrap();
            assert_eq!(account.account_id, fx.alice.id);
            assert_eq!(account.role, fx.alice.role);
        }
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_identical() {
        let fx = fixture().await;

        let wrong = fx.service.login("alice", "wrong-pw").await.unwrap_err();
        let unknown = fx.service.login("mallory", "correct-pw").await.unwrap_err();

        assert!(matches!(wrong, AppError::Auth(AuthError::InvalidCredentials)));
        assert!(matches!(unknown, AppError::Auth(AuthError::InvalidCredentials)));
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(fx.sessions.purge_expired(Utc::now() + Duration::days(365)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_login_stamps_last_login() {
        let fx = fixture().await;
        fx.service.login("alice", "correct-pw").await.unwrap();

        let stored = fx.accounts.get(fx.alice.id).await.unwrap().unwrap();
        assert!(stored.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_logout_revokes_refresh_id() {
        let fx = fixture().await;
        let result = fx.service.login("alice", "correct-pw").await.unwrap();
        assert!(fx.sessions.is_valid(result.refresh_token_id).await.unwrap());

        fx.service
            .logout(&result.refresh_token_id.to_string())
            .await
            .unwrap();
        assert!(!fx.sessions.is_valid(result.refresh_token_id).await.unwrap());

        // logging out twice is fine
        fx.service
            .logout(&result.refresh_token_id.to_string())
            .await
            .unwrap();
        assert!(!fx.sessions.is_valid(result.refresh_token_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_logout_with_empty_or_garbage_id_is_noop() {
        let fx = fixture().await;
        let result = fx.service.login("alice", "correct-pw").await.unwrap();

        fx.service.logout("").await.unwrap();
        fx.service.logout("   ").await.unwrap();
        fx.service.logout("not-a-uuid").await.unwrap();

        assert!(fx.sessions.is_valid(result.refresh_token_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_logout_with_token() {
        let fx = fixture().await;
        let result = fx.service.login("alice", "correct-pw").await.unwrap();

        // an access token carries no refresh id
        fx.service.logout_with_token(&result.access_token).await.unwrap();
        assert!(fx.sessions.is_valid(result.refresh_token_id).await.unwrap());

        fx.service.logout_with_token(&result.refresh_token).await.unwrap();
        assert!(!fx.sessions.is_valid(result.refresh_token_id).await.unwrap());

        fx.service.logout_with_token("garbage").await.unwrap();
    }

    #[tokio::test]
    async fn test_access_token_outlives_logout() {
        let fx = fixture().await;
        let result = fx.service.login("alice", "correct-pw").await.unwrap();
        fx.service.logout_with_token(&result.refresh_token).await.unwrap();

        // stateless gate: still admitted until the access token expires
        assert!(authenticate(fx.service.codec(), &result.access_token).is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rotates_the_session() {
        let fx = fixture().await;
        let first = fx.service.login("alice", "correct-pw").await.unwrap();

        let second = fx.service.refresh(&first.refresh_token).await.unwrap();

        assert_ne!(first.refresh_token_id, second.refresh_token_id);
        assert!(!fx.sessions.is_valid(first.refresh_token_id).await.unwrap());
        assert!(fx.sessions.is_valid(second.refresh_token_id).await.unwrap());
        assert_eq!(
            authenticate(fx.service.codec(), &second.access_token)
                .unwrap()
                .account_id,
            fx.alice.id
        );

        // replaying the old refresh token fails
        let replay = fx.service.refresh(&first.refresh_token).await.unwrap_err();
        assert!(replay.is_unauthorized());
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_cannot_refresh() {
        let fx = fixture().await;
        let result = fx.service.login("alice", "correct-pw").await.unwrap();
        fx.service.logout_with_token(&result.refresh_token).await.unwrap();

        let err = fx.service.refresh(&result.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::SessionInvalid)));
    }

    #[tokio::test]
    async fn test_access_token_cannot_refresh() {
        let fx = fixture().await;
        let result = fx.service.login("alice", "correct-pw").await.unwrap();

        let err = fx.service.refresh(&result.access_token).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(fx.sessions.is_valid(result.refresh_token_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_for_deleted_account_fails() {
        let fx = fixture().await;
        let result = fx.service.login("alice", "correct-pw").await.unwrap();
        fx.accounts.soft_delete(fx.alice.id).await.unwrap();

        let err = fx.service.refresh(&result.refresh_token).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_refresh_picks_up_role_changes() {
        let fx = fixture().await;
        let result = fx.service.login("alice", "correct-pw").await.unwrap();
        fx.accounts
            .update(
                fx.alice.id,
                AccountChanges {
                    username: "alice".to_string(),
                    email: "alice@example.com".to_string(),
                    password_hash: None,
                    profile: Profile::default(),
                    role: Some(Role::Admin),
                    status: None,
                },
            )
            .await
            .unwrap();

        let refreshed = fx.service.refresh(&result.refresh_token).await.unwrap();
        let account = authenticate(fx.service.codec(), &refreshed.access_token).unwrap();
        assert_eq!(account.role, Role::Admin);
    }

    /// Session store whose writes always fail
    struct BrokenSessionStore;

    #[async_trait]
    impl SessionStore for BrokenSessionStore {
        async fn save(&self, _: Uuid, _: i64, _: DateTime<Utc>) -> Result<(), AppError> {
            Err(AppError::Internal("disk on fire".to_string()))
        }
        async fn revoke_by_id(&self, _: Uuid) -> Result<(), AppError> {
            Err(AppError::Internal("disk on fire".to_string()))
        }
        async fn is_valid(&self, _: Uuid) -> Result<bool, AppError> {
            Ok(false)
        }
        async fn find(&self, _: Uuid) -> Result<Option<RefreshTokenRecord>, AppError> {
            Ok(None)
        }
        async fn consume(&self, _: Uuid) -> Result<Option<i64>, AppError> {
            Ok(None)
        }
        async fn revoke_all_for_account(&self, _: i64) -> Result<u64, AppError> {
            Ok(0)
        }
        async fn purge_expired(&self, _: DateTime<Utc>) -> Result<u64, AppError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_login_fails_when_session_cannot_be_recorded() {
        let fx = fixture().await;
        let service = AuthService::new(fx.accounts.clone(), Arc::new(BrokenSessionStore), &settings());

        let err = service.login("alice", "correct-pw").await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
