/// Authorization Gate
///
/// Stateless: an access token is trusted on its signature and expiry
/// alone, and the session store is never consulted here. A logged-out
/// session can therefore keep authorizing requests until its access token
/// runs out (minutes). Refresh tokens are the statefully revocable half.

use crate::accounts::Role;
use crate::auth::claims::TokenKind;
use crate::auth::jwt::TokenCodec;
use crate::error::{AuthError, TokenError};

/// Identity extracted from a verified access token, stored in request
/// extensions for handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedAccount {
    pub account_id: i64,
    pub username: String,
    pub role: Role,
}

/// Decode an access token and extract the caller's identity.
///
/// Every failure is an `AuthError`; refresh tokens are refused here so a
/// long-lived credential cannot stand in for a short-lived one.
pub fn authenticate(codec: &TokenCodec, token: &str) -> Result<AuthenticatedAccount, AuthError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }

    let claims = codec.decode(token)?;
    if claims.kind != TokenKind::Access {
        return Err(AuthError::Token(TokenError::Malformed));
    }

    Ok(AuthenticatedAccount {
        account_id: claims.account_id,
        username: claims.username,
        role: claims.role,
    })
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Plain set membership. There is no hierarchy: `admin` only passes a
/// gate that lists `admin`.
pub fn require_role(allowed: &[Role], current: Role) -> Result<(), AuthError> {
    if allowed.contains(&current) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}
