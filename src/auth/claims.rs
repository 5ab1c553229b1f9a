/// JWT Claims
///
/// Two shapes live here:
/// - `IssuedClaims`: exactly what this service writes into a token.
/// - `Claims`: the strongly-typed result of decoding any accepted token.
///
/// Decoding goes through `RawClaims`, which tolerates a few alternate key
/// spellings seen from other issuers: the subject id may arrive as `uid`,
/// `user_id` or `sub` (number or numeric string), and the role as `role`
/// or `rol`. The lookup order is fixed and tried once. This is a
/// compatibility concession only; the signature check already happened
/// before any of it runs, so it is not a security boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::accounts::Role;
use crate::error::AuthError;

/// Purpose of a token. Access tokens authorize requests, refresh tokens
/// only mint new pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims as written by this service (RFC 7519 registered claims plus ours)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IssuedClaims {
    /// Account id
    pub uid: i64,
    /// Account id again, as a string, for generic JWT consumers
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub typ: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Unique token id, the revocation key for refresh tokens
    pub jti: String,
    pub iss: String,
}

/// Verified, strongly-typed claims handed to the rest of the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub account_id: i64,
    pub username: String,
    pub role: Role,
    pub kind: TokenKind,
    pub issued_at: i64,
    pub expires_at: i64,
    pub token_id: Option<Uuid>,
}

/// Loosely-typed payload, used only as the input to `Claims::try_from`
#[derive(Debug, Deserialize)]
pub(crate) struct RawClaims {
    uid: Option<Value>,
    user_id: Option<Value>,
    sub: Option<Value>,
    role: Option<Value>,
    rol: Option<Value>,
    username: Option<String>,
    typ: Option<TokenKind>,
    iat: Option<i64>,
    exp: i64,
    jti: Option<String>,
}

/// Accepts a positive integer given either as a JSON number (integral
/// floats such as `5.0` included) or a numeric string.
fn positive_id(value: Option<&Value>) -> Option<i64> {
    let id = match value? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;
    (id > 0).then_some(id)
}

fn role_name(value: Option<&Value>) -> Option<&str> {
    value?.as_str().filter(|r| !r.trim().is_empty())
}

impl TryFrom<RawClaims> for Claims {
    type Error = AuthError;

    fn try_from(raw: RawClaims) -> Result<Self, Self::Error> {
        let account_id = [&raw.uid, &raw.user_id, &raw.sub]
            .into_iter()
            .find_map(|candidate| positive_id(candidate.as_ref()))
            .ok_or(AuthError::InvalidClaims)?;

        let role = role_name(raw.role.as_ref())
            .or_else(|| role_name(raw.rol.as_ref()))
            .ok_or(AuthError::InvalidClaims)?
            .parse::<Role>()
            .map_err(|_| AuthError::InvalidClaims)?;

        // A present-but-garbled jti is a broken token, not an absent one.
        let token_id = raw
            .jti
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| AuthError::InvalidClaims)?;

        Ok(Claims {
            account_id,
            username: raw.username.unwrap_or_default(),
            role,
            // Tokens from issuers that predate `typ` are access tokens.
            kind: raw.typ.unwrap_or(TokenKind::Access),
            issued_at: raw.iat.unwrap_or_default(),
            expires_at: raw.exp,
            token_id,
        })
    }
}
