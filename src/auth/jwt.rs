/// Token Codec
///
/// Builds and verifies HMAC-signed JWTs. The codec is constructed from an
/// explicit secret and never reads process-wide state, so tests can run
/// with any secret they like.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::accounts::PublicProfile;
use crate::auth::claims::{Claims, IssuedClaims, RawClaims, TokenKind};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, TokenError};

/// Only the HMAC family is accepted; any other `alg` header is refused
/// before the signature is even looked at.
const ACCEPTED_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// A signed token and the instant it stops being valid
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
}

impl TokenCodec {
    pub fn new(secret: &str, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.leeway = 0;
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: issuer.to_string(),
        }
    }

    pub fn from_settings(settings: &JwtSettings) -> Self {
        Self::new(&settings.secret, &settings.issuer)
    }

    /// Sign a token for `subject` that expires `ttl` from now.
    pub fn issue(
        &self,
        subject: &PublicProfile,
        kind: TokenKind,
        ttl: Duration,
        token_id: Uuid,
    ) -> Result<IssuedToken, AppError> {
        self.issue_at(Utc::now(), subject, kind, ttl, token_id)
    }

    /// Same as `issue` with an explicit issue instant.
    pub fn issue_at(
        &self,
        now: DateTime<Utc>,
        subject: &PublicProfile,
        kind: TokenKind,
        ttl: Duration,
        token_id: Uuid,
    ) -> Result<IssuedToken, AppError> {
        let iat = now.timestamp();
        let exp = iat + ttl.num_seconds();
        let expires_at = DateTime::<Utc>::from_timestamp(exp, 0)
            .ok_or_else(|| AppError::Internal("Token expiry out of range".to_string()))?;

        let claims = IssuedClaims {
            uid: subject.id,
            sub: subject.id.to_string(),
            username: subject.username.clone(),
            role: subject.role,
            typ: kind,
            iat,
            exp,
            jti: token_id.to_string(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verify signature, algorithm, issuer and expiry, then extract claims.
    ///
    /// # Errors
    /// - `Token(Expired)` for a correctly signed token at or past its expiry
    /// - `Token(Malformed)` for anything structurally wrong, forged, or
    ///   signed with an algorithm outside the HMAC family
    /// - `InvalidClaims` when subject id or role cannot be extracted
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<RawClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => {
                    tracing::debug!(error = %e, "Token rejected");
                    TokenError::Malformed
                }
            }
        })?;

        let claims = Claims::try_from(data.claims)?;

        // The library admits `now == exp`; a token is dead from its expiry second on.
        if Utc::now().timestamp() >= claims.expires_at {
            return Err(TokenError::Expired.into());
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::Role;
    use serde_json::json;

    const SECRET: &str = "test-secret-key-at-least-32-characters-long";

    // {"alg":"none","typ":"JWT"} and {"alg":"RS256","typ":"JWT"}, base64url
    const NONE_HEADER: &str = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0";
    const RS256_HEADER: &str = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9";

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, "test")
    }

    fn alice() -> PublicProfile {
        PublicProfile {
            id: 7,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role: Role::Admin,
        }
    }

    fn access(codec: &TokenCodec) -> IssuedToken {
        codec
            .issue(&alice(), TokenKind::Access, Duration::minutes(15), Uuid::new_v4())
            .expect("Failed to issue token")
    }

    fn swap_header(token: &str, header: &str) -> String {
        let mut parts = token.splitn(2, '.');
        parts.next();
        format!("{}.{}", header, parts.next().unwrap())
    }

    #[test]
    fn test_issue_and_decode() {
        let codec = codec();
        let jti = Uuid::new_v4();
        let before = Utc::now();
        let issued = codec
            .issue(&alice(), TokenKind::Access, Duration::minutes(15), jti)
            .unwrap();

        let claims = codec.decode(&issued.token).expect("Failed to decode token");

        assert_eq!(claims.account_id, 7);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.token_id, Some(jti));
        assert_eq!(claims.expires_at, issued.expires_at.timestamp());

        let ttl = issued.expires_at - before;
        assert!(ttl <= Duration::minutes(15) && ttl > Duration::minutes(14));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert_eq!(
            codec().decode("invalid.token.here"),
            Err(AuthError::Token(TokenError::Malformed))
        );
        assert_eq!(codec().decode(""), Err(AuthError::Token(TokenError::Malformed)));
    }

    #[test]
    fn test_tampered_token() {
        let codec = codec();
        let tampered = format!("{}X", access(&codec).token);
        assert_eq!(codec.decode(&tampered), Err(AuthError::Token(TokenError::Malformed)));
    }

    #[test]
    fn test_different_secret_is_rejected() {
        let token = access(&codec()).token;
        let other = TokenCodec::new("a-completely-different-secret-of-length", "test");
        assert_eq!(other.decode(&token), Err(AuthError::Token(TokenError::Malformed)));
    }

    #[test]
    fn test_wrong_issuer() {
        let token = access(&codec()).token;
        let other = TokenCodec::new(SECRET, "wrong-issuer");
        assert!(other.decode(&token).is_err());
    }

    #[test]
    fn test_unsigned_token_is_rejected() {
        let token = access(&codec()).token;
        let payload = token.split('.').nth(1).unwrap();
        let unsigned = format!("{}.{}.", NONE_HEADER, payload);
        assert_eq!(codec().decode(&unsigned), Err(AuthError::Token(TokenError::Malformed)));
    }

    #[test]
    fn test_non_hmac_algorithm_is_rejected() {
        let token = access(&codec()).token;
        let confused = swap_header(&token, RS256_HEADER);
        assert_eq!(codec().decode(&confused), Err(AuthError::Token(TokenError::Malformed)));
    }

    #[test]
    fn test_other_hmac_variants_are_accepted() {
        let now = Utc::now().timestamp();
        let token = encode(
            &Header::new(Algorithm::HS512),
            &json!({"uid": 3, "role": "user", "exp": now + 60, "iss": "test"}),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(codec().decode(&token).unwrap().account_id, 3);
    }

    #[test]
    fn test_expired_token() {
        let codec = codec();
        let issued = codec
            .issue_at(
                Utc::now() - Duration::minutes(16),
                &alice(),
                TokenKind::Access,
                Duration::minutes(15),
                Uuid::new_v4(),
            )
            .unwrap();

        assert_eq!(codec.decode(&issued.token), Err(AuthError::Token(TokenError::Expired)));
    }

    #[test]
    fn test_expiry_second_is_exclusive() {
        let codec = codec();
        let issued = codec
            .issue(&alice(), TokenKind::Access, Duration::zero(), Uuid::new_v4())
            .unwrap();

        assert_eq!(codec.decode(&issued.token), Err(AuthError::Token(TokenError::Expired)));
    }

    #[test]
    fn test_alternate_claim_spellings() {
        let now = Utc::now().timestamp();
        let token = encode(
            &Header::default(),
            &json!({"sub": "12", "rol": "user", "exp": now + 60, "iss": "test"}),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let claims = codec().decode(&token).unwrap();
        assert_eq!(claims.account_id, 12);
        assert_eq!(claims.role, Role::User);
    }

    #[test]
    fn test_missing_role_is_invalid_claims() {
        let now = Utc::now().timestamp();
        let token = encode(
            &Header::default(),
            &json!({"uid": 12, "exp": now + 60, "iss": "test"}),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(codec().decode(&token), Err(AuthError::InvalidClaims));
    }
}
