/// Authentication module
///
/// Password hashing, the token codec, the refresh-token ledger, the
/// login/logout service and the stateless authorization gate.

pub mod claims;
pub mod gate;
pub mod jwt;
pub mod password;
pub mod service;
pub mod session_store;

pub use claims::{Claims, TokenKind};
pub use gate::{authenticate, bearer_token, require_role, AuthenticatedAccount};
pub use jwt::{IssuedToken, TokenCodec};
pub use password::{hash_password, verify_password};
pub use service::{AuthService, LoginResult};
pub use session_store::{InMemorySessionStore, PgSessionStore, RefreshTokenRecord, SessionStore};
