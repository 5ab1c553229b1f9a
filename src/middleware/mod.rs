/// Middleware module
///
/// Request filters for the protected scopes: the stateless JWT gate and
/// the role guard that runs after it.

mod jwt_middleware;
mod role_guard;

pub use jwt_middleware::JwtMiddleware;
pub use role_guard::RoleGuard;
