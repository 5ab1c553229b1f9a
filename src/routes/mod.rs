mod admin;
mod auth;
mod health_check;

pub use admin::{create_user, delete_user, get_user, list_users, update_user};
pub use auth::{login, logout, me, refresh, register, LoginRequest, TokenResponse};
pub use health_check::health_check;
