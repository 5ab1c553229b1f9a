/// Authentication Routes
///
/// Registration, login, refresh-token rotation, logout and the current
/// account. The refresh token only ever travels in an HttpOnly cookie; the
/// access token is returned in the JSON body.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::accounts::{AccountService, PublicProfile, RegisterInput};
use crate::auth::{AuthService, AuthenticatedAccount, LoginResult};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ErrorContext, ValidationError};

/// Login request; `identifier` is a username or an email
#[derive(Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

/// Token response shared by login and refresh
#[derive(Serialize)]
pub struct TokenResponse {
    pub token_type: &'static str,
    pub access_token: String,
    pub expires_in: i64,
    pub user: PublicProfile,
}

fn refresh_cookie<'c>(settings: &JwtSettings, value: String, max_age_seconds: i64) -> Cookie<'c> {
    Cookie::build(settings.refresh_cookie_name.clone(), value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.cookie_secure)
        .max_age(CookieDuration::seconds(max_age_seconds))
        .finish()
}

fn cleared_cookie<'c>(settings: &JwtSettings) -> Cookie<'c> {
    let mut cookie = refresh_cookie(settings, String::new(), 0);
    cookie.make_removal();
    cookie
}

fn token_response(result: LoginResult, auth: &AuthService, settings: &JwtSettings) -> HttpResponse {
    let cookie = refresh_cookie(
        settings,
        result.refresh_token,
        auth.refresh_ttl().num_seconds(),
    );

    HttpResponse::Ok().cookie(cookie).json(TokenResponse {
        token_type: "Bearer",
        access_token: result.access_token,
        expires_in: auth.access_ttl().num_seconds(),
        user: result.account.public_profile(),
    })
}

/// POST /api/v1/auth/register
///
/// Creates a `user` account whose username is the email's local part.
/// Does not log in.
///
/// # Errors
/// - 400: invalid email, weak password, or confirmation mismatch
/// - 409: username or email already taken
pub async fn register(
    form: web::Json<RegisterInput>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let account = accounts.register(form.into_inner()).await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "registered successfully, please login",
        "user": account,
    })))
}

/// POST /api/v1/auth/login
///
/// # Errors
/// - 400: blank identifier or password
/// - 401: unknown identifier or wrong password (indistinguishable)
/// - 500: the session could not be recorded
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
    jwt_settings: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("login");

    if form.identifier.trim().is_empty() {
        return Err(ValidationError::EmptyField("identifier".to_string()).into());
    }
    if form.password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()).into());
    }

    let result = auth
        .login(&form.identifier, &form.password)
        .await
        .map_err(|e| {
            context.log_error(&e);
            e
        })?;

    tracing::info!(
        request_id = %context.request_id,
        account_id = result.account.id,
        "User logged in successfully"
    );

    Ok(token_response(result, &auth, &jwt_settings))
}

/// POST /api/v1/auth/refresh
///
/// Rotates the refresh cookie: the presented token is revoked and a new
/// pair is issued.
///
/// # Errors
/// - 401: cookie missing, token invalid/expired, or session revoked
pub async fn refresh(
    req: HttpRequest,
    auth: web::Data<AuthService>,
    jwt_settings: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let token = req
        .cookie(&jwt_settings.refresh_cookie_name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingToken)?;

    let result = auth.refresh(&token).await?;
    Ok(token_response(result, &auth, &jwt_settings))
}

/// POST /api/v1/auth/logout
///
/// Always answers 204 and clears the cookie. Revocation failures are
/// logged and otherwise ignored.
pub async fn logout(
    req: HttpRequest,
    auth: web::Data<AuthService>,
    jwt_settings: web::Data<JwtSettings>,
) -> HttpResponse {
    let context = ErrorContext::new("logout");

    if let Some(cookie) = req.cookie(&jwt_settings.refresh_cookie_name) {
        if let Err(e) = auth.logout_with_token(cookie.value()).await {
            tracing::error!(
                request_id = %context.request_id,
                error = %e,
                "Failed to revoke refresh token during logout"
            );
        }
    }

    HttpResponse::NoContent()
        .cookie(cleared_cookie(&jwt_settings))
        .finish()
}

/// GET /api/v1/auth/me
///
/// **Requires a valid access token.** The identity is injected by the JWT
/// middleware.
pub async fn me(
    account: web::ReqData<AuthenticatedAccount>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("current_account").with_account_id(account.account_id);

    let stored = accounts.get(account.account_id).await.map_err(|e| {
        context.log_error(&e);
        e
    })?;
    Ok(HttpResponse::Ok().json(stored))
}
