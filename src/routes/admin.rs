/// Admin Routes
///
/// Account CRUD. Mounted behind the JWT gate and a role guard that only
/// admits `admin`.

use actix_web::{web, HttpResponse};

use crate::accounts::{AccountInput, AccountService};
use crate::auth::AuthenticatedAccount;
use crate::error::AppError;

/// GET /api/v1/admin/users
pub async fn list_users(accounts: web::Data<AccountService>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(accounts.list().await?))
}

/// GET /api/v1/admin/users/{id}
pub async fn get_user(
    path: web::Path<i64>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(accounts.get(path.into_inner()).await?))
}

/// POST /api/v1/admin/users
///
/// # Errors
/// - 400: invalid field or enumeration value
/// - 409: username or email already taken
pub async fn create_user(
    form: web::Json<AccountInput>,
    accounts: web::Data<AccountService>,
    admin: web::ReqData<AuthenticatedAccount>,
) -> Result<HttpResponse, AppError> {
    let account = accounts.create(form.into_inner()).await?;
    tracing::info!(admin_id = admin.account_id, account_id = account.id, "Admin created account");
    Ok(HttpResponse::Created().json(account))
}

/// PUT /api/v1/admin/users/{id}
///
/// Full replacement of username, email and profile. The password changes
/// only when a non-blank one is sent.
pub async fn update_user(
    path: web::Path<i64>,
    form: web::Json<AccountInput>,
    accounts: web::Data<AccountService>,
    admin: web::ReqData<AuthenticatedAccount>,
) -> Result<HttpResponse, AppError> {
    let account = accounts.update(path.into_inner(), form.into_inner()).await?;
    tracing::info!(admin_id = admin.account_id, account_id = account.id, "Admin updated account");
    Ok(HttpResponse::Ok().json(account))
}

/// DELETE /api/v1/admin/users/{id}
///
/// Soft delete; the account's refresh tokens are revoked with it.
pub async fn delete_user(
    path: web::Path<i64>,
    accounts: web::Data<AccountService>,
    admin: web::ReqData<AuthenticatedAccount>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    accounts.delete(id).await?;
    tracing::info!(admin_id = admin.account_id, account_id = id, "Admin deleted account");
    Ok(HttpResponse::NoContent().finish())
}
