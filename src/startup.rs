use actix_web::dev::Server;
use actix_web::error::{JsonPayloadError, PathError};
use actix_web::{web, App, HttpRequest, HttpServer};
use std::net::TcpListener;

use crate::accounts::{AccountService, Role};
use crate::auth::AuthService;
use crate::configuration::JwtSettings;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::{JwtMiddleware, RoleGuard};
use crate::routes::{
    create_user, delete_user, get_user, health_check, list_users, login, logout, me, refresh,
    register, update_user,
};

/// Malformed or mistyped JSON bodies answer with the usual error envelope.
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::from(ValidationError::InvalidFormat(format!("request body ({})", err))).into()
}

fn path_error(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::from(ValidationError::InvalidFormat(format!("path ({})", err))).into()
}

/// Build the HTTP server around already-wired services.
///
/// The services sit over trait-object stores, so the same wiring serves
/// Postgres in production and the in-memory stores in integration tests.
pub fn run(
    listener: TcpListener,
    auth_service: AuthService,
    account_service: AccountService,
    jwt_config: JwtSettings,
) -> Result<Server, std::io::Error> {
    let codec = auth_service.codec().clone();

    let auth_service = web::Data::new(auth_service);
    let account_service = web::Data::new(account_service);
    let jwt_config_data = web::Data::new(jwt_config);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)
            // Shared state
            .app_data(auth_service.clone())
            .app_data(account_service.clone())
            .app_data(jwt_config_data.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error))
            .app_data(web::PathConfig::default().error_handler(path_error))
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/api/v1")
                    // Public routes
                    .route("/auth/register", web::post().to(register))
                    .route("/auth/login", web::post().to(login))
                    .route("/auth/refresh", web::post().to(refresh))
                    .route("/auth/logout", web::post().to(logout))
                    // Protected routes (require a valid access token)
                    .service(
                        web::resource("/auth/me")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route(web::get().to(me)),
                    )
                    // Admin routes; the outermost wrap runs first, so the
                    // JWT gate precedes the role guard.
                    .service(
                        web::scope("/admin")
                            .wrap(RoleGuard::new(vec![Role::Admin]))
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route("/users", web::get().to(list_users))
                            .route("/users", web::post().to(create_user))
                            .route("/users/{id}", web::get().to(get_user))
                            .route("/users/{id}", web::put().to(update_user))
                            .route("/users/{id}", web::delete().to(delete_user)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
