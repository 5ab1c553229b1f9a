use std::net::TcpListener;
use std::sync::Arc;

use account_service::accounts::{AccountService, PgAccountRepository};
use account_service::auth::{AuthService, PgSessionStore};
use account_service::configuration::get_configuration;
use account_service::startup::run;
use account_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let configuration = match get_configuration() {
        Ok(config) => config,
        Err(e) => {
            // The subscriber is not installed yet; this must still be seen.
            eprintln!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    init_telemetry(configuration.application.log_format);
    tracing::info!("Configuration loaded successfully");

    let pool = configuration.database.pool();

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to run database migrations");
            std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
        })?;
    tracing::info!("Database migrations applied");

    let accounts = Arc::new(PgAccountRepository::new(pool.clone()));
    let sessions = Arc::new(PgSessionStore::new(pool));

    let account_service = AccountService::new(accounts.clone(), sessions.clone());
    let auth_service = AuthService::new(accounts, sessions, &configuration.jwt);

    if let Some(admin) = &configuration.admin {
        account_service
            .ensure_admin(admin)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to seed admin account");
                std::io::Error::new(std::io::ErrorKind::Other, "Admin seeding error")
            })?;
    }

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!(address = %address, "Server listening");

    run(listener, auth_service, account_service, configuration.jwt)?.await
}
