//! Fleet back office - Main Application Entry Point
//!
//! JSON API over the shared MySQL database of a logistics company: delivery
//! invoicing analytics, Excel import of delivery data, vehicle documents and
//! maintenance, and monitoring of the MySQL backup jobs.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: MySQL with sqlx (async queries)
//! - **Excel**: calamine to read imports, rust_xlsxwriter to write exports
//! - **Format**: JSON requests/responses, multipart for uploads
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations (unless `RUN_MIGRATIONS=false`)
//! 4. Build HTTP router with routes and middleware
//! 5. Start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod models;
mod routes;
mod services;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG, defaults to "info"
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    tracing::info!(
        port = config.server_port,
        upload_dir = %config.upload_dir.display(),
        "Configuration loaded"
    );

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!(max_connections = config.db_max_connections, "Database pool created");

    if config.run_migrations {
        db::run_migrations(&pool).await?;
        tracing::info!("Database migrations complete");
    } else {
        tracing::info!("Skipping migrations (RUN_MIGRATIONS=false)");
    }

    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let addr = format!("0.0.0.0:{}", config.server_port);
    let app = routes::router(routes::AppState::new(pool, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
