use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::Connection;
use tracing::{debug, info, warn};

use pgm_core::config::{CreateDatabasePolicy, DatabaseConfig};
use pgm_core::error::{MigrateError, Result};

/// Connections needed by a run: the bootstrap transaction and the locked
/// migration transaction never overlap, one spare for headroom.
const POOL_SIZE: u32 = 2;

/// Connect to the target database, creating it first if the policy asks to.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    match config.create_database {
        CreateDatabasePolicy::Skip => {}
        CreateDatabasePolicy::BestEffort => {
            if let Err(e) = ensure_database(config).await {
                warn!(error = %e, "Could not ensure target database exists, connecting anyway");
            }
        }
        CreateDatabasePolicy::Required => ensure_database(config).await?,
    }

    let pool = PgPoolOptions::new()
        .max_connections(POOL_SIZE)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| MigrateError::Connectivity(format!("Failed to connect to database: {}", e)))?;

    health_check(&pool).await?;
    Ok(pool)
}

/// Check database connectivity.
pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| MigrateError::Connectivity(format!("Database ping failed: {}", e)))?;
    Ok(())
}

/// Create the database named in the connection URL if the server lacks it.
async fn ensure_database(config: &DatabaseConfig) -> Result<()> {
    let options = PgConnectOptions::from_str(&config.url).map_err(|e| {
        MigrateError::Connectivity(format!("Failed to parse connection string: {}", e))
    })?;

    let Some(database) = options.get_database().map(str::to_string) else {
        return Ok(());
    };

    let server_url = remove_database_from_url(&config.url);
    let mut conn = tokio::time::timeout(
        Duration::from_secs(config.connect_timeout_secs),
        PgConnection::connect(&server_url),
    )
    .await
    .map_err(|_| {
        MigrateError::Connectivity(format!("Server connection for \"{}\" timed out", database))
    })?
    .map_err(|e| {
        MigrateError::Connectivity(format!("Server connection for \"{}\" failed: {}", database, e))
    })?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&database)
            .fetch_one(&mut conn)
            .await
            .map_err(|e| {
                MigrateError::Connectivity(format!(
                    "Failed to check database \"{}\" existence: {}",
                    database, e
                ))
            })?;

    if exists {
        debug!(%database, "Target database exists");
    } else {
        sqlx::query(&format!("CREATE DATABASE \"{}\"", database.replace('"', "\"\"")))
            .execute(&mut conn)
            .await
            .map_err(|e| {
                MigrateError::Connectivity(format!(
                    "Database \"{}\" creation error: {}",
                    database, e
                ))
            })?;
        info!(%database, "Created target database");
    }

    if let Err(e) = conn.close().await {
        debug!(error = %e, "Server connection did not close cleanly");
    }
    Ok(())
}

/// Strip the database path from a connection URL, keeping the query string.
pub fn remove_database_from_url(url: &str) -> String {
    let (base, query) = match url.find('?') {
        Some(idx) => url.split_at(idx),
        None => (url, ""),
    };
    let authority_start = base.find("://").map(|i| i + 3).unwrap_or(0);

    match base[authority_start..].find('/') {
        Some(slash) => format!("{}{}", &base[..authority_start + slash], query),
        None => url.to_string(),
    }
}
