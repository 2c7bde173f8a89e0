//! Entry points: `create`, `migrate` and `down`.
//!
//! Each takes the full configuration explicitly, validates it before any
//! I/O and owns its connection pool for the duration of the call.

use std::future::Future;
use std::time::Duration;

use tracing::info;

use pgm_core::config::MigratorConfig;
use pgm_core::error::{MigrateError, Result};
use pgm_core::migration::{MigrationDefinition, MigrationOutcome};

use crate::db;
use crate::migrations::{create_migration, load_migrations_from_dir, MigrationRunner};

/// Scaffold an empty up/down pair named after `name`.
pub fn create(config: &MigratorConfig, name: &str) -> Result<MigrationDefinition> {
    config.validate_source()?;
    let migration = create_migration(&config.migrations_dir, name)?;
    info!(up = %migration.up.display(), down = %migration.down.display(), "Migration files created");
    Ok(migration)
}

/// Converge the database to the migrations declared in the directory.
pub async fn migrate(config: &MigratorConfig) -> Result<Vec<MigrationOutcome>> {
    config.validate()?;
    let declared = load_migrations_from_dir(&config.migrations_dir)?;

    with_deadline(config, async {
        let pool = db::connect(&config.database).await?;
        let runner = MigrationRunner::new(pool.clone(), config.ledger.clone());
        let result = runner.migrate(&declared, config.priority).await;
        pool.close().await;
        result
    })
    .await
}

/// Revert the last applied migration.
pub async fn down(config: &MigratorConfig) -> Result<MigrationOutcome> {
    config.validate()?;

    with_deadline(config, async {
        let pool = db::connect(&config.database).await?;
        let runner = MigrationRunner::new(pool.clone(), config.ledger.clone());
        let result = runner.down().await;
        pool.close().await;
        result
    })
    .await
}

/// Bound `fut` by the configured deadline.
///
/// On expiry the future is dropped mid-flight, which drops its open
/// transaction and rolls it back.
async fn with_deadline<T>(
    config: &MigratorConfig,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match config.timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .map_err(|_| MigrateError::Execution(format!("deadline of {}s exceeded", secs)))?,
        None => fut.await,
    }
}
