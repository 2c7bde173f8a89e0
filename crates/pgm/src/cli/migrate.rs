use anyhow::Result;
use clap::Parser;
use tracing::info;

use pgm_core::config::MigratorConfig;

/// Apply and revert migrations until the database matches the directory.
#[derive(Parser, Debug)]
pub struct MigrateCommand {}

impl MigrateCommand {
    pub async fn execute(self, config: &MigratorConfig) -> Result<()> {
        info!(
            dir = %config.migrations_dir.display(),
            priority = %config.priority,
            ledger = %config.ledger.identity(),
            "Running migrations"
        );

        let outcomes = pgm_runtime::migrate(config).await?;

        if outcomes.is_empty() {
            info!("Database is up to date");
        }
        for outcome in &outcomes {
            info!(migration = %outcome.name, status = %outcome.status, "Migration finished");
        }
        Ok(())
    }
}
