use anyhow::Result;
use clap::Parser;
use tracing::info;

use pgm_core::config::MigratorConfig;

/// Revert the last applied migration.
#[derive(Parser, Debug)]
pub struct DownCommand {}

impl DownCommand {
    pub async fn execute(self, config: &MigratorConfig) -> Result<()> {
        let outcome = pgm_runtime::down(config).await?;
        info!(migration = %outcome.name, status = %outcome.status, "Migration finished");
        Ok(())
    }
}
