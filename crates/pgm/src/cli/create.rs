use anyhow::Result;
use clap::Parser;

use pgm_core::config::MigratorConfig;

/// Create an empty up/down migration pair.
#[derive(Parser, Debug)]
pub struct CreateCommand {
    /// Migration name: letters, digits and `_` only.
    pub name: String,
}

impl CreateCommand {
    pub fn execute(self, config: &MigratorConfig) -> Result<()> {
        pgm_runtime::create(config, &self.name)?;
        Ok(())
    }
}
