//! In-memory ledger for engine tests.

use pgm_core::error::{MigrateError, Result};
use pgm_core::migration::{LedgerEntry, MigrationOutcome, MigrationScripts};

use super::ledger::Ledger;

#[derive(Debug, Default)]
pub struct MemoryLedger {
    pub entries: Vec<LedgerEntry>,
    /// Every script run against the "database", in order.
    pub executed: Vec<String>,
    /// A script that fails when executed.
    pub failing_script: Option<String>,
}

impl MemoryLedger {
    /// A ledger whose entries were applied with `up <name>` / `down <name>`.
    pub fn with_applied(names: &[&str]) -> Self {
        Self {
            entries: names
                .iter()
                .map(|name| LedgerEntry {
                    name: name.to_string(),
                    up_sql: format!("up {}", name),
                    down_sql: format!("down {}", name),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    fn execute(&mut self, script: &str) -> Result<()> {
        if self.failing_script.as_deref() == Some(script) {
            return Err(MigrateError::Execution(format!("script failed: {}", script)));
        }
        self.executed.push(script.to_string());
        Ok(())
    }
}

impl Ledger for MemoryLedger {
    async fn read(&mut self) -> Result<Vec<LedgerEntry>> {
        Ok(self.entries.clone())
    }

    async fn apply(&mut self, name: &str, scripts: &MigrationScripts) -> Result<()> {
        self.execute(&scripts.up)?;
        self.entries.push(LedgerEntry {
            name: name.to_string(),
            up_sql: scripts.up.clone(),
            down_sql: scripts.down.clone(),
        });
        Ok(())
    }

    async fn revert_one(&mut self, name: &str) -> Result<MigrationOutcome> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| MigrateError::NotFound(format!("migration '{}'", name)))?;

        let down = self.entries[idx].down_sql.clone();
        self.execute(&down)?;
        self.entries.remove(idx);
        Ok(MigrationOutcome::reverted(name))
    }
}
