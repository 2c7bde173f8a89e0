//! Migration runner with cross-process locking.
//!
//! Every run is one serializable transaction holding an exclusive lock on
//! the ledger table, so concurrent migrators targeting the same ledger queue
//! up in the database and each recomputes its diff from committed state.

use sqlx::PgPool;
use tracing::{debug, info};

use pgm_core::config::{LedgerConfig, Priority};
use pgm_core::error::{MigrateError, Result};
use pgm_core::migration::{MigrationDefinition, MigrationOutcome};

use super::engine;
use super::executor::{Isolation, LedgerTransaction};
use super::ledger::Ledger;

/// Runs `migrate` and `down` against one ledger.
pub struct MigrationRunner {
    pool: PgPool,
    ledger: LedgerConfig,
}

impl MigrationRunner {
    pub fn new(pool: PgPool, ledger: LedgerConfig) -> Self {
        Self { pool, ledger }
    }

    /// Converge the database to `declared`. All or nothing.
    pub async fn migrate(
        &self,
        declared: &[MigrationDefinition],
        priority: Priority,
    ) -> Result<Vec<MigrationOutcome>> {
        let mut tx = self.begin_locked().await?;

        let result: Result<Vec<MigrationOutcome>> = async {
            let applied = tx.read().await?;
            engine::reconcile(&mut tx, priority, declared, &applied).await
        }
        .await;

        match result {
            Ok(outcomes) => {
                tx.commit().await?;
                info!("Migration run committed: {} changes", outcomes.len());
                Ok(outcomes)
            }
            Err(e) => Err(tx.abort(e).await),
        }
    }

    /// Revert the most recently applied migration.
    pub async fn down(&self) -> Result<MigrationOutcome> {
        let mut tx = self.begin_locked().await?;

        let result: Result<MigrationOutcome> = async {
            let last = tx.last().await?.ok_or_else(|| {
                MigrateError::NotFound(format!(
                    "no applied migrations in {}",
                    self.ledger.identity()
                ))
            })?;
            tx.revert_one(&last.name).await
        }
        .await;

        match result {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => Err(tx.abort(e).await),
        }
    }

    /// Create the ledger if needed, then open the run's locked transaction.
    async fn begin_locked(&self) -> Result<LedgerTransaction> {
        let mut bootstrap =
            LedgerTransaction::begin(&self.pool, &self.ledger, Isolation::ReadCommitted).await?;
        if let Err(e) = bootstrap.ensure_ledger().await {
            return Err(bootstrap.abort(e).await);
        }
        bootstrap.commit().await?;
        debug!(ledger = %self.ledger.identity(), "Ledger table ready");

        let mut tx =
            LedgerTransaction::begin(&self.pool, &self.ledger, Isolation::Serializable).await?;
        if let Err(e) = tx.lock().await {
            return Err(tx.abort(e).await);
        }
        Ok(tx)
    }
}
