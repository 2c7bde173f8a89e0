//! The ledger seam between the reconciliation engine and storage.

use std::future::Future;

use pgm_core::error::Result;
use pgm_core::migration::{LedgerEntry, MigrationOutcome, MigrationScripts};

/// Ordered record of applied migrations, mutated inside one unit of work.
///
/// Implementations run every call inside the transaction they own; the
/// engine never commits or rolls back itself. Futures are `Send` so a run
/// can be spawned onto a multi-threaded runtime.
pub trait Ledger: Send {
    /// Entries in apply order.
    fn read(&mut self) -> impl Future<Output = Result<Vec<LedgerEntry>>> + Send;

    /// Run `scripts.up` and record the migration with both scripts.
    fn apply(
        &mut self,
        name: &str,
        scripts: &MigrationScripts,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Run the stored down script of `name` and remove its entry.
    fn revert_one(&mut self, name: &str) -> impl Future<Output = Result<MigrationOutcome>> + Send;

    /// The most recently applied entry.
    fn last(&mut self) -> impl Future<Output = Result<Option<LedgerEntry>>> + Send {
        async move { Ok(self.read().await?.pop()) }
    }

    /// Revert `names`, given in apply order, starting from the last one.
    fn revert_many(
        &mut self,
        names: &[String],
    ) -> impl Future<Output = Result<Vec<MigrationOutcome>>> + Send {
        async move {
            let mut outcomes = Vec::with_capacity(names.len());
            for name in names.iter().rev() {
                outcomes.push(self.revert_one(name).await?);
            }
            Ok(outcomes)
        }
    }

    /// Revert every entry, last applied first.
    fn reset_all(&mut self) -> impl Future<Output = Result<Vec<MigrationOutcome>>> + Send {
        async move {
            let names: Vec<String> = self.read().await?.into_iter().map(|e| e.name).collect();
            self.revert_many(&names).await
        }
    }
}
