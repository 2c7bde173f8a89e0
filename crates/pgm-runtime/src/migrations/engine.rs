//! Reconciliation of declared migrations against the ledger.
//!
//! Both inputs are ordered: `declared` by name, `applied` by ledger position.
//! After a successful run the ledger is a position-for-position prefix of
//! the declared sequence (all of it, for FS priority).

use pgm_core::config::Priority;
use pgm_core::error::{MigrateError, Result};
use pgm_core::migration::{LedgerEntry, MigrationDefinition, MigrationOutcome};
use tracing::{debug, info};

use super::ledger::Ledger;

/// Converge the ledger towards `declared` using the given strategy.
pub async fn reconcile<L: Ledger>(
    ledger: &mut L,
    priority: Priority,
    declared: &[MigrationDefinition],
    applied: &[LedgerEntry],
) -> Result<Vec<MigrationOutcome>> {
    debug!(
        %priority,
        declared = declared.len(),
        applied = applied.len(),
        "Reconciling migrations"
    );

    match priority {
        Priority::Db => apply_with_db_priority(ledger, declared, applied).await,
        Priority::Fs => apply_with_fs_priority(ledger, declared, applied).await,
    }
}

/// Apply the declared suffix missing from the ledger.
///
/// A name mismatch at any ledger position is fatal. Ledger entries past the
/// end of `declared` are left alone.
pub async fn apply_with_db_priority<L: Ledger>(
    ledger: &mut L,
    declared: &[MigrationDefinition],
    applied: &[LedgerEntry],
) -> Result<Vec<MigrationOutcome>> {
    let mut outcomes = Vec::new();

    for (position, migration) in declared.iter().enumerate() {
        match applied.get(position) {
            Some(entry) if entry.name == migration.name => continue,
            Some(entry) => {
                return Err(MigrateError::Divergence {
                    position,
                    ledger: entry.name.clone(),
                    declared: migration.name.clone(),
                });
            }
            None => {
                let scripts = migration.load_scripts()?;
                ledger.apply(&migration.name, &scripts).await?;
                outcomes.push(MigrationOutcome::applied(&migration.name));
            }
        }
    }

    if applied.len() > declared.len() {
        // Left untouched on purpose under DB priority; surfaced for operators.
        info!(
            extra = applied.len() - declared.len(),
            "Ledger holds migrations that are no longer declared"
        );
    }

    Ok(outcomes)
}

/// Revert the ledger back to its longest common prefix with `declared`,
/// then apply whatever is still missing.
pub async fn apply_with_fs_priority<L: Ledger>(
    ledger: &mut L,
    declared: &[MigrationDefinition],
    applied: &[LedgerEntry],
) -> Result<Vec<MigrationOutcome>> {
    if declared.is_empty() {
        return ledger.reset_all().await;
    }

    let mut outcomes = Vec::new();

    let divergence = applied
        .iter()
        .enumerate()
        .position(|(i, entry)| declared.get(i).map_or(true, |m| m.name != entry.name));

    if let Some(position) = divergence {
        let names: Vec<String> = applied[position..].iter().map(|e| e.name.clone()).collect();
        debug!(position, count = names.len(), "Reverting divergent migrations");
        outcomes.extend(ledger.revert_many(&names).await?);
    }

    let refreshed = ledger.read().await?;
    outcomes.extend(apply_with_db_priority(ledger, declared, &refreshed).await?);

    Ok(outcomes)
}
