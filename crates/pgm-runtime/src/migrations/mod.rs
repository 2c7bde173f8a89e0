mod engine;
mod executor;
mod ledger;
#[cfg(test)]
mod memory;
mod runner;
mod source;

pub use engine::{apply_with_db_priority, apply_with_fs_priority, reconcile};
pub use executor::{Isolation, LedgerTransaction};
pub use ledger::Ledger;
pub use runner::MigrationRunner;
pub use source::{create_migration, load_migrations_from_dir};
