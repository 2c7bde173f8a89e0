//! pgm - declarative PostgreSQL migrations.
//!
//! Reconciles a directory of `*.up.sql` / `*.down.sql` pairs with the ledger
//! of applied migrations stored in the target database.

pub use pgm_core::config::{CreateDatabasePolicy, LedgerConfig, MigratorConfig, Priority};
pub use pgm_core::error::{MigrateError, Result};
pub use pgm_core::migration::{MigrationDefinition, MigrationOutcome, MigrationStatus};
pub use pgm_runtime::{create, down, migrate, MigrationRunner};
