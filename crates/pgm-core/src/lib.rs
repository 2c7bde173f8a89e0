pub mod config;
pub mod error;
pub mod migration;

#[cfg(feature = "testing")]
pub mod testing;

pub use config::{CreateDatabasePolicy, DatabaseConfig, LedgerConfig, MigratorConfig, Priority};
pub use error::{MigrateError, Result};
pub use migration::{
    LedgerEntry, MigrationDefinition, MigrationOutcome, MigrationScripts, MigrationStatus,
};
