pub mod db;
pub mod migrations;
pub mod migrator;

pub use migrations::{Ledger, LedgerTransaction, MigrationRunner};
pub use migrator::{create, down, migrate};
