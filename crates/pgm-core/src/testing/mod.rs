//! Testing utilities for code that runs migrations.
//!
//! Tests run against a real PostgreSQL server. Nothing is configured
//! implicitly: the server is taken from `TEST_DATABASE_URL`, and every test
//! gets a database of its own so runs never observe each other's ledgers.

mod db;

pub use db::{IsolatedTestDb, TestDatabase};
