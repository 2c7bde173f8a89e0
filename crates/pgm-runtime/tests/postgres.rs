//! Integration tests against a real PostgreSQL server.
//!
//! Set `TEST_DATABASE_URL` to a server the tests may create databases on;
//! without it every test returns early.

use std::fs;
use std::path::Path;

use pgm_core::config::{CreateDatabasePolicy, LedgerConfig, MigratorConfig, Priority};
use pgm_core::error::MigrateError;
use pgm_core::migration::{MigrationOutcome, MigrationStatus};
use pgm_core::testing::{IsolatedTestDb, TestDatabase};
use pgm_runtime::migrations::create_migration;
use tempfile::TempDir;

async fn isolated(test_name: &str) -> Option<IsolatedTestDb> {
    let server = TestDatabase::from_env().await.unwrap()?;
    Some(server.isolated(test_name).await.unwrap())
}

fn config(db: &IsolatedTestDb, dir: &Path, priority: Priority) -> MigratorConfig {
    let mut config = MigratorConfig::new(dir, db.url());
    config.database.create_database = CreateDatabasePolicy::Skip;
    config.ledger = LedgerConfig::new(Some("pgm_ledger"), "migrations");
    config.priority = priority;
    config
}

/// Scaffold a migration creating `test.<table>`; returns its base name.
fn table_migration(dir: &Path, name: &str, table: &str) -> String {
    let migration = create_migration(dir, name).unwrap();
    fs::write(
        &migration.up,
        format!(
            "CREATE SCHEMA IF NOT EXISTS test;\nCREATE TABLE test.{table} (id SERIAL PRIMARY KEY, active BOOLEAN);"
        ),
    )
    .unwrap();
    fs::write(&migration.down, format!("DROP TABLE test.{table};")).unwrap();
    migration.name
}

fn remove_migration(dir: &Path, name: &str) {
    fs::remove_file(dir.join(format!("{name}.up.sql"))).unwrap();
    fs::remove_file(dir.join(format!("{name}.down.sql"))).unwrap();
}

fn summary(outcomes: &[MigrationOutcome]) -> Vec<(String, MigrationStatus)> {
    outcomes
        .iter()
        .map(|o| (o.name.clone(), o.status))
        .collect()
}

async fn ledger_names(db: &IsolatedTestDb) -> Vec<String> {
    sqlx::query_scalar("SELECT migration_name FROM pgm_ledger.migrations ORDER BY id")
        .fetch_all(db.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_db_priority_applies_then_is_idempotent() {
    let Some(db) = isolated("db_priority_idempotent").await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config(&db, dir.path(), Priority::Db);

    let first = table_migration(dir.path(), "first_migration", "table1");
    let second = table_migration(dir.path(), "second_migration", "table2");

    let outcomes = pgm_runtime::migrate(&config).await.unwrap();
    assert_eq!(
        summary(&outcomes),
        [
            (first.clone(), MigrationStatus::Applied),
            (second.clone(), MigrationStatus::Applied)
        ]
    );

    let again = pgm_runtime::migrate(&config).await.unwrap();
    assert!(again.is_empty());

    assert_eq!(db.list_tables("pgm_ledger").await.unwrap(), ["migrations"]);
    assert_eq!(db.list_tables("test").await.unwrap(), ["table1", "table2"]);
    assert_eq!(ledger_names(&db).await, [first, second]);

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_fs_priority_reverts_removed_and_applies_added() {
    let Some(db) = isolated("fs_priority_converges").await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config(&db, dir.path(), Priority::Fs);

    let first = table_migration(dir.path(), "first_migration", "table1");
    let second = table_migration(dir.path(), "second_migration", "table2");
    let third = table_migration(dir.path(), "third_migration", "table3");

    let outcomes = pgm_runtime::migrate(&config).await.unwrap();
    assert_eq!(outcomes.len(), 3);

    remove_migration(dir.path(), &second);
    remove_migration(dir.path(), &third);
    let fourth = table_migration(dir.path(), "fourth_migration", "table4");

    let outcomes = pgm_runtime::migrate(&config).await.unwrap();
    assert_eq!(
        summary(&outcomes),
        [
            (third, MigrationStatus::Reverted),
            (second, MigrationStatus::Reverted),
            (fourth.clone(), MigrationStatus::Applied),
        ]
    );
    assert_eq!(ledger_names(&db).await, [first, fourth]);
    assert_eq!(db.list_tables("test").await.unwrap(), ["table1", "table4"]);

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_fs_priority_empty_directory_resets() {
    let Some(db) = isolated("fs_priority_reset").await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config(&db, dir.path(), Priority::Fs);

    let first = table_migration(dir.path(), "first_migration", "table1");
    let second = table_migration(dir.path(), "second_migration", "table2");
    pgm_runtime::migrate(&config).await.unwrap();

    remove_migration(dir.path(), &first);
    remove_migration(dir.path(), &second);

    let outcomes = pgm_runtime::migrate(&config).await.unwrap();
    assert_eq!(
        summary(&outcomes),
        [
            (second, MigrationStatus::Reverted),
            (first, MigrationStatus::Reverted)
        ]
    );
    assert!(ledger_names(&db).await.is_empty());
    assert!(db.list_tables("test").await.unwrap().is_empty());

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_db_priority_divergence_commits_nothing() {
    let Some(db) = isolated("db_priority_divergence").await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config(&db, dir.path(), Priority::Db);

    let first = table_migration(dir.path(), "first_migration", "table1");
    let second = table_migration(dir.path(), "second_migration", "table2");
    pgm_runtime::migrate(&config).await.unwrap();

    remove_migration(dir.path(), &second);
    table_migration(dir.path(), "replacement", "table3");
    table_migration(dir.path(), "another", "table4");

    for _ in 0..2 {
        let err = pgm_runtime::migrate(&config).await.unwrap_err();
        assert!(matches!(err, MigrateError::Divergence { position: 1, .. }));
    }

    assert_eq!(ledger_names(&db).await, [first, second]);
    assert_eq!(db.list_tables("test").await.unwrap(), ["table1", "table2"]);

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_failing_script_rolls_back_whole_run() {
    let Some(db) = isolated("failing_script_rollback").await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config(&db, dir.path(), Priority::Fs);

    table_migration(dir.path(), "first_migration", "table1");
    let broken = create_migration(dir.path(), "broken").unwrap();
    fs::write(&broken.up, "CREATE TABLE test.nope (id NOT_A_TYPE);").unwrap();
    fs::write(&broken.down, "SELECT 1;").unwrap();

    let err = pgm_runtime::migrate(&config).await.unwrap_err();
    assert!(matches!(err, MigrateError::Execution(_)));

    assert!(ledger_names(&db).await.is_empty());
    assert!(db.list_tables("test").await.unwrap().is_empty());

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_down_reverts_last_applied() {
    let Some(db) = isolated("down_reverts_last").await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config(&db, dir.path(), Priority::Fs);

    let first = table_migration(dir.path(), "first_migration", "table1");
    let second = table_migration(dir.path(), "second_migration", "table2");
    pgm_runtime::migrate(&config).await.unwrap();

    let outcome = pgm_runtime::down(&config).await.unwrap();
    assert_eq!(outcome, MigrationOutcome::reverted(second));
    assert_eq!(ledger_names(&db).await, [first.clone()]);

    let outcome = pgm_runtime::down(&config).await.unwrap();
    assert_eq!(outcome, MigrationOutcome::reverted(first));

    let err = pgm_runtime::down(&config).await.unwrap_err();
    assert!(matches!(err, MigrateError::NotFound(_)));

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_migrators_apply_once() {
    let Some(db) = isolated("concurrent_migrators").await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config(&db, dir.path(), Priority::Fs);

    for (i, name) in ["one", "two", "three"].iter().enumerate() {
        table_migration(dir.path(), name, &format!("table{}", i + 1));
    }

    let (a, b) = tokio::join!(pgm_runtime::migrate(&config), pgm_runtime::migrate(&config));
    let total = a.unwrap().len() + b.unwrap().len();
    assert_eq!(total, 3);
    assert_eq!(ledger_names(&db).await.len(), 3);

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_deadline_rolls_back_the_run() {
    let Some(db) = isolated("deadline_rollback").await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let mut config = config(&db, dir.path(), Priority::Fs);
    config.timeout_secs = Some(1);

    table_migration(dir.path(), "fast", "table1");
    let slow = create_migration(dir.path(), "slow").unwrap();
    fs::write(
        &slow.up,
        "CREATE TABLE test.table2 (id SERIAL PRIMARY KEY);\nSELECT pg_sleep(4);",
    )
    .unwrap();
    fs::write(&slow.down, "DROP TABLE test.table2;").unwrap();

    let err = pgm_runtime::migrate(&config).await.unwrap_err();
    assert!(matches!(err, MigrateError::Execution(_)));
    assert!(err.to_string().contains("deadline"));

    assert!(ledger_names(&db).await.is_empty());
    assert!(db.list_tables("test").await.unwrap().is_empty());

    db.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_required_policy_creates_missing_database() {
    let Some(db) = isolated("required_create").await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let target = format!("{}_auto", db.db_name());

    let mut config = config(&db, dir.path(), Priority::Fs);
    config.database.url = db.url().replacen(db.db_name(), &target, 1);
    config.database.create_database = CreateDatabasePolicy::Required;

    let first = table_migration(dir.path(), "first_migration", "table1");
    let outcomes = pgm_runtime::migrate(&config).await.unwrap();
    assert_eq!(summary(&outcomes), [(first, MigrationStatus::Applied)]);

    let created: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&target)
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert!(created);

    // Second run finds the database and only reconciles.
    assert!(pgm_runtime::migrate(&config).await.unwrap().is_empty());

    db.execute(&format!("DROP DATABASE IF EXISTS \"{target}\" WITH (FORCE)"))
        .await
        .unwrap();
    db.cleanup().await.unwrap();
}
