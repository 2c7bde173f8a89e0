use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use pgm_core::config::LedgerConfig;
use pgm_core::error::{MigrateError, Result};
use pgm_core::migration::{LedgerEntry, MigrationOutcome, MigrationScripts};

use super::ledger::Ledger;

/// Isolation level of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    ReadCommitted,
    Serializable,
}

/// A ledger bound to one PostgreSQL transaction.
///
/// Owns the transaction: it ends through [`commit`](Self::commit) or
/// [`rollback`](Self::rollback), and dropping it unfinished (an error path,
/// a panic or a cancelled future) rolls it back.
pub struct LedgerTransaction {
    tx: Transaction<'static, Postgres>,
    ledger: LedgerConfig,
    table: String,
}

impl LedgerTransaction {
    /// Open a transaction on `pool` for the given ledger.
    pub async fn begin(pool: &PgPool, ledger: &LedgerConfig, isolation: Isolation) -> Result<Self> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| MigrateError::Connectivity(format!("Failed to begin transaction: {}", e)))?;

        if isolation == Isolation::Serializable {
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    MigrateError::Execution(format!("Failed to set isolation level: {}", e))
                })?;
        }

        Ok(Self {
            tx,
            table: ledger.qualified_name(),
            ledger: ledger.clone(),
        })
    }

    /// Create the ledger table (and its schema) if missing.
    ///
    /// Concurrent creators are serialized on an advisory lock keyed by the
    /// ledger identity, so this is safe to run on every invocation.
    pub async fn ensure_ledger(&mut self) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(self.ledger.identity())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| MigrateError::Lock(format!("Failed to lock ledger creation: {}", e)))?;

        if let Some(schema) = &self.ledger.schema {
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", schema))
                .execute(&mut *self.tx)
                .await
                .map_err(|e| {
                    MigrateError::Execution(format!("Failed to create ledger schema: {}", e))
                })?;
        }

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                migration_name TEXT UNIQUE NOT NULL,
                up_sql TEXT NOT NULL,
                down_sql TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            self.table
        ))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| MigrateError::Execution(format!("Failed to create ledger table: {}", e)))?;

        Ok(())
    }

    /// Lock the ledger table until this transaction ends.
    ///
    /// Must be the first statement of a serializable transaction: the
    /// snapshot is taken by the first query after it, so a migrator that
    /// waited here sees everything the previous holder committed.
    pub async fn lock(&mut self) -> Result<()> {
        debug!(ledger = %self.ledger.identity(), "Acquiring ledger lock...");
        sqlx::query(&format!("LOCK TABLE {} IN EXCLUSIVE MODE", self.table))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                MigrateError::Lock(format!(
                    "Failed to lock {}: {}",
                    self.ledger.identity(),
                    e
                ))
            })?;
        debug!(ledger = %self.ledger.identity(), "Ledger lock acquired");
        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| MigrateError::Execution(format!("Failed to commit: {}", e)))
    }

    pub async fn rollback(self) -> std::result::Result<(), sqlx::Error> {
        self.tx.rollback().await
    }

    /// Roll back after `err`, keeping both errors if the rollback fails too.
    pub async fn abort(self, err: MigrateError) -> MigrateError {
        match self.rollback().await {
            Ok(()) => err,
            Err(rollback) => err.with_rollback_failure(rollback),
        }
    }

    async fn execute_script(&mut self, sql: &str) -> std::result::Result<(), sqlx::Error> {
        sqlx::Executor::execute(&mut *self.tx, sqlx::raw_sql(sql)).await?;
        Ok(())
    }
}

impl Ledger for LedgerTransaction {
    async fn read(&mut self) -> Result<Vec<LedgerEntry>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(&format!(
            "SELECT migration_name, up_sql, down_sql FROM {} ORDER BY id ASC",
            self.table
        ))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| MigrateError::Execution(format!("Failed to read ledger: {}", e)))?;

        let entries: Vec<LedgerEntry> = rows
            .into_iter()
            .map(|(name, up_sql, down_sql)| LedgerEntry {
                name,
                up_sql,
                down_sql,
            })
            .collect();

        debug!("Ledger holds {} migrations", entries.len());
        Ok(entries)
    }

    async fn last(&mut self) -> Result<Option<LedgerEntry>> {
        let row: Option<(String, String, String)> = sqlx::query_as(&format!(
            "SELECT migration_name, up_sql, down_sql FROM {} ORDER BY id DESC LIMIT 1",
            self.table
        ))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| MigrateError::Execution(format!("Failed to read ledger: {}", e)))?;

        Ok(row.map(|(name, up_sql, down_sql)| LedgerEntry {
            name,
            up_sql,
            down_sql,
        }))
    }

    async fn apply(&mut self, name: &str, scripts: &MigrationScripts) -> Result<()> {
        info!(migration = %name, "Applying migration");

        self.execute_script(&scripts.up).await.map_err(|e| {
            MigrateError::Execution(format!("Failed to apply migration '{}': {}", name, e))
        })?;

        sqlx::query(&format!(
            "INSERT INTO {} (migration_name, up_sql, down_sql) VALUES ($1, $2, $3)",
            self.table
        ))
        .bind(name)
        .bind(&scripts.up)
        .bind(&scripts.down)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            MigrateError::Execution(format!("Failed to record migration '{}': {}", name, e))
        })?;

        Ok(())
    }

    async fn revert_one(&mut self, name: &str) -> Result<MigrationOutcome> {
        info!(migration = %name, "Reverting migration");

        let down_sql: Option<String> = sqlx::query_scalar(&format!(
            "SELECT down_sql FROM {} WHERE migration_name = $1",
            self.table
        ))
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| MigrateError::Execution(format!("Failed to read ledger: {}", e)))?;

        let down_sql = down_sql.ok_or_else(|| {
            MigrateError::NotFound(format!("migration '{}' is not in the ledger", name))
        })?;

        self.execute_script(&down_sql).await.map_err(|e| {
            MigrateError::Execution(format!("Failed to revert migration '{}': {}", name, e))
        })?;

        sqlx::query(&format!(
            "DELETE FROM {} WHERE migration_name = $1",
            self.table
        ))
        .bind(name)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            MigrateError::Execution(format!("Failed to remove migration '{}': {}", name, e))
        })?;

        Ok(MigrationOutcome::reverted(name))
    }
}
