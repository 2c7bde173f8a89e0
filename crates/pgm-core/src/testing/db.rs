//! Explicit database provisioning for tests.

use sqlx::PgPool;

use crate::error::{MigrateError, Result};

/// Server access for integration tests.
///
/// Reads `TEST_DATABASE_URL` (never `DATABASE_URL` or `PG_CONNECTION_STRING`)
/// so a test run cannot reach a production database by accident.
///
/// ```ignore
/// let Some(server) = TestDatabase::from_env().await? else { return Ok(()) };
/// let db = server.isolated("fs_priority").await?;
/// ```
pub struct TestDatabase {
    pool: PgPool,
    url: String,
}

impl TestDatabase {
    /// Connect to the server at the given URL.
    pub async fn from_url(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(url)
            .await
            .map_err(|e| MigrateError::Connectivity(e.to_string()))?;

        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    /// Connect using `TEST_DATABASE_URL`; `None` when it is not set.
    pub async fn from_env() -> Result<Option<Self>> {
        match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => Self::from_url(&url).await.map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Creates a dedicated database for a single test.
    pub async fn isolated(&self, test_name: &str) -> Result<IsolatedTestDb> {
        let db_name = format!(
            "pgm_test_{}_{}",
            sanitize_db_name(test_name),
            uuid::Uuid::new_v4().simple()
        );

        sqlx::query(&format!("CREATE DATABASE \"{}\"", db_name))
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::Execution(e.to_string()))?;

        let url = replace_db_name(&self.url, &db_name);
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .map_err(|e| MigrateError::Connectivity(e.to_string()))?;

        Ok(IsolatedTestDb {
            pool,
            url,
            db_name,
            base_url: self.url.clone(),
        })
    }
}

/// A database that exists for the lifetime of a single test.
pub struct IsolatedTestDb {
    pool: PgPool,
    url: String,
    db_name: String,
    base_url: String,
}

impl IsolatedTestDb {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Connection URL of this database, suitable for a migrator config.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Run raw SQL, possibly several statements.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrateError::Execution(e.to_string()))?;
        Ok(())
    }

    /// Names of the base tables in `schema`, sorted.
    pub async fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT table_name::TEXT
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .bind(schema)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MigrateError::Execution(e.to_string()))?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Drop the database.
    pub async fn cleanup(self) -> Result<()> {
        self.pool.close().await;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&self.base_url)
            .await
            .map_err(|e| MigrateError::Connectivity(e.to_string()))?;

        let _ = sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity WHERE datname = $1",
        )
        .bind(&self.db_name)
        .execute(&pool)
        .await;

        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\"", self.db_name))
            .execute(&pool)
            .await
            .map_err(|e| MigrateError::Execution(e.to_string()))?;

        Ok(())
    }
}

fn sanitize_db_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(32)
        .collect()
}

/// Replace the database name in a connection URL, keeping any query string.
fn replace_db_name(url: &str, new_db: &str) -> String {
    let (base, query) = match url.find('?') {
        Some(idx) => url.split_at(idx),
        None => (url, ""),
    };
    let scheme_end = base.find("://").map(|i| i + 3).unwrap_or(0);

    match base[scheme_end..].find('/') {
        Some(slash) => format!("{}/{}{}", &base[..scheme_end + slash], new_db, query),
        None => format!("{}/{}{}", base, new_db, query),
    }
}
