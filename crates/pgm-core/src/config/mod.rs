mod database;

pub use database::{CreateDatabasePolicy, DatabaseConfig};

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MigrateError, Result};

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]+$").expect("identifier pattern is valid"));

static ENV_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid"));

/// Default name of the ledger table.
pub const DEFAULT_LEDGER_TABLE: &str = "migrations";

/// Root configuration for the migrator.
///
/// Built once at the edge (file, environment, flags) and passed by reference
/// into every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigratorConfig {
    /// Directory holding `*.up.sql` / `*.down.sql` pairs.
    #[serde(default)]
    pub migrations_dir: PathBuf,

    /// Target database.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Where applied migrations are recorded.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Which side wins when the ledger and the directory disagree.
    #[serde(default)]
    pub priority: Priority,

    /// Deadline for a whole `migrate` or `down` run, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl MigratorConfig {
    pub fn new(migrations_dir: impl Into<PathBuf>, database_url: impl Into<String>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            database: DatabaseConfig {
                url: database_url.into(),
                ..Default::default()
            },
            ledger: LedgerConfig::default(),
            priority: Priority::default(),
            timeout_secs: None,
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| MigrateError::Config(format!("Failed to read config file: {}", e)))?;

        debug!("Loaded configuration from {}", path.as_ref().display());
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let content = substitute_env_vars(content);

        toml::from_str(&content)
            .map_err(|e| MigrateError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Checks needed by every command.
    pub fn validate_source(&self) -> Result<()> {
        if self.migrations_dir.as_os_str().is_empty() {
            return Err(MigrateError::Validation(
                "migrations dir is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks needed by commands that talk to the database.
    pub fn validate(&self) -> Result<()> {
        self.validate_source()?;
        self.ledger.validate()?;

        if self.database.url.is_empty() {
            return Err(MigrateError::Validation(
                "connection string is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Location of the ledger table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_table")]
    pub table: String,

    /// Schema of the ledger table; the connection's search path when unset.
    #[serde(default)]
    pub schema: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            table: default_ledger_table(),
            schema: None,
        }
    }
}

fn default_ledger_table() -> String {
    DEFAULT_LEDGER_TABLE.to_string()
}

impl LedgerConfig {
    pub fn new(schema: Option<&str>, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: schema.map(str::to_string),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier("migrations table", &self.table)?;
        if let Some(schema) = &self.schema {
            validate_identifier("migrations table schema", schema)?;
        }
        Ok(())
    }

    /// Quoted, schema-qualified table name for use in SQL text.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("\"{}\".\"{}\"", schema, self.table),
            None => format!("\"{}\"", self.table),
        }
    }

    /// Unquoted identity of the ledger, e.g. `public.migrations`.
    pub fn identity(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.table),
            None => self.table.clone(),
        }
    }
}

/// Which sequence is authoritative when ledger and directory disagree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// The ledger wins: divergence is fatal, nothing is reverted.
    Db,
    /// The directory wins: divergent ledger entries are reverted.
    #[default]
    Fs,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Db => "db",
            Priority::Fs => "fs",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "db" => Ok(Priority::Db),
            "fs" => Ok(Priority::Fs),
            other => Err(MigrateError::Validation(format!(
                "invalid priority '{}'. valid values \"db\" or \"fs\"",
                other
            ))),
        }
    }
}

/// Ensure `value` only contains letters, digits and `_`.
pub fn validate_identifier(kind: &str, value: &str) -> Result<()> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(MigrateError::Validation(format!(
            "{} might contain only letters, numbers and \"_\" symbol",
            kind
        )))
    }
}

/// Substitute `${VAR}` references with environment values.
fn substitute_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    for cap in ENV_VAR.captures_iter(content) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}
