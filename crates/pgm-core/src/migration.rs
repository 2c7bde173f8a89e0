//! Migration data model shared by the source, the ledger and the engine.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// A migration declared on the filesystem.
///
/// Scripts are only referenced here; their text is read when the migration
/// actually has to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDefinition {
    /// Unique name. Lexicographic order is apply order.
    pub name: String,
    /// Location of the forward script.
    pub up: PathBuf,
    /// Location of the inverse script.
    pub down: PathBuf,
}

impl MigrationDefinition {
    pub fn new(name: impl Into<String>, up: impl Into<PathBuf>, down: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            up: up.into(),
            down: down.into(),
        }
    }

    /// Read both scripts, up first.
    pub fn load_scripts(&self) -> Result<MigrationScripts> {
        Ok(MigrationScripts {
            up: self.read_script(&self.up)?,
            down: self.read_script(&self.down)?,
        })
    }

    fn read_script(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|source| MigrateError::ScriptRead {
            migration: self.name.clone(),
            path: path.display().to_string(),
            source,
        })
    }
}

/// Script text resolved from a [`MigrationDefinition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScripts {
    pub up: String,
    pub down: String,
}

/// A row of the ledger: a migration as it was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub name: String,
    /// Forward script stored verbatim at apply time.
    pub up_sql: String,
    /// Inverse script stored verbatim at apply time.
    pub down_sql: String,
}

/// What happened to a migration during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MigrationStatus {
    Applied,
    Reverted,
}

impl MigrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Applied => "APPLIED",
            MigrationStatus::Reverted => "REVERTED",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the ordered result of `migrate` or `down`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOutcome {
    pub name: String,
    pub status: MigrationStatus,
}

impl MigrationOutcome {
    pub fn applied(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: MigrationStatus::Applied,
        }
    }

    pub fn reverted(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: MigrationStatus::Reverted,
        }
    }
}
