use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Target database connection URL.
    #[serde(default)]
    pub url: String,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// What to do when the target database does not exist yet.
    #[serde(default)]
    pub create_database: CreateDatabasePolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_secs: default_connect_timeout(),
            create_database: CreateDatabasePolicy::default(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    30
}

/// Policy for creating the target database before connecting to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateDatabasePolicy {
    /// Never try to create the database.
    Skip,
    /// Try to create it; on failure log a warning and connect anyway.
    #[default]
    BestEffort,
    /// Try to create it; failure aborts the run.
    Required,
}

impl FromStr for CreateDatabasePolicy {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(CreateDatabasePolicy::Skip),
            "best_effort" | "best-effort" => Ok(CreateDatabasePolicy::BestEffort),
            "required" => Ok(CreateDatabasePolicy::Required),
            other => Err(MigrateError::Validation(format!(
                "invalid create database policy '{}'. valid values \"skip\", \"best_effort\" or \"required\"",
                other
            ))),
        }
    }
}
