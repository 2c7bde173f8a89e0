use thiserror::Error;

/// Error type for every migrator operation.
///
/// Anything raised after the migration transaction has been opened causes
/// that transaction to roll back before the error reaches the caller.
#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot read migrations source {path}")]
    SourceRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read script {path} of migration '{migration}'")]
    ScriptRead {
        migration: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Migrations diverge at position {position}: ledger has '{ledger}', source has '{declared}'")]
    Divergence {
        position: usize,
        ledger: String,
        declared: String,
    },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// The rollback issued for a failing run failed as well.
    #[error("{cause} (rollback also failed: {rollback})")]
    Rollback {
        cause: Box<MigrateError>,
        rollback: sqlx::Error,
    },
}

impl MigrateError {
    /// Wrap a failed rollback around the error that triggered it.
    pub fn with_rollback_failure(self, rollback: sqlx::Error) -> Self {
        MigrateError::Rollback {
            cause: Box::new(self),
            rollback,
        }
    }

    /// Whether the error was raised before touching the database.
    pub fn is_validation(&self) -> bool {
        matches!(self, MigrateError::Validation(_) | MigrateError::Config(_))
    }
}

/// Result type alias using MigrateError.
pub type Result<T> = std::result::Result<T, MigrateError>;
