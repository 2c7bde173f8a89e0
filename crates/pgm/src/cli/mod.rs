mod create;
mod down;
mod migrate;

pub use create::CreateCommand;
pub use down::DownCommand;
pub use migrate::MigrateCommand;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use pgm_core::config::{CreateDatabasePolicy, MigratorConfig, Priority};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "pgm.toml";

/// pgm - converge a PostgreSQL database to a directory of up/down migrations
#[derive(Parser)]
#[command(name = "pgm")]
#[command(author, version = concat!("v", env!("CARGO_PKG_VERSION")), about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty up/down migration pair.
    Create(CreateCommand),

    /// Apply and revert migrations until the database matches the directory.
    Migrate(MigrateCommand),

    /// Revert the last applied migration.
    Down(DownCommand),
}

/// Settings shared by every command. Flags override the config file.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Configuration file path (defaults to ./pgm.toml when present).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the migrations directory.
    #[arg(short = 'd', long, global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Target database connection string.
    #[arg(long, env = "PG_CONNECTION_STRING", global = true, hide_env_values = true)]
    pub connection_string: Option<String>,

    /// Name of the ledger table [default: migrations].
    #[arg(long, global = true)]
    pub migrations_table: Option<String>,

    /// Schema of the ledger table.
    #[arg(long, global = true)]
    pub migrations_table_schema: Option<String>,

    /// Which side wins on disagreement: `db` or `fs` [default: fs].
    #[arg(long, global = true)]
    pub priority: Option<Priority>,

    /// Target database auto-creation: `skip`, `best_effort` or `required`.
    #[arg(long, global = true)]
    pub create_database: Option<CreateDatabasePolicy>,

    /// Abort the run (and roll it back) after this many seconds.
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl GlobalArgs {
    /// Build the run configuration: file first, then flags and environment.
    pub fn resolve(&self) -> Result<MigratorConfig> {
        let mut config = match &self.config {
            Some(path) => MigratorConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                MigratorConfig::from_file(DEFAULT_CONFIG_FILE)?
            }
            None => MigratorConfig::new(PathBuf::new(), String::new()),
        };

        if let Some(dir) = &self.migrations_dir {
            config.migrations_dir = dir.clone();
        }
        if let Some(url) = &self.connection_string {
            config.database.url = url.clone();
        }
        if let Some(table) = &self.migrations_table {
            config.ledger.table = table.clone();
        }
        if let Some(schema) = &self.migrations_table_schema {
            config.ledger.schema = Some(schema.clone());
        }
        if let Some(priority) = self.priority {
            config.priority = priority;
        }
        if let Some(policy) = self.create_database {
            config.database.create_database = policy;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = Some(secs);
        }

        Ok(config)
    }
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let config = self.global.resolve()?;

        match self.command {
            Commands::Create(cmd) => cmd.execute(&config),
            Commands::Migrate(cmd) => cmd.execute(&config).await,
            Commands::Down(cmd) => cmd.execute(&config).await,
        }
    }
}

/// Whether a parse error is really clap's help or version output.
pub fn is_informational(err: &clap::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
    )
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the level.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().with_current_span(false).init(),
        LogFormat::Text => builder.init(),
    }
}
