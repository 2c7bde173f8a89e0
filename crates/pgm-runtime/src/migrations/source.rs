//! Filesystem migration source.
//!
//! A migration is a pair of files sharing a sortable base name:
//! - `20240101120000_create_users.up.sql`
//! - `20240101120000_create_users.down.sql`
//!
//! Lexical order of the base names is apply order.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use pgm_core::config::validate_identifier;
use pgm_core::error::{MigrateError, Result};
use pgm_core::migration::MigrationDefinition;
use tracing::{debug, warn};

const UP_SUFFIX: &str = ".up.sql";
const DOWN_SUFFIX: &str = ".down.sql";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Load declared migrations from a directory, sorted by name.
///
/// An existing empty directory yields an empty list. Files that are not
/// `*.up.sql` or `*.down.sql` are ignored. When one side of a pair is
/// missing its expected path is still recorded, so reading it fails at the
/// point the migration has to be applied.
pub fn load_migrations_from_dir(dir: &Path) -> Result<Vec<MigrationDefinition>> {
    let source_error = |source| MigrateError::SourceRead {
        path: dir.display().to_string(),
        source,
    };

    let mut pairs: BTreeMap<String, (Option<PathBuf>, Option<PathBuf>)> = BTreeMap::new();

    for entry in std::fs::read_dir(dir).map_err(source_error)? {
        let entry = entry.map_err(source_error)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };

        if let Some(name) = file_name.strip_suffix(UP_SUFFIX) {
            pairs.entry(name.to_string()).or_default().0 = Some(path.clone());
        } else if let Some(name) = file_name.strip_suffix(DOWN_SUFFIX) {
            pairs.entry(name.to_string()).or_default().1 = Some(path.clone());
        }
    }

    let migrations: Vec<MigrationDefinition> = pairs
        .into_iter()
        .map(|(name, (up, down))| {
            if up.is_none() || down.is_none() {
                warn!(migration = %name, "Migration is missing one of its scripts");
            }
            let up = up.unwrap_or_else(|| dir.join(format!("{}{}", name, UP_SUFFIX)));
            let down = down.unwrap_or_else(|| dir.join(format!("{}{}", name, DOWN_SUFFIX)));
            MigrationDefinition::new(name, up, down)
        })
        .collect();

    debug!("Loaded {} migrations from {}", migrations.len(), dir.display());
    Ok(migrations)
}

/// Create an empty up/down script pair for a new migration.
///
/// The base name is `<timestamp>_<name>`; the timestamp is moved past the
/// newest existing prefix so the new pair always sorts last. When an existing
/// name outside that scheme would still sort after it, nothing is written
/// and a validation error is returned.
pub fn create_migration(dir: &Path, name: &str) -> Result<MigrationDefinition> {
    validate_identifier("migration name", name)?;

    std::fs::create_dir_all(dir).map_err(|source| MigrateError::SourceRead {
        path: dir.display().to_string(),
        source,
    })?;

    let existing = load_migrations_from_dir(dir)?;
    let prefix = next_prefix(
        Utc::now().format(TIMESTAMP_FORMAT).to_string(),
        existing.iter().map(|m| m.name.as_str()),
    );

    let base = format!("{}_{}", prefix, name);
    if let Some(newest) = existing.last().filter(|m| m.name >= base) {
        return Err(MigrateError::Validation(format!(
            "new migration '{}' would not sort after existing migration '{}'",
            base, newest.name
        )));
    }

    let migration = MigrationDefinition::new(
        base.clone(),
        dir.join(format!("{}{}", base, UP_SUFFIX)),
        dir.join(format!("{}{}", base, DOWN_SUFFIX)),
    );

    write_new_script(&migration.up, &format!("-- Migration: {} (up)\n", base))?;
    write_new_script(&migration.down, &format!("-- Migration: {} (down)\n", base))?;

    Ok(migration)
}

/// Pick a numeric prefix that is greater than every existing one.
fn next_prefix<'a>(now: String, existing: impl Iterator<Item = &'a str>) -> String {
    let newest = existing
        .filter_map(|name| name.split('_').next())
        .filter(|prefix| prefix.len() == now.len())
        .filter_map(|prefix| prefix.parse::<u64>().ok())
        .max();

    match (newest, now.parse::<u64>()) {
        (Some(newest), Ok(current)) if newest >= current => (newest + 1).to_string(),
        _ => now,
    }
}

fn write_new_script(path: &Path, content: &str) -> Result<()> {
    let io_error = |source| MigrateError::SourceRead {
        path: path.display().to_string(),
        source,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(io_error)?;
    file.write_all(content.as_bytes()).map_err(io_error)?;
    Ok(())
}
