pub mod doctor;
pub mod maintenance;
pub mod search;
pub mod stats;

use anyhow::{Context, Result};
use serde::Serialize;

use soundbase::config::SoundbaseConfig;
use soundbase::db::Store;

/// Open the configured database, creating and migrating it if needed.
pub fn open_store(config: &SoundbaseConfig) -> Result<Store> {
    let db_path = config.resolved_db_path();
    Store::open_with_timeout(&db_path, config.storage.busy_timeout_ms)
        .with_context(|| format!("failed to open database at {}", db_path.display()))
}

/// Create the database file and bring the schema to the current version.
pub fn init(config: &SoundbaseConfig) -> Result<()> {
    let store = open_store(config)?;
    let report = store.health()?;
    println!("Database ready at {}", store.path().display());
    println!("Schema version: {}", report.schema_version);
    Ok(())
}

/// Pretty-print a report as JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize report")?;
    println!("{out}");
    Ok(())
}

/// `3725` -> `1h 02m`.
pub fn format_duration(seconds: i64) -> String {
    let minutes = seconds.max(0) / 60;
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}
