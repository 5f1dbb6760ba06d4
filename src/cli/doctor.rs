//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use soundbase::config::SoundbaseConfig;

use super::{open_store, print_json};

/// Run database diagnostics and print a health report.
pub fn doctor(config: &SoundbaseConfig, json: bool) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `soundbase init` to create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let store = open_store(config).context("failed to open database (may be corrupt)")?;
    let report = store.health().context("failed to run health check")?;

    if json {
        return print_json(&report);
    }

    println!("Soundbase Health Report");
    println!("=======================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Row counts:");
    println!("  Sounds:          {}", report.sound_count);
    println!("  Actions:         {}", report.action_count);
    println!("  Voice sessions:  {} ({} open)", report.voice_session_count, report.open_voice_sessions);
    println!("  Lists:           {}", report.list_count);
    println!("  Keywords:        {}", report.keyword_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Stop every process using the database.");
        println!("  2. Restore from a backup: cp backup.db {}", db_path.display());
    }

    if report.open_voice_sessions > 0 {
        println!();
        println!("Note: open voice sessions are expected while the bot runs.");
        println!("After a crash, run `soundbase close-sessions` to close them.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
