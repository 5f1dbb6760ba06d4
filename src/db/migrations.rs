//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`].

use rusqlite::Connection;

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

/// Run any pending forward-only migrations. Each migration runs in a transaction.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");

        let tx = conn.transaction()?;
        match next {
            2 => migrate_v1_to_v2(&tx)?,
            3 => migrate_v2_to_v3(&tx)?,
            _ => {
                tracing::error!(version = next, "unknown migration target");
                break;
            }
        }
        update_schema_version(&tx, next)?;
        tx.commit()?;
        version = next;
    }

    Ok(())
}

/// Migration v1 → v2: guild scoping for sounds and actions.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    if !has_column(conn, "sounds", "guild_id")? {
        conn.execute("ALTER TABLE sounds ADD COLUMN guild_id INTEGER", [])?;
    }
    if !has_column(conn, "actions", "guild_id")? {
        conn.execute("ALTER TABLE actions ADD COLUMN guild_id INTEGER", [])?;
    }
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_sounds_guild_filename ON sounds(guild_id, filename);
         CREATE INDEX IF NOT EXISTS idx_actions_action_target_guild ON actions(action, target, guild_id);",
    )?;
    Ok(())
}

/// Migration v2 → v3: uniqueness constraints backing the toggle writes.
///
/// Duplicate rows left behind by earlier racing writers are collapsed first,
/// otherwise the unique indexes could not be created.
fn migrate_v2_to_v3(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "DELETE FROM users WHERE rowid NOT IN (
             SELECT MIN(rowid) FROM users GROUP BY id, event, sound
         );
         CREATE UNIQUE INDEX IF NOT EXISTS idx_users_unique ON users(id, event, sound);

         UPDATE voice_activity SET leave_time = join_time
          WHERE leave_time IS NULL
            AND id NOT IN (
                SELECT MAX(id) FROM voice_activity
                 WHERE leave_time IS NULL
                 GROUP BY username, channel_id
            );
         CREATE UNIQUE INDEX IF NOT EXISTS idx_voice_one_open
             ON voice_activity(username, channel_id) WHERE leave_time IS NULL;",
    )?;
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|n| n == column))
}
