//! Per-user event sounds (the `users` table), e.g. a jingle played on join.

use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};

use super::types::UserEvent;
use super::degrade;
use crate::db::Store;

#[derive(Debug, Clone)]
pub struct UserEventRepository {
    store: Store,
}

impl UserEventRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Attach `sound` to the user's `event`, or detach it if already attached.
    /// Returns `true` when the sound was added.
    ///
    /// Runs in one immediate transaction; the unique index on
    /// `(id, event, sound)` backs it against writers outside this crate.
    pub fn toggle(&self, user_id: &str, event: &str, sound: &str) -> bool {
        let result = self.store.with_tx(|tx| {
            let removed = tx.execute(
                "DELETE FROM users WHERE id = ?1 AND event = ?2 AND sound = ?3",
                params![user_id, event, sound],
            )?;
            if removed > 0 {
                tracing::debug!(user_id, event, sound, "removed event sound");
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO users (id, event, sound) VALUES (?1, ?2, ?3)",
                params![user_id, event, sound],
            )?;
            tracing::debug!(user_id, event, sound, "added event sound");
            Ok(true)
        });
        degrade("events.toggle", result)
    }

    pub fn get_sounds(&self, user_id: &str, event: &str) -> Vec<String> {
        let result = self.store.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT sound FROM users WHERE id = ?1 AND event = ?2 ORDER BY rowid")?;
            let rows = stmt
                .query_map(params![user_id, event], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(rows)
        });
        degrade("events.get_sounds", result)
    }

    /// Every registration, optionally restricted to one event kind.
    pub fn get_all(&self, event: Option<&str>) -> Vec<UserEvent> {
        let result = self.store.with_conn(|conn| {
            let mut sql = format!("SELECT {} FROM users", UserEvent::COLUMNS);
            let mut values = Vec::new();
            if let Some(event) = event {
                sql.push_str(" WHERE event = ?");
                values.push(Value::Text(event.to_string()));
            }
            sql.push_str(" ORDER BY id, event, rowid");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values), UserEvent::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        });
        degrade("events.get_all", result)
    }
}
