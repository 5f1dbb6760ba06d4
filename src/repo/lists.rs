//! Creator-owned named collections of sound filenames.

use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::types::{SoundList, SoundListItem};
use super::{degrade, format_timestamp, now};
use crate::db::Store;

#[derive(Debug, Clone)]
pub struct ListRepository {
    store: Store,
}

impl ListRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn create(&self, list_name: &str, creator: &str) -> Option<i64> {
        let result = self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sound_lists (list_name, creator, created_at) VALUES (?1, ?2, ?3)",
                params![list_name, creator, format_timestamp(&now())],
            )?;
            let id = conn.last_insert_rowid();
            tracing::debug!(id, list_name, creator, "created sound list");
            Ok(Some(id))
        });
        degrade("lists.create", result)
    }

    pub fn get_by_id(&self, id: i64) -> Option<SoundList> {
        let result = self.store.with_conn(|conn| {
            let sql = format!("SELECT {} FROM sound_lists l WHERE l.id = ?1", SoundList::COLUMNS);
            Ok(conn.query_row(&sql, params![id], SoundList::from_row).optional()?)
        });
        degrade("lists.get_by_id", result)
    }

    /// Lists are looked up by name, optionally narrowed to one creator. With
    /// several matches the oldest wins.
    pub fn get_by_name(&self, list_name: &str, creator: Option<&str>) -> Option<SoundList> {
        let result = self.store.with_conn(|conn| {
            let mut sql = format!("SELECT {} FROM sound_lists l WHERE l.list_name = ?", SoundList::COLUMNS);
            let mut values = vec![Value::Text(list_name.to_string())];
            if let Some(creator) = creator {
                sql.push_str(" AND l.creator = ?");
                values.push(Value::Text(creator.to_string()));
            }
            sql.push_str(" ORDER BY l.id LIMIT 1");
            Ok(query_lists(conn, &sql, values)?.into_iter().next())
        });
        degrade("lists.get_by_name", result)
    }

    pub fn get_all(&self, creator: Option<&str>) -> Vec<SoundList> {
        let result = self.store.with_conn(|conn| {
            let mut sql = format!("SELECT {} FROM sound_lists l", SoundList::COLUMNS);
            let mut values = Vec::new();
            if let Some(creator) = creator {
                sql.push_str(" WHERE l.creator = ?");
                values.push(Value::Text(creator.to_string()));
            }
            sql.push_str(" ORDER BY l.created_at DESC, l.id DESC");
            query_lists(conn, &sql, values)
        });
        degrade("lists.get_all", result)
    }

    /// Delete a list and its items.
    pub fn delete(&self, id: i64) -> bool {
        let result = self.store.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM sound_lists WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        });
        degrade("lists.delete", result)
    }

    /// Add a filename to a list. `false` when it is already a member or the
    /// list does not exist.
    pub fn add_sound(&self, list_id: i64, sound_filename: &str) -> bool {
        let result = self.store.with_conn(|conn| insert_item(conn, list_id, sound_filename));
        degrade("lists.add_sound", result)
    }

    pub fn remove_sound(&self, list_id: i64, sound_filename: &str) -> bool {
        let result = self.store.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM sound_list_items WHERE list_id = ?1 AND sound_filename = ?2",
                params![list_id, sound_filename],
            )?;
            Ok(removed > 0)
        });
        degrade("lists.remove_sound", result)
    }

    /// Items of a list in insertion order.
    pub fn get_sounds(&self, list_id: i64) -> Vec<SoundListItem> {
        let result = self.store.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM sound_list_items WHERE list_id = ?1 ORDER BY id",
                SoundListItem::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![list_id], SoundListItem::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        });
        degrade("lists.get_sounds", result)
    }
}

/// Insert unless the list is missing or already holds the filename.
fn insert_item(conn: &Connection, list_id: i64, sound_filename: &str) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO sound_list_items (list_id, sound_filename, added_at) \
         SELECT ?1, ?2, ?3 WHERE EXISTS (SELECT 1 FROM sound_lists WHERE id = ?1)",
        params![list_id, sound_filename, format_timestamp(&now())],
    )?;
    if inserted == 0 {
        tracing::debug!(list_id, sound_filename, "list item not added");
    }
    Ok(inserted > 0)
}

fn query_lists(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<SoundList>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), SoundList::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
