//! Trigger-word mappings. Keywords are unique and stored lowercase.

use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::types::Keyword;
use super::degrade;
use crate::db::Store;

#[derive(Debug, Clone)]
pub struct KeywordRepository {
    store: Store,
}

impl KeywordRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert or replace the mapping for `keyword`.
    pub fn upsert(&self, keyword: &str, action_type: &str, action_value: &str) -> bool {
        let keyword = normalize_keyword(keyword);
        if keyword.is_empty() {
            return false;
        }
        let result = self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO keywords (keyword, action_type, action_value) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(keyword) DO UPDATE SET \
                     action_type = excluded.action_type, action_value = excluded.action_value",
                params![keyword, action_type, action_value],
            )?;
            tracing::debug!(keyword, action_type, "upserted keyword");
            Ok(true)
        });
        degrade("keywords.upsert", result)
    }

    pub fn get(&self, keyword: &str) -> Option<Keyword> {
        let keyword = normalize_keyword(keyword);
        let result = self.store.with_conn(|conn| {
            let sql = format!("SELECT {} FROM keywords WHERE keyword = ?1", Keyword::COLUMNS);
            Ok(conn.query_row(&sql, params![keyword], Keyword::from_row).optional()?)
        });
        degrade("keywords.get", result)
    }

    pub fn get_all(&self) -> Vec<Keyword> {
        let result = self.store.with_conn(|conn| {
            let sql = format!("SELECT {} FROM keywords ORDER BY keyword", Keyword::COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], Keyword::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        });
        degrade("keywords.get_all", result)
    }

    pub fn remove(&self, keyword: &str) -> bool {
        let keyword = normalize_keyword(keyword);
        let result: Result<bool> = self.store.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM keywords WHERE keyword = ?1", params![keyword])?;
            Ok(removed > 0)
        });
        degrade("keywords.remove", result)
    }
}

fn normalize_keyword(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}
