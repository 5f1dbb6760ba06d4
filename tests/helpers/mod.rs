#![allow(dead_code)]

use chrono::{Duration, NaiveDateTime};
use soundbase::db::Store;
use soundbase::repo::{now, parse_timestamp};
use tempfile::TempDir;

/// Open a fresh store with schema and migrations applied.
///
/// Every repository call opens its own connection, so the store must live on
/// disk. Keep the returned `TempDir` alive for the whole test.
pub fn test_store() -> (TempDir, Store) {
    let tmp = TempDir::new().unwrap();
    let store = Store::open(tmp.path().join("soundbase.db")).unwrap();
    (tmp, store)
}

/// Parse a literal timestamp in any accepted form.
pub fn ts(raw: &str) -> NaiveDateTime {
    parse_timestamp(raw).unwrap()
}

/// A time `days` days before now.
pub fn days_ago(days: i64) -> NaiveDateTime {
    now() - Duration::days(days)
}

/// Count rows in `table` directly, bypassing the repositories.
pub fn row_count(store: &Store, table: &str) -> i64 {
    store
        .with_conn(|conn| {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?)
        })
        .unwrap()
}
