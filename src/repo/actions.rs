//! Append-only action log: inserts, rankings and idempotency checks.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::types::{Action, RankedSound, RankedUser, TagCount};
use super::{degrade, format_timestamp, now, window_start};
use crate::db::Store;

/// Action tags that count as a sound being played.
pub const PLAY_ACTIONS: &[&str] = &[
    "play_random_sound",
    "play_request",
    "play_from_list",
    "play_similar_sound",
    "replay_sound",
    "play_random_favorite_sound",
    "play_sound_periodically",
];

pub const FAVORITE_ACTION: &str = "favorite_sound";
pub const UNFAVORITE_ACTION: &str = "unfavorite_sound";

/// Days per "month" in the on-this-day lookback.
pub const DAYS_PER_MONTH: i64 = 30;
/// Days either side of the on-this-day center date that still count.
pub const ON_THIS_DAY_SPREAD_DAYS: i64 = 1;

/// `'a', 'b', ...` for an IN clause over the play whitelist.
pub(crate) fn play_actions_sql() -> String {
    PLAY_ACTIONS
        .iter()
        .map(|a| format!("'{a}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Drop a `#1234` discriminator suffix.
pub fn normalize_username(username: &str) -> &str {
    username.split('#').next().unwrap_or(username)
}

#[derive(Debug, Clone)]
pub struct ActionRepository {
    store: Store,
}

impl ActionRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Append an action stamped with the current time.
    pub fn insert(&self, username: &str, action: &str, target: &str, guild_id: Option<i64>) -> Option<i64> {
        self.insert_at(username, action, target, guild_id, now())
    }

    /// Append an action with an explicit timestamp (backfills and imports).
    pub fn insert_at(
        &self,
        username: &str,
        action: &str,
        target: &str,
        guild_id: Option<i64>,
        timestamp: NaiveDateTime,
    ) -> Option<i64> {
        let username = normalize_username(username);
        let result = self.store.with_conn(|conn| {
            conn.execute(
                "INSERT INTO actions (username, action, target, timestamp, guild_id) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![username, action, target, format_timestamp(&timestamp), guild_id],
            )
            .context("insert action")?;
            let id = conn.last_insert_rowid();
            tracing::debug!(id, username, action, target, guild_id = ?guild_id, "action logged");
            Ok(Some(id))
        });
        degrade("actions.insert", result)
    }

    pub fn get_by_id(&self, id: i64) -> Option<Action> {
        let result = self.store.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM actions WHERE id = ?1", Action::COLUMNS),
                    params![id],
                    Action::from_row,
                )
                .optional()?)
        });
        degrade("actions.get_by_id", result)
    }

    /// Most recent actions first.
    pub fn get_all(&self, limit: usize) -> Vec<Action> {
        let result = self.store.with_conn(|conn| {
            query_actions(
                conn,
                &format!(
                    "SELECT {} FROM actions ORDER BY timestamp DESC, id DESC LIMIT ?1",
                    Action::COLUMNS
                ),
                vec![Value::Integer(limit as i64)],
            )
        });
        degrade("actions.get_all", result)
    }

    /// A user's most recent actions first.
    pub fn get_by_user(&self, username: &str, limit: usize) -> Vec<Action> {
        let username = normalize_username(username).to_string();
        let result = self.store.with_conn(|conn| {
            query_actions(
                conn,
                &format!(
                    "SELECT {} FROM actions WHERE username = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
                    Action::COLUMNS
                ),
                vec![Value::Text(username), Value::Integer(limit as i64)],
            )
        });
        degrade("actions.get_by_user", result)
    }

    /// Users ranked by plays of non-slap sounds, plus the total qualifying play count.
    ///
    /// `days = 0` covers all history.
    pub fn get_top_users(&self, days: u32, limit: usize) -> (Vec<RankedUser>, u64) {
        let since = window_start(now(), days);
        let result = self.store.with_conn(|conn| {
            let (filter, mut values) = play_filter(since);
            let total = count_with(conn, &format!("SELECT COUNT(*) FROM {filter}"), values.clone())?;

            values.push(Value::Integer(limit as i64));
            let sql = format!(
                "SELECT a.username, COUNT(*) AS plays FROM {filter} \
                 GROUP BY a.username ORDER BY plays DESC, a.username ASC LIMIT ?"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values), |row| {
                    Ok(RankedUser {
                        username: row.get(0)?,
                        count: row.get::<_, i64>(1)? as u64,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok((rows, total))
        });
        degrade("actions.get_top_users", result)
    }

    /// Non-slap sounds ranked by plays, plus the total qualifying play count.
    ///
    /// `days = 0` covers all history.
    pub fn get_top_sounds(&self, days: u32, limit: usize) -> (Vec<RankedSound>, u64) {
        let since = window_start(now(), days);
        let result = self.store.with_conn(|conn| {
            let (filter, values) = play_filter(since);
            let total = count_with(conn, &format!("SELECT COUNT(*) FROM {filter}"), values.clone())?;
            let rows = ranked_sounds(conn, &filter, values, limit)?;
            Ok((rows, total))
        });
        degrade("actions.get_top_sounds", result)
    }

    /// Lifetime plays of one sound.
    pub fn get_sound_play_count(&self, sound_id: i64) -> u64 {
        let result = self.store.with_conn(|conn| {
            count_with(
                conn,
                &format!(
                    "SELECT COUNT(*) FROM actions WHERE target = ? AND action IN ({})",
                    play_actions_sql()
                ),
                vec![Value::Text(sound_id.to_string())],
            )
        });
        degrade("actions.get_sound_play_count", result)
    }

    /// Users whose latest favorite/unfavorite of this sound is a favorite.
    pub fn get_users_who_favorited(&self, sound_id: i64) -> Vec<String> {
        let result = self.store.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.username FROM actions a \
                 WHERE a.target = ?1 AND a.action = ?2 \
                   AND a.id = ( \
                       SELECT b.id FROM actions b \
                        WHERE b.username = a.username AND b.target = a.target \
                          AND b.action IN (?2, ?3) \
                        ORDER BY b.timestamp DESC, b.id DESC LIMIT 1) \
                 ORDER BY a.username",
            )?;
            let users = stmt
                .query_map(
                    params![sound_id.to_string(), FAVORITE_ACTION, UNFAVORITE_ACTION],
                    |row| row.get(0),
                )?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(users)
        });
        degrade("actions.get_users_who_favorited", result)
    }

    /// Whether `(action, target)` was already recorded for `guild_id`.
    ///
    /// `guild_id = None` matches only rows without a guild. With
    /// `include_global`, a row without a guild also satisfies a guild query.
    pub fn has_action_for_target(
        &self,
        action: &str,
        target: &str,
        guild_id: Option<i64>,
        include_global: bool,
    ) -> bool {
        let result = self.store.with_conn(|conn| {
            let scope = match (guild_id, include_global) {
                (None, _) => "guild_id IS NULL",
                (Some(_), false) => "guild_id = ?3",
                (Some(_), true) => "(guild_id = ?3 OR guild_id IS NULL)",
            };
            let sql = format!(
                "SELECT EXISTS(SELECT 1 FROM actions WHERE action = ?1 AND target = ?2 AND {scope})"
            );
            let found: bool = match guild_id {
                Some(g) => conn.query_row(&sql, params![action, target, g], |row| row.get(0))?,
                None => conn.query_row(&sql, params![action, target], |row| row.get(0))?,
            };
            Ok(found)
        });
        degrade("actions.has_action_for_target", result)
    }

    /// Non-slap sounds played around the same date `months_ago * 30` days back.
    pub fn get_sounds_on_this_day(&self, months_ago: u32, limit: usize) -> Vec<RankedSound> {
        let Some((start, end)) = on_this_day_window(now(), months_ago) else {
            tracing::debug!(months_ago, "on-this-day window exceeds calendar range");
            return Vec::new();
        };
        let result = self.store.with_conn(|conn| {
            let (filter, values) = play_filter_between(start, end);
            ranked_sounds(conn, &filter, values, limit)
        });
        degrade("actions.get_sounds_on_this_day", result)
    }

    /// Qualifying plays (non-slap) in the trailing window.
    pub fn total_plays(&self, days: u32) -> u64 {
        let since = window_start(now(), days);
        let result = self.store.with_conn(|conn| {
            let (filter, values) = play_filter(since);
            count_with(conn, &format!("SELECT COUNT(*) FROM {filter}"), values)
        });
        degrade("actions.total_plays", result)
    }

    /// Distinct usernames with any action in the trailing window.
    pub fn active_users(&self, days: u32) -> u64 {
        let since = window_start(now(), days);
        let result = self.store.with_conn(|conn| {
            let (clause, values) = since_clause("timestamp", since);
            count_with(
                conn,
                &format!("SELECT COUNT(DISTINCT username) FROM actions WHERE {clause}"),
                values,
            )
        });
        degrade("actions.active_users", result)
    }

    /// Per-tag counts in the trailing window, most frequent first.
    pub fn count_by_action(&self, days: u32) -> Vec<TagCount> {
        let since = window_start(now(), days);
        let result = self.store.with_conn(|conn| {
            let (clause, values) = since_clause("timestamp", since);
            tag_counts(
                conn,
                &format!(
                    "SELECT action, COUNT(*) AS n FROM actions WHERE {clause} \
                     GROUP BY action ORDER BY n DESC, action ASC"
                ),
                values,
            )
        });
        degrade("actions.count_by_action", result)
    }

    /// Per-tag counts for one user in `[from, to)`.
    pub fn user_action_counts(&self, username: &str, from: NaiveDateTime, to: NaiveDateTime) -> Vec<TagCount> {
        let username = normalize_username(username).to_string();
        let result = self.store.with_conn(|conn| {
            tag_counts(
                conn,
                "SELECT action, COUNT(*) AS n FROM actions \
                 WHERE username = ? AND timestamp >= ? AND timestamp < ? \
                 GROUP BY action ORDER BY n DESC, action ASC",
                vec![
                    Value::Text(username),
                    Value::Text(format_timestamp(&from)),
                    Value::Text(format_timestamp(&to)),
                ],
            )
        });
        degrade("actions.user_action_counts", result)
    }

    /// One user's most played non-slap sounds in `[from, to)`.
    pub fn user_top_sounds(
        &self,
        username: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
        limit: usize,
    ) -> Vec<RankedSound> {
        let username = normalize_username(username).to_string();
        let result = self.store.with_conn(|conn| {
            let (filter, mut values) = play_filter_between(from, to);
            values.push(Value::Text(username));
            ranked_sounds(conn, &format!("{filter} AND a.username = ?"), values, limit)
        });
        degrade("actions.user_top_sounds", result)
    }

    /// The calendar day on which a user logged the most actions in `[from, to)`.
    pub fn user_most_active_day(
        &self,
        username: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Option<TagCount> {
        let username = normalize_username(username).to_string();
        let result = self.store.with_conn(|conn| {
            let mut rows = tag_counts(
                conn,
                "SELECT date(timestamp) AS day, COUNT(*) AS n FROM actions \
                 WHERE username = ? AND timestamp >= ? AND timestamp < ? \
                 GROUP BY day ORDER BY n DESC, day ASC LIMIT 1",
                vec![
                    Value::Text(username),
                    Value::Text(format_timestamp(&from)),
                    Value::Text(format_timestamp(&to)),
                ],
            )?;
            Ok(rows.pop())
        });
        degrade("actions.user_most_active_day", result)
    }
}

/// `[center - spread, center + spread + 1 day)` at day granularity, or `None`
/// when the window falls outside the representable calendar.
pub(crate) fn on_this_day_window(now: NaiveDateTime, months_ago: u32) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let back = Duration::try_days(i64::from(months_ago) * DAYS_PER_MONTH)?;
    let center = now.checked_sub_signed(back)?.date();
    let start = center.checked_sub_signed(Duration::try_days(ON_THIS_DAY_SPREAD_DAYS)?)?;
    let end = center.checked_add_signed(Duration::try_days(ON_THIS_DAY_SPREAD_DAYS + 1)?)?;
    Some((start.and_time(NaiveTime::MIN), end.and_time(NaiveTime::MIN)))
}

/// FROM/WHERE fragment over play actions joined to non-slap sounds.
fn play_filter(since: Option<NaiveDateTime>) -> (String, Vec<Value>) {
    let (clause, values) = since_clause("a.timestamp", since);
    (
        format!(
            "actions a JOIN sounds s ON a.target = CAST(s.id AS TEXT) \
             WHERE a.action IN ({}) AND s.slap = 0 AND {clause}",
            play_actions_sql()
        ),
        values,
    )
}

fn play_filter_between(from: NaiveDateTime, to: NaiveDateTime) -> (String, Vec<Value>) {
    (
        format!(
            "actions a JOIN sounds s ON a.target = CAST(s.id AS TEXT) \
             WHERE a.action IN ({}) AND s.slap = 0 AND a.timestamp >= ? AND a.timestamp < ?",
            play_actions_sql()
        ),
        vec![
            Value::Text(format_timestamp(&from)),
            Value::Text(format_timestamp(&to)),
        ],
    )
}

pub(crate) fn since_clause(column: &str, since: Option<NaiveDateTime>) -> (String, Vec<Value>) {
    match since {
        Some(ts) => (format!("{column} >= ?"), vec![Value::Text(format_timestamp(&ts))]),
        None => ("1 = 1".to_string(), Vec::new()),
    }
}

/// Plays per filename, so a guild copy and the shared sound it shadows rank as
/// one entry under the lowest id.
fn ranked_sounds(conn: &Connection, filter: &str, mut values: Vec<Value>, limit: usize) -> Result<Vec<RankedSound>> {
    values.push(Value::Integer(limit as i64));
    let sql = format!(
        "SELECT MIN(s.id) AS sound_id, s.filename, COUNT(*) AS plays FROM {filter} \
         GROUP BY s.filename ORDER BY plays DESC, sound_id ASC LIMIT ?"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            Ok(RankedSound {
                sound_id: row.get(0)?,
                filename: row.get(1)?,
                count: row.get::<_, i64>(2)? as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn tag_counts(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<TagCount>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            Ok(TagCount {
                tag: row.get(0)?,
                count: row.get::<_, i64>(1)? as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn count_with(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<u64> {
    let n: i64 = conn.query_row(sql, params_from_iter(values), |row| row.get(0))?;
    Ok(n as u64)
}

fn query_actions(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<Action>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), Action::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
