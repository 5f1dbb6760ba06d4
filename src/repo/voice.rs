//! Voice channel session tracking and interval-overlap aggregation.
//!
//! A session is `[join_time, leave_time)`; an open session has no
//! `leave_time`. Every aggregate measures the clamped intersection of a
//! session with a reporting window, floored at zero.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use super::actions::normalize_username;
use super::types::{OpenSessionEnd, VoiceMetrics, VoiceRanking, VoiceSession};
use super::{degrade, format_timestamp, now, window_start};
use crate::db::Store;

#[derive(Debug, Clone)]
pub struct VoiceActivityRepository {
    store: Store,
}

impl VoiceActivityRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Open a session. A still-open session for the same user and channel is
    /// closed at `time` first so at most one stays open.
    pub fn log_join(&self, username: &str, channel_id: &str, time: NaiveDateTime) -> Option<i64> {
        let username = normalize_username(username);
        let result = self.store.with_tx(|tx| {
            let ts = format_timestamp(&time);
            let stale = tx.execute(
                "UPDATE voice_activity SET leave_time = ?3 \
                 WHERE username = ?1 AND channel_id = ?2 AND leave_time IS NULL",
                params![username, channel_id, ts],
            )?;
            if stale > 0 {
                tracing::warn!(username, channel_id, stale, "closed stale open voice session on rejoin");
            }

            tx.execute(
                "INSERT INTO voice_activity (username, channel_id, join_time, leave_time) VALUES (?1, ?2, ?3, NULL)",
                params![username, channel_id, ts],
            )
            .context("insert voice session")?;
            let id = tx.last_insert_rowid();
            tracing::debug!(id, username, channel_id, "voice join");
            Ok(Some(id))
        });
        degrade("voice.log_join", result)
    }

    /// Close the most recent open session for the pair. `false` when none is open.
    pub fn log_leave(&self, username: &str, channel_id: &str, time: NaiveDateTime) -> bool {
        let username = normalize_username(username);
        let result = self.store.with_conn(|conn| {
            let closed = conn.execute(
                "UPDATE voice_activity SET leave_time = ?3 \
                 WHERE id = ( \
                     SELECT id FROM voice_activity \
                      WHERE username = ?1 AND channel_id = ?2 AND leave_time IS NULL \
                      ORDER BY join_time DESC, id DESC LIMIT 1)",
                params![username, channel_id, format_timestamp(&time)],
            )?;
            if closed == 0 {
                tracing::debug!(username, channel_id, "voice leave without open session");
            }
            Ok(closed > 0)
        });
        degrade("voice.log_leave", result)
    }

    /// Close every open session at `time`. Used when the bot restarts and
    /// missed the leave events.
    pub fn close_open_sessions(&self, time: NaiveDateTime) -> usize {
        let result = self.store.with_conn(|conn| {
            let closed = conn.execute(
                "UPDATE voice_activity SET leave_time = MAX(join_time, ?1) WHERE leave_time IS NULL",
                params![format_timestamp(&time)],
            )?;
            if closed > 0 {
                tracing::info!(closed, "closed open voice sessions");
            }
            Ok(closed)
        });
        degrade("voice.close_open_sessions", result)
    }

    pub fn get_open_sessions(&self) -> Vec<VoiceSession> {
        let result = self.store.with_conn(|conn| {
            query_sessions(
                conn,
                &format!(
                    "SELECT {} FROM voice_activity WHERE leave_time IS NULL ORDER BY join_time, id",
                    VoiceSession::COLUMNS
                ),
                Vec::new(),
            )
        });
        degrade("voice.get_open_sessions", result)
    }

    /// Voice totals for one user over `[period_start, period_end]`, open sessions
    /// running to `period_end`.
    pub fn get_user_voice_metrics(
        &self,
        username: &str,
        period_start: NaiveDateTime,
        period_end: NaiveDateTime,
    ) -> VoiceMetrics {
        self.get_user_voice_metrics_with(username, period_start, period_end, OpenSessionEnd::PeriodEnd)
    }

    pub fn get_user_voice_metrics_with(
        &self,
        username: &str,
        period_start: NaiveDateTime,
        period_end: NaiveDateTime,
        open_end: OpenSessionEnd,
    ) -> VoiceMetrics {
        self.user_metrics(username, period_start, period_end, open_end, EndBound::Closed)
    }

    /// Like [`Self::get_user_voice_metrics_with`] over `[period_start, period_end)`:
    /// a join or leave stamped exactly `period_end` belongs to the next period.
    pub(crate) fn user_metrics_in_range(
        &self,
        username: &str,
        period_start: NaiveDateTime,
        period_end: NaiveDateTime,
        open_end: OpenSessionEnd,
    ) -> VoiceMetrics {
        self.user_metrics(username, period_start, period_end, open_end, EndBound::Open)
    }

    fn user_metrics(
        &self,
        username: &str,
        period_start: NaiveDateTime,
        period_end: NaiveDateTime,
        open_end: OpenSessionEnd,
        end_bound: EndBound,
    ) -> VoiceMetrics {
        if period_end < period_start {
            return VoiceMetrics::default();
        }
        let username = normalize_username(username).to_string();
        let result = self.store.with_conn(|conn| {
            let sessions = query_sessions(
                conn,
                &format!(
                    "SELECT {} FROM voice_activity \
                     WHERE username = ?1 AND join_time <= ?3 \
                       AND (leave_time IS NULL OR leave_time >= ?2) \
                     ORDER BY join_time, id",
                    VoiceSession::COLUMNS
                ),
                vec![
                    Value::Text(username),
                    Value::Text(format_timestamp(&period_start)),
                    Value::Text(format_timestamp(&period_end)),
                ],
            )?;
            let open_until = resolve_open_end(open_end, period_end);
            Ok(summarize(&sessions, period_start, period_end, open_until, end_bound))
        });
        degrade("voice.get_user_voice_metrics", result)
    }

    /// Users ranked by voice seconds in the trailing `days` window ending now.
    pub fn get_top_users_by_voice_time(&self, days: u32, limit: usize) -> Vec<VoiceRanking> {
        let result = self.rank_trailing(days, limit, |s| s.username.clone());
        degrade("voice.get_top_users_by_voice_time", result)
    }

    /// Channels ranked by voice seconds in the trailing `days` window ending now.
    pub fn get_top_channels_by_voice_time(&self, days: u32, limit: usize) -> Vec<VoiceRanking> {
        let result = self.rank_trailing(days, limit, |s| s.channel_id.clone());
        degrade("voice.get_top_channels_by_voice_time", result)
    }

    /// Distinct users with any voice time in the trailing window.
    pub fn active_voice_users(&self, days: u32) -> u64 {
        let result = self.rank_trailing(days, usize::MAX, |s| s.username.clone());
        degrade("voice.active_voice_users", result.map(|rows| rows.len() as u64))
    }

    /// Summed voice seconds across all users in the trailing window.
    pub fn total_voice_seconds(&self, days: u32) -> i64 {
        let result = self.rank_trailing(days, usize::MAX, |s| s.username.clone());
        degrade(
            "voice.total_voice_seconds",
            result.map(|rows| rows.iter().map(|r| r.total_seconds).sum()),
        )
    }

    fn rank_trailing<F>(&self, days: u32, limit: usize, key: F) -> Result<Vec<VoiceRanking>>
    where
        F: Fn(&VoiceSession) -> String,
    {
        let end = now();
        let start = window_start(end, days);
        let sessions = self.store.with_conn(|conn| {
            let mut sql = format!(
                "SELECT {} FROM voice_activity WHERE join_time <= ?",
                VoiceSession::COLUMNS
            );
            let mut values = vec![Value::Text(format_timestamp(&end))];
            if let Some(start) = start {
                sql.push_str(" AND (leave_time IS NULL OR leave_time >= ?)");
                values.push(Value::Text(format_timestamp(&start)));
            }
            sql.push_str(" ORDER BY join_time, id");
            query_sessions(conn, &sql, values)
        })?;

        let window_start = start.unwrap_or(NaiveDateTime::MIN);
        Ok(rank_sessions(&sessions, window_start, end, end, key, limit))
    }
}

/// Whether an event stamped exactly at the window end falls inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndBound {
    Closed,
    Open,
}

fn resolve_open_end(policy: OpenSessionEnd, period_end: NaiveDateTime) -> NaiveDateTime {
    match policy {
        OpenSessionEnd::PeriodEnd => period_end,
        OpenSessionEnd::Now => now().min(period_end),
    }
}

/// Seconds of `[join, leave)` inside `[start, end]`, floored at zero.
pub(crate) fn clamped_seconds(
    join: NaiveDateTime,
    leave: NaiveDateTime,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> i64 {
    let from = join.max(start);
    let to = leave.min(end);
    (to - from).num_seconds().max(0)
}

/// Fold sessions into per-user metrics. `open_until` stands in for a missing leave.
pub(crate) fn summarize(
    sessions: &[VoiceSession],
    start: NaiveDateTime,
    end: NaiveDateTime,
    open_until: NaiveDateTime,
    end_bound: EndBound,
) -> VoiceMetrics {
    let in_window = |ts: NaiveDateTime| {
        ts >= start
            && match end_bound {
                EndBound::Closed => ts <= end,
                EndBound::Open => ts < end,
            }
    };
    let mut metrics = VoiceMetrics::default();

    for session in sessions {
        if in_window(session.join_time) {
            metrics.joins += 1;
        }
        if session.leave_time.is_some_and(in_window) {
            metrics.leaves += 1;
        }

        let leave = session.leave_time.unwrap_or(open_until);
        let seconds = clamped_seconds(session.join_time, leave, start, end);
        if seconds > 0 {
            metrics.total_seconds += seconds;
            metrics.longest_seconds = metrics.longest_seconds.max(seconds);
        }
    }
    metrics
}

/// Group sessions by `key`, sum intersected seconds and count contributing sessions.
fn rank_sessions<F>(
    sessions: &[VoiceSession],
    start: NaiveDateTime,
    end: NaiveDateTime,
    open_until: NaiveDateTime,
    key: F,
    limit: usize,
) -> Vec<VoiceRanking>
where
    F: Fn(&VoiceSession) -> String,
{
    let mut totals: HashMap<String, (i64, u64)> = HashMap::new();
    for session in sessions {
        let leave = session.leave_time.unwrap_or(open_until);
        let seconds = clamped_seconds(session.join_time, leave, start, end);
        if seconds <= 0 {
            continue;
        }
        let entry = totals.entry(key(session)).or_insert((0, 0));
        entry.0 += seconds;
        entry.1 += 1;
    }

    let mut ranked: Vec<VoiceRanking> = totals
        .into_iter()
        .map(|(key, (total_seconds, session_count))| VoiceRanking {
            key,
            total_seconds,
            session_count,
        })
        .collect();
    ranked.sort_by(|a, b| b.total_seconds.cmp(&a.total_seconds).then_with(|| a.key.cmp(&b.key)));
    ranked.truncate(limit);
    ranked
}

fn query_sessions(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<VoiceSession>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), VoiceSession::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
