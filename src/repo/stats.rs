//! Reports composed from the sound, action and voice repositories.

use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

use super::actions::{normalize_username, since_clause, ActionRepository, FAVORITE_ACTION, PLAY_ACTIONS};
use super::sounds::SoundRepository;
use super::types::{OpenSessionEnd, RankedSound, RankedUser, TagCount, VoiceRanking};
use super::voice::VoiceActivityRepository;
use super::{degrade, now, window_start};
use crate::db::Store;

/// Rows kept in the per-user top lists of a year digest.
pub const YEAR_TOP_N: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryStats {
    pub days: u32,
    pub total_sounds: u64,
    pub total_plays: u64,
    pub active_users: u64,
    pub active_voice_users: u64,
    pub total_voice_hours: f64,
}

/// Action count for one (weekday, hour) cell. `day_of_week` is 0 for Sunday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeatmapCell {
    pub day_of_week: u8,
    pub hour: u8,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelinePoint {
    pub date: NaiveDate,
    pub count: u64,
}

/// Annual digest for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserYearStats {
    pub username: String,
    pub year: i32,
    pub voice_joins: u64,
    pub voice_leaves: u64,
    pub total_voice_hours: f64,
    pub longest_session_minutes: i64,
    pub longest_session_hours: f64,
    pub total_plays: u64,
    pub favorites_added: u64,
    pub top_actions: Vec<TagCount>,
    pub top_sounds: Vec<RankedSound>,
    pub most_active_day: Option<TagCount>,
}

#[derive(Debug, Clone)]
pub struct StatsRepository {
    store: Store,
    sounds: SoundRepository,
    actions: ActionRepository,
    voice: VoiceActivityRepository,
}

impl StatsRepository {
    pub fn new(store: Store) -> Self {
        Self {
            sounds: SoundRepository::new(store.clone()),
            actions: ActionRepository::new(store.clone()),
            voice: VoiceActivityRepository::new(store.clone()),
            store,
        }
    }

    pub fn get_summary_stats(&self, days: u32) -> SummaryStats {
        SummaryStats {
            days,
            total_sounds: self.sounds.count(None),
            total_plays: self.actions.total_plays(days),
            active_users: self.actions.active_users(days),
            active_voice_users: self.voice.active_voice_users(days),
            total_voice_hours: seconds_to_hours(self.voice.total_voice_seconds(days)),
        }
    }

    /// Every action bucketed by weekday and hour; empty cells are omitted.
    pub fn get_activity_heatmap(&self, days: u32) -> Vec<HeatmapCell> {
        let since = window_start(now(), days);
        let result = self.store.with_conn(|conn| {
            let (clause, values) = since_clause("timestamp", since);
            let sql = format!(
                "SELECT CAST(strftime('%w', timestamp) AS INTEGER) AS dow, \
                        CAST(strftime('%H', timestamp) AS INTEGER) AS hour, \
                        COUNT(*) \
                 FROM actions WHERE {clause} GROUP BY dow, hour ORDER BY dow, hour"
            );
            heatmap_rows(conn, &sql, values)
        });
        degrade("stats.get_activity_heatmap", result)
    }

    /// Every action bucketed by calendar day, oldest first.
    pub fn get_activity_timeline(&self, days: u32) -> Vec<TimelinePoint> {
        let since = window_start(now(), days);
        let result = self.store.with_conn(|conn| {
            let (clause, values) = since_clause("timestamp", since);
            let sql = format!(
                "SELECT date(timestamp) AS day, COUNT(*) FROM actions WHERE {clause} \
                 GROUP BY day ORDER BY day"
            );
            timeline_rows(conn, &sql, values)
        });
        degrade("stats.get_activity_timeline", result)
    }

    /// Digest over `[Jan 1 year, Jan 1 year+1)`. Sessions still open count up to now.
    pub fn get_user_year_stats(&self, username: &str, year: i32) -> UserYearStats {
        let bounds = year.checked_add(1).and_then(|next| Some((year_start(year)?, year_start(next)?)));
        let Some((start, end)) = bounds else {
            tracing::warn!(year, "year out of range");
            return UserYearStats::default();
        };

        let voice = self.voice.user_metrics_in_range(username, start, end, OpenSessionEnd::Now);
        let action_counts = self.actions.user_action_counts(username, start, end);

        let total_plays = action_counts
            .iter()
            .filter(|t| PLAY_ACTIONS.contains(&t.tag.as_str()))
            .map(|t| t.count)
            .sum();
        let favorites_added = action_counts
            .iter()
            .find(|t| t.tag == FAVORITE_ACTION)
            .map_or(0, |t| t.count);

        let mut top_actions = action_counts;
        top_actions.truncate(YEAR_TOP_N);

        UserYearStats {
            username: normalize_username(username).to_string(),
            year,
            voice_joins: voice.joins,
            voice_leaves: voice.leaves,
            total_voice_hours: seconds_to_hours(voice.total_seconds),
            longest_session_minutes: voice.longest_seconds / 60,
            longest_session_hours: seconds_to_hours(voice.longest_seconds),
            total_plays,
            favorites_added,
            top_actions,
            top_sounds: self.actions.user_top_sounds(username, start, end, YEAR_TOP_N),
            most_active_day: self.actions.user_most_active_day(username, start, end),
        }
    }

    pub fn get_users_who_favorited_sound(&self, sound_id: i64) -> Vec<String> {
        self.actions.get_users_who_favorited(sound_id)
    }

    pub fn get_sound_download_date(&self, sound_id: i64) -> Option<NaiveDateTime> {
        self.sounds.get_by_id(sound_id).map(|s| s.download_timestamp)
    }

    pub fn top_users(&self, days: u32, limit: usize) -> (Vec<RankedUser>, u64) {
        self.actions.get_top_users(days, limit)
    }

    pub fn top_sounds(&self, days: u32, limit: usize) -> (Vec<RankedSound>, u64) {
        self.actions.get_top_sounds(days, limit)
    }

    pub fn top_voice_users(&self, days: u32, limit: usize) -> Vec<VoiceRanking> {
        self.voice.get_top_users_by_voice_time(days, limit)
    }

    pub fn top_voice_channels(&self, days: u32, limit: usize) -> Vec<VoiceRanking> {
        self.voice.get_top_channels_by_voice_time(days, limit)
    }

    pub fn sounds_on_this_day(&self, months_ago: u32, limit: usize) -> Vec<RankedSound> {
        self.actions.get_sounds_on_this_day(months_ago, limit)
    }
}

fn year_start(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1).map(|d| d.and_time(NaiveTime::MIN))
}

/// Hours rounded to two decimals.
fn seconds_to_hours(seconds: i64) -> f64 {
    (seconds as f64 / 36.0).round() / 100.0
}

fn heatmap_rows(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<HeatmapCell>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            Ok(HeatmapCell {
                day_of_week: row.get(0)?,
                hour: row.get(1)?,
                count: row.get::<_, i64>(2)? as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn timeline_rows(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<TimelinePoint>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            let day: String = row.get(0)?;
            let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d").map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
            })?;
            Ok(TimelinePoint {
                date,
                count: row.get::<_, i64>(1)? as u64,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::parse_timestamp;
    use crate::repo::test_support::test_store;
    use chrono::{Datelike, Duration};

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn summary_merges_every_source() {
        let (_tmp, store) = test_store();
        let sounds = SoundRepository::new(store.clone());
        let actions = ActionRepository::new(store.clone());
        let voice = VoiceActivityRepository::new(store.clone());

        let a = sounds.insert_sound("a.mp3", "a.mp3", None).unwrap();
        sounds.insert_sound("b.mp3", "b.mp3", None).unwrap();
        actions.insert("alice", "play_request", &a.to_string(), None);
        actions.insert("bob#1234", "play_random_sound", &a.to_string(), None);
        actions.insert("carol", "favorite_sound", &a.to_string(), None);

        let joined = now() - Duration::hours(3);
        voice.log_join("alice", "1", joined);
        voice.log_leave("alice", "1", joined + Duration::minutes(90));

        let summary = StatsRepository::new(store).get_summary_stats(7);
        assert_eq!(summary.total_sounds, 2);
        assert_eq!(summary.total_plays, 2);
        assert_eq!(summary.active_users, 3);
        assert_eq!(summary.active_voice_users, 1);
        assert!((summary.total_voice_hours - 1.5).abs() < 1e-9);
    }

    #[test]
    fn heatmap_and_timeline_bucket_actions() {
        let (_tmp, store) = test_store();
        let actions = ActionRepository::new(store.clone());
        let base = (now() - Duration::days(2)).date().and_hms_opt(14, 5, 0).unwrap();
        actions.insert_at("a", "play_request", "1", None, base);
        actions.insert_at("a", "scrape", "x", None, base + Duration::minutes(10));
        actions.insert_at("b", "play_request", "1", None, base + Duration::days(1));
        // outside the window
        actions.insert_at("b", "play_request", "1", None, base - Duration::days(30));

        let stats = StatsRepository::new(store);

        let heatmap = stats.get_activity_heatmap(7);
        assert_eq!(heatmap.len(), 2);
        let first = heatmap
            .iter()
            .find(|c| u32::from(c.day_of_week) == base.weekday().num_days_from_sunday())
            .unwrap();
        assert_eq!(first.hour, 14);
        assert_eq!(first.count, 2);

        let timeline = stats.get_activity_timeline(7);
        assert_eq!(
            timeline,
            vec![
                TimelinePoint { date: base.date(), count: 2 },
                TimelinePoint { date: base.date() + Duration::days(1), count: 1 },
            ]
        );
        assert_eq!(stats.get_activity_timeline(0).len(), 3);
    }

    #[test]
    fn year_digest_for_one_user() {
        let (_tmp, store) = test_store();
        let sounds = SoundRepository::new(store.clone());
        let actions = ActionRepository::new(store.clone());
        let voice = VoiceActivityRepository::new(store.clone());

        let bell = sounds.insert_sound("bell.mp3", "bell.mp3", None).unwrap();
        let horn = sounds.insert_sound("horn.mp3", "horn.mp3", None).unwrap();

        for day in ["2025-03-01 10:00:00", "2025-03-01 11:00:00", "2025-06-01 09:00:00"] {
            actions.insert_at("alice", "play_request", &bell.to_string(), None, ts(day));
        }
        actions.insert_at("alice", "play_random_sound", &horn.to_string(), None, ts("2025-03-01 12:00:00"));
        actions.insert_at("alice", "favorite_sound", &bell.to_string(), None, ts("2025-03-02 12:00:00"));
        // other year and other user
        actions.insert_at("alice", "play_request", &horn.to_string(), None, ts("2024-12-31 23:59:59"));
        actions.insert_at("bob", "play_request", &horn.to_string(), None, ts("2025-03-01 10:00:00"));

        voice.log_join("alice", "101", ts("2025-01-01T10:00:00"));
        voice.log_leave("alice", "101", ts("2025-01-01T11:00:00"));
        voice.log_join("alice", "101", ts("2025-02-01T10:00:00"));
        voice.log_leave("alice", "101", ts("2025-02-01T10:30:00"));

        let digest = StatsRepository::new(store).get_user_year_stats("alice", 2025);
        assert_eq!(digest.voice_joins, 2);
        assert_eq!(digest.voice_leaves, 2);
        assert!((digest.total_voice_hours - 1.5).abs() < 1e-9);
        assert_eq!(digest.longest_session_minutes, 60);
        assert!((digest.longest_session_hours - 1.0).abs() < 1e-9);
        assert_eq!(digest.total_plays, 4);
        assert_eq!(digest.favorites_added, 1);
        assert_eq!(digest.top_actions[0], TagCount { tag: "play_request".into(), count: 3 });
        assert_eq!(digest.top_sounds[0].filename, "bell.mp3");
        assert_eq!(digest.top_sounds[0].count, 3);
        assert_eq!(
            digest.most_active_day,
            Some(TagCount { tag: "2025-03-01".into(), count: 3 })
        );
    }

    #[test]
    fn empty_year_is_zeroed() {
        let (_tmp, store) = test_store();
        let digest = StatsRepository::new(store).get_user_year_stats("nobody", 2020);
        assert_eq!(digest.voice_joins, 0);
        assert_eq!(digest.total_plays, 0);
        assert!(digest.top_sounds.is_empty());
        assert!(digest.most_active_day.is_none());
    }

    #[test]
    fn new_year_midnight_belongs_to_the_new_year() {
        let (_tmp, store) = test_store();
        let voice = VoiceActivityRepository::new(store.clone());
        voice.log_join("alice", "101", ts("2024-12-31 23:00:00"));
        voice.log_leave("alice", "101", ts("2025-01-01 00:00:00"));
        voice.log_join("alice", "101", ts("2025-01-01 00:00:00"));
        voice.log_leave("alice", "101", ts("2025-01-01 00:30:00"));

        let stats = StatsRepository::new(store);
        let old = stats.get_user_year_stats("alice", 2024);
        assert_eq!((old.voice_joins, old.voice_leaves), (1, 0));
        assert!((old.total_voice_hours - 1.0).abs() < 1e-9);

        let new = stats.get_user_year_stats("alice", 2025);
        assert_eq!((new.voice_joins, new.voice_leaves), (1, 2));
        assert!((new.total_voice_hours - 0.5).abs() < 1e-9);
    }

    #[test]
    fn open_session_in_current_year_stops_at_now() {
        let (_tmp, store) = test_store();
        let voice = VoiceActivityRepository::new(store.clone());
        let current = now();
        // keep the join inside this calendar year
        let joined = (current - Duration::hours(1)).max(year_start(current.year()).unwrap());
        voice.log_join("alice", "101", joined);

        let digest = StatsRepository::new(store).get_user_year_stats("alice", current.year());
        assert_eq!(digest.voice_joins, 1);
        assert_eq!(digest.voice_leaves, 0);
        assert!(digest.total_voice_hours <= 1.01);
    }

    #[test]
    fn digest_reports_the_normalized_username() {
        let (_tmp, store) = test_store();
        let sounds = SoundRepository::new(store.clone());
        let actions = ActionRepository::new(store.clone());
        let bell = sounds.insert_sound("bell.mp3", "bell.mp3", None).unwrap();
        actions.insert_at("alice", "play_request", &bell.to_string(), None, ts("2025-03-01 10:00:00"));

        let digest = StatsRepository::new(store).get_user_year_stats("alice#1234", 2025);
        assert_eq!(digest.username, "alice");
        assert_eq!(digest.total_plays, 1);
    }

    #[test]
    fn last_representable_year_degrades_to_empty() {
        let (_tmp, store) = test_store();
        let digest = StatsRepository::new(store).get_user_year_stats("alice", i32::MAX);
        assert_eq!(digest, UserYearStats::default());
    }

    #[test]
    fn download_date_pass_through() {
        let (_tmp, store) = test_store();
        let sounds = SoundRepository::new(store.clone());
        let id = sounds.insert_sound("a.mp3", "a.mp3", None).unwrap();
        let stats = StatsRepository::new(store);
        assert!(stats.get_sound_download_date(id).is_some());
        assert!(stats.get_sound_download_date(id + 100).is_none());
    }
}
