//! Typed records for every stored entity.
//!
//! Each record has exactly one mapping from a raw row (`from_row`) paired with
//! the column list it expects, so no positional tuple ever leaves a repository.

use chrono::NaiveDateTime;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use super::{opt_ts_column, ts_column};

/// A stored media entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sound {
    pub id: i64,
    /// Name the file had when it was ingested.
    pub original_filename: String,
    /// Display and storage name; changes on rename.
    pub filename: String,
    pub favorite: bool,
    /// Moderated out: never played at random, never searched.
    pub blacklist: bool,
    /// Joke/effect sound excluded from leaderboards.
    pub slap: bool,
    /// Produced by text-to-speech synthesis rather than scraped or uploaded.
    pub is_elevenlabs: bool,
    pub download_timestamp: NaiveDateTime,
    /// Owning guild. `None` means shared by every guild.
    pub guild_id: Option<i64>,
}

impl Sound {
    pub(crate) const COLUMNS: &'static str =
        "id, originalfilename, filename, favorite, blacklist, slap, is_elevenlabs, timestamp, guild_id";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            original_filename: row.get(1)?,
            filename: row.get(2)?,
            favorite: row.get(3)?,
            blacklist: row.get(4)?,
            slap: row.get(5)?,
            is_elevenlabs: row.get(6)?,
            download_timestamp: ts_column(row, 7)?,
            guild_id: row.get(8)?,
        })
    }
}

/// Input for [`super::sounds::SoundRepository::insert`].
#[derive(Debug, Clone, Default)]
pub struct NewSound {
    pub original_filename: String,
    pub filename: String,
    pub guild_id: Option<i64>,
    pub is_elevenlabs: bool,
    /// Defaults to the current time.
    pub download_timestamp: Option<NaiveDateTime>,
}

/// Partial update of a sound. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SoundUpdate {
    pub rename: Option<String>,
    pub favorite: Option<bool>,
    pub blacklist: Option<bool>,
    pub slap: Option<bool>,
}

impl SoundUpdate {
    pub fn is_empty(&self) -> bool {
        self.rename.is_none()
            && self.favorite.is_none()
            && self.blacklist.is_none()
            && self.slap.is_none()
    }
}

/// How a caller addresses a sound for mutation.
#[derive(Debug, Clone)]
pub enum SoundRef {
    Id(i64),
    /// Resolved through the guild rule before mutating.
    Filename { name: String, guild_id: Option<i64> },
}

/// Ordering for sound listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundSort {
    #[default]
    Newest,
    Oldest,
    Filename,
}

impl SoundSort {
    pub(crate) fn order_by(&self) -> &'static str {
        match self {
            Self::Newest => "timestamp DESC, id DESC",
            Self::Oldest => "timestamp ASC, id ASC",
            Self::Filename => "filename COLLATE NOCASE ASC, id ASC",
        }
    }
}

impl std::str::FromStr for SoundSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "filename" | "name" => Ok(Self::Filename),
            _ => Err(format!("unknown sort order: {s}")),
        }
    }
}

/// A search hit with its combined similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredSound {
    pub sound: Sound,
    pub score: f64,
}

/// An append-only log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: i64,
    /// Stored without any `#discriminator` suffix.
    pub username: String,
    pub action: String,
    /// Sound id, list id or an opaque marker, depending on `action`.
    pub target: String,
    pub timestamp: NaiveDateTime,
    pub guild_id: Option<i64>,
}

impl Action {
    pub(crate) const COLUMNS: &'static str = "id, username, action, target, timestamp, guild_id";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            action: row.get(2)?,
            target: row.get(3)?,
            timestamp: ts_column(row, 4)?,
            guild_id: row.get(5)?,
        })
    }
}

/// A user's presence interval in a voice channel. Open while `leave_time` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSession {
    pub id: i64,
    pub username: String,
    pub channel_id: String,
    pub join_time: NaiveDateTime,
    pub leave_time: Option<NaiveDateTime>,
}

impl VoiceSession {
    pub(crate) const COLUMNS: &'static str = "id, username, channel_id, join_time, leave_time";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            channel_id: row.get(2)?,
            join_time: ts_column(row, 3)?,
            leave_time: opt_ts_column(row, 4)?,
        })
    }

    pub fn is_open(&self) -> bool {
        self.leave_time.is_none()
    }
}

/// Where an open session's interval ends when measured against a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenSessionEnd {
    /// Open sessions run to the end of the reporting window.
    #[default]
    PeriodEnd,
    /// Open sessions run to the current time (still clamped to the window).
    Now,
}

/// Per-user voice totals over a reporting window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VoiceMetrics {
    pub joins: u64,
    pub leaves: u64,
    pub total_seconds: i64,
    pub longest_seconds: i64,
}

/// One row of a voice-time leaderboard (user or channel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoiceRanking {
    pub key: String,
    pub total_seconds: i64,
    pub session_count: u64,
}

/// One row of a play-count leaderboard by user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedUser {
    pub username: String,
    pub count: u64,
}

/// One row of a play-count leaderboard by sound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedSound {
    pub sound_id: i64,
    pub filename: String,
    pub count: u64,
}

/// A named count, used for per-action tallies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: u64,
}

/// A creator-owned named collection of sound filenames.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoundList {
    pub id: i64,
    pub list_name: String,
    pub creator: String,
    pub created_at: NaiveDateTime,
    pub item_count: u64,
}

impl SoundList {
    /// Expects the base columns followed by an item count.
    pub(crate) const COLUMNS: &'static str = "l.id, l.list_name, l.creator, l.created_at, \
         (SELECT COUNT(*) FROM sound_list_items i WHERE i.list_id = l.id)";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            list_name: row.get(1)?,
            creator: row.get(2)?,
            created_at: ts_column(row, 3)?,
            item_count: row.get::<_, i64>(4)? as u64,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoundListItem {
    pub id: i64,
    pub list_id: i64,
    pub sound_filename: String,
    pub added_at: NaiveDateTime,
}

impl SoundListItem {
    pub(crate) const COLUMNS: &'static str = "id, list_id, sound_filename, added_at";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            list_id: row.get(1)?,
            sound_filename: row.get(2)?,
            added_at: ts_column(row, 3)?,
        })
    }
}

/// A trigger word and what it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub keyword: String,
    pub action_type: String,
    pub action_value: String,
}

impl Keyword {
    pub(crate) const COLUMNS: &'static str = "keyword, action_type, action_value";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            keyword: row.get(0)?,
            action_type: row.get(1)?,
            action_value: row.get(2)?,
        })
    }
}

/// A sound a user has attached to one of their events (e.g. `join`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserEvent {
    pub user_id: String,
    pub event: String,
    pub sound: String,
}

impl UserEvent {
    pub(crate) const COLUMNS: &'static str = "id, event, sound";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            event: row.get(1)?,
            sound: row.get(2)?,
        })
    }
}
