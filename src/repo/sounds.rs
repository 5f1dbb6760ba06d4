//! Sound storage, guild-scoped lookup and approximate search.
//!
//! Guild rule: a row owned by guild `G` shadows a global row (`guild_id IS
//! NULL`) with the same filename, but only for callers asking on behalf of
//! `G`. Rows owned by any other guild are invisible to `G`.

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::fuzzy;
use super::types::{NewSound, ScoredSound, Sound, SoundRef, SoundSort, SoundUpdate};
use super::{degrade, format_timestamp, now};
use crate::db::Store;

/// Upper bound on rows scored per search.
pub const SEARCH_CANDIDATE_LIMIT: usize = 150;

#[derive(Debug, Clone)]
pub struct SoundRepository {
    store: Store,
}

impl SoundRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Record a newly ingested sound. Returns the new id.
    pub fn insert_sound(
        &self,
        original_filename: &str,
        filename: &str,
        guild_id: Option<i64>,
    ) -> Option<i64> {
        self.insert(&NewSound {
            original_filename: original_filename.to_string(),
            filename: filename.to_string(),
            guild_id,
            ..NewSound::default()
        })
    }

    pub fn insert(&self, sound: &NewSound) -> Option<i64> {
        let result = self.store.with_conn(|conn| {
            let ts = sound.download_timestamp.unwrap_or_else(now);
            conn.execute(
                "INSERT INTO sounds (originalfilename, filename, favorite, blacklist, slap, is_elevenlabs, timestamp, guild_id) \
                 VALUES (?1, ?2, 0, 0, 0, ?3, ?4, ?5)",
                params![
                    sound.original_filename,
                    sound.filename,
                    sound.is_elevenlabs,
                    format_timestamp(&ts),
                    sound.guild_id,
                ],
            )
            .context("insert sound")?;
            let id = conn.last_insert_rowid();
            tracing::debug!(id, filename = %sound.filename, guild_id = ?sound.guild_id, "sound inserted");
            Ok(Some(id))
        });
        degrade("sounds.insert", result)
    }

    pub fn get_by_id(&self, id: i64) -> Option<Sound> {
        let result = self.store.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM sounds WHERE id = ?1", Sound::COLUMNS),
                    params![id],
                    Sound::from_row,
                )
                .optional()?)
        });
        degrade("sounds.get_by_id", result)
    }

    /// Resolve a filename for `guild_id`, preferring the guild's own row over the global one.
    pub fn get_by_filename(&self, filename: &str, guild_id: Option<i64>) -> Option<Sound> {
        let result = self
            .store
            .with_conn(|conn| query_by_filename(conn, filename, guild_id));
        degrade("sounds.get_by_filename", result)
    }

    pub fn get_by_original_filename(&self, original_filename: &str) -> Option<Sound> {
        let result = self.store.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM sounds WHERE originalfilename = ?1 ORDER BY id LIMIT 1",
                        Sound::COLUMNS
                    ),
                    params![original_filename],
                    Sound::from_row,
                )
                .optional()?)
        });
        degrade("sounds.get_by_original_filename", result)
    }

    /// List sounds visible to `guild_id` (all sounds when `None`).
    pub fn get_all(&self, limit: usize, sort: SoundSort, guild_id: Option<i64>) -> Vec<Sound> {
        let result = self.store.with_conn(|conn| {
            let (scope, mut values) = scope_filter(guild_id);
            values.push(Value::Integer(limit as i64));
            let sql = format!(
                "SELECT {} FROM sounds WHERE {scope} ORDER BY {} LIMIT ?",
                Sound::COLUMNS,
                sort.order_by()
            );
            query_sounds(conn, &sql, values)
        });
        degrade("sounds.get_all", result)
    }

    /// Up to `count` random non-blacklisted sounds visible to `guild_id`.
    pub fn get_random(&self, count: usize, favorite_only: bool, guild_id: Option<i64>) -> Vec<Sound> {
        let result = self.store.with_conn(|conn| {
            let (scope, mut values) = scope_filter(guild_id);
            values.push(Value::Integer(count as i64));
            let favorite = if favorite_only { " AND favorite = 1" } else { "" };
            let sql = format!(
                "SELECT {} FROM sounds WHERE blacklist = 0{favorite} AND {scope} ORDER BY RANDOM() LIMIT ?",
                Sound::COLUMNS
            );
            query_sounds(conn, &sql, values)
        });
        degrade("sounds.get_random", result)
    }

    pub fn get_favorites(&self, guild_id: Option<i64>) -> Vec<Sound> {
        let result = self.store.with_conn(|conn| {
            let (scope, values) = scope_filter(guild_id);
            let sql = format!(
                "SELECT {} FROM sounds WHERE favorite = 1 AND {scope} ORDER BY filename COLLATE NOCASE, id",
                Sound::COLUMNS
            );
            query_sounds(conn, &sql, values)
        });
        degrade("sounds.get_favorites", result)
    }

    /// Number of non-blacklisted sounds visible to `guild_id`.
    pub fn count(&self, guild_id: Option<i64>) -> u64 {
        let result = self.store.with_conn(|conn| {
            let (scope, values) = scope_filter(guild_id);
            let n: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM sounds WHERE blacklist = 0 AND {scope}"),
                params_from_iter(values),
                |row| row.get(0),
            )?;
            Ok(n as u64)
        });
        degrade("sounds.count", result)
    }

    /// Apply a partial update. Returns `false` when nothing matched or nothing was requested.
    pub fn update(&self, target: &SoundRef, update: &SoundUpdate) -> bool {
        if update.is_empty() {
            return false;
        }
        let result = self.store.with_tx(|tx| {
            let id = match target {
                SoundRef::Id(id) => *id,
                SoundRef::Filename { name, guild_id } => {
                    match query_by_filename(tx, name, *guild_id)? {
                        Some(sound) => sound.id,
                        None => return Ok(false),
                    }
                }
            };

            let mut sets = Vec::new();
            let mut values = Vec::new();
            if let Some(ref name) = update.rename {
                sets.push("filename = ?");
                values.push(Value::Text(name.clone()));
            }
            for (column, flag) in [
                ("favorite = ?", update.favorite),
                ("blacklist = ?", update.blacklist),
                ("slap = ?", update.slap),
            ] {
                if let Some(flag) = flag {
                    sets.push(column);
                    values.push(Value::Integer(i64::from(flag)));
                }
            }
            values.push(Value::Integer(id));

            let sql = format!("UPDATE sounds SET {} WHERE id = ?", sets.join(", "));
            let changed = tx.execute(&sql, params_from_iter(values))?;
            tracing::debug!(id, changed, "sound updated");
            Ok(changed > 0)
        });
        degrade("sounds.update", result)
    }

    /// Flip the favorite flag in one statement. Returns the new value.
    pub fn toggle_favorite(&self, id: i64) -> Option<bool> {
        degrade("sounds.toggle_favorite", self.toggle_flag(id, "favorite"))
    }

    /// Flip the blacklist flag in one statement. Returns the new value.
    pub fn toggle_blacklist(&self, id: i64) -> Option<bool> {
        degrade("sounds.toggle_blacklist", self.toggle_flag(id, "blacklist"))
    }

    fn toggle_flag(&self, id: i64, column: &'static str) -> Result<Option<bool>> {
        self.store.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("UPDATE sounds SET {column} = NOT {column} WHERE id = ?1 RETURNING {column}"),
                    params![id],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub fn delete(&self, id: i64) -> bool {
        let result = self.store.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM sounds WHERE id = ?1", params![id])?;
            if removed > 0 {
                tracing::info!(id, "sound deleted");
            }
            Ok(removed > 0)
        });
        degrade("sounds.delete", result)
    }

    /// Rank non-blacklisted sounds by similarity to `query`, best first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<ScoredSound> {
        degrade("sounds.search", self.run_search(query, limit, None))
    }

    /// [`Self::search`] restricted to what `guild_id` can see.
    pub fn search_scoped(&self, query: &str, limit: usize, guild_id: i64) -> Vec<ScoredSound> {
        degrade("sounds.search_scoped", self.run_search(query, limit, Some(guild_id)))
    }

    fn run_search(&self, query: &str, limit: usize, guild_id: Option<i64>) -> Result<Vec<ScoredSound>> {
        let query = query.trim();
        let normalized_query = fuzzy::normalize(query);
        if normalized_query.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let candidates = self
            .store
            .with_conn(|conn| fetch_candidates(conn, query, guild_id))?;

        let mut scored: Vec<ScoredSound> = candidates
            .into_iter()
            .map(|sound| {
                let score = fuzzy::combined_score(&normalized_query, &fuzzy::normalize(&sound.filename));
                ScoredSound { sound, score }
            })
            .collect();

        // stable: equal scores keep candidate order
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        tracing::debug!(query, results = scored.len(), "sound search");
        Ok(scored)
    }
}

/// Guild-rule lookup shared by reads and filename-addressed updates.
fn query_by_filename(conn: &Connection, filename: &str, guild_id: Option<i64>) -> Result<Option<Sound>> {
    let sound = match guild_id {
        Some(g) => conn
            .query_row(
                &format!(
                    "SELECT {} FROM sounds \
                     WHERE filename = ?1 AND (guild_id = ?2 OR guild_id IS NULL) \
                     ORDER BY guild_id IS NULL, id LIMIT 1",
                    Sound::COLUMNS
                ),
                params![filename, g],
                Sound::from_row,
            )
            .optional()?,
        None => conn
            .query_row(
                &format!(
                    "SELECT {} FROM sounds WHERE filename = ?1 AND guild_id IS NULL ORDER BY id LIMIT 1",
                    Sound::COLUMNS
                ),
                params![filename],
                Sound::from_row,
            )
            .optional()?,
    };
    Ok(sound)
}

/// WHERE fragment selecting the rows `guild_id` can see. `None` is unscoped.
fn scope_filter(guild_id: Option<i64>) -> (&'static str, Vec<Value>) {
    match guild_id {
        Some(g) => (
            "(guild_id = ? OR (guild_id IS NULL AND filename NOT IN \
             (SELECT filename FROM sounds WHERE guild_id = ?)))",
            vec![Value::Integer(g), Value::Integer(g)],
        ),
        None => ("1 = 1", Vec::new()),
    }
}

fn query_sounds(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<Sound>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), Sound::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Substring pre-filter, falling back to the first rows when nothing matches.
fn fetch_candidates(conn: &Connection, query: &str, guild_id: Option<i64>) -> Result<Vec<Sound>> {
    let (scope_sql, scope_values) = scope_filter(guild_id);

    let mut values = vec![Value::Text(format!("%{}%", escape_like(query)))];
    values.extend(scope_values.iter().cloned());
    values.push(Value::Integer(SEARCH_CANDIDATE_LIMIT as i64));
    let filtered = query_sounds(
        conn,
        &format!(
            "SELECT {} FROM sounds WHERE blacklist = 0 AND filename LIKE ? ESCAPE '\\' AND {scope_sql} \
             ORDER BY id LIMIT ?",
            Sound::COLUMNS
        ),
        values,
    )?;
    if !filtered.is_empty() {
        return Ok(filtered);
    }

    let mut values = scope_values;
    values.push(Value::Integer(SEARCH_CANDIDATE_LIMIT as i64));
    query_sounds(
        conn,
        &format!(
            "SELECT {} FROM sounds WHERE blacklist = 0 AND {scope_sql} ORDER BY id LIMIT ?",
            Sound::COLUMNS
        ),
        values,
    )
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::test_support::test_store;

    #[test]
    fn insert_and_get_by_id() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        let id = repo.insert_sound("orig.mp3", "sound1.mp3", None).unwrap();

        let sound = repo.get_by_id(id).unwrap();
        assert_eq!(sound.filename, "sound1.mp3");
        assert_eq!(sound.original_filename, "orig.mp3");
        assert!(!sound.favorite && !sound.blacklist && !sound.slap && !sound.is_elevenlabs);
        assert!(sound.guild_id.is_none());
    }

    #[test]
    fn missing_id_is_none() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        assert!(repo.get_by_id(999).is_none());
        assert!(repo.get_by_filename("nope.mp3", Some(1)).is_none());
    }

    #[test]
    fn guild_row_shadows_global_row() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        let global = repo.insert_sound("a.mp3", "airhorn.mp3", None).unwrap();
        let local = repo.insert_sound("a.mp3", "airhorn.mp3", Some(10)).unwrap();

        assert_eq!(repo.get_by_filename("airhorn.mp3", Some(10)).unwrap().id, local);
        assert_eq!(repo.get_by_filename("airhorn.mp3", Some(11)).unwrap().id, global);
        assert_eq!(repo.get_by_filename("airhorn.mp3", None).unwrap().id, global);
    }

    #[test]
    fn other_guilds_rows_are_invisible() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        repo.insert_sound("x.mp3", "private.mp3", Some(10)).unwrap();

        assert!(repo.get_by_filename("private.mp3", Some(11)).is_none());
        assert!(repo.get_by_filename("private.mp3", None).is_none());
    }

    #[test]
    fn listing_returns_guild_union_global_with_shadowing() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        let shared = repo.insert_sound("s.mp3", "shared.mp3", None).unwrap();
        repo.insert_sound("d.mp3", "dup.mp3", None).unwrap();
        let dup_local = repo.insert_sound("d.mp3", "dup.mp3", Some(10)).unwrap();
        repo.insert_sound("o.mp3", "other.mp3", Some(11)).unwrap();

        let ids: Vec<i64> = repo
            .get_all(100, SoundSort::Oldest, Some(10))
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![shared, dup_local]);

        assert_eq!(repo.get_all(100, SoundSort::Oldest, None).len(), 4);
    }

    #[test]
    fn get_all_respects_sort_and_limit() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        repo.insert_sound("b", "bravo.mp3", None).unwrap();
        repo.insert_sound("a", "alpha.mp3", None).unwrap();
        repo.insert_sound("c", "charlie.mp3", None).unwrap();

        let names: Vec<String> = repo
            .get_all(2, SoundSort::Filename, None)
            .into_iter()
            .map(|s| s.filename)
            .collect();
        assert_eq!(names, vec!["alpha.mp3", "bravo.mp3"]);
    }

    #[test]
    fn favorites_and_random_favorites() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        let s1 = repo.insert_sound("1", "sound1.mp3", None).unwrap();
        repo.insert_sound("2", "sound2.mp3", None).unwrap();
        repo.update(&SoundRef::Id(s1), &SoundUpdate { favorite: Some(true), ..Default::default() });

        let favs: Vec<String> = repo.get_favorites(None).into_iter().map(|s| s.filename).collect();
        assert_eq!(favs, vec!["sound1.mp3"]);

        for _ in 0..10 {
            let picked = repo.get_random(1, true, None);
            assert_eq!(picked.len(), 1);
            assert_eq!(picked[0].filename, "sound1.mp3");
        }
    }

    #[test]
    fn random_never_returns_blacklisted() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        let bad = repo.insert_sound("b", "bad.mp3", None).unwrap();
        repo.insert_sound("g", "good.mp3", None).unwrap();
        repo.update(&SoundRef::Id(bad), &SoundUpdate { blacklist: Some(true), ..Default::default() });

        let picked = repo.get_random(10, false, None);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].filename, "good.mp3");
        assert_eq!(repo.count(None), 1);
    }

    #[test]
    fn update_by_filename_resolves_guild_row() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        let global = repo.insert_sound("a", "clip.mp3", None).unwrap();
        let local = repo.insert_sound("a", "clip.mp3", Some(5)).unwrap();

        let renamed = repo.update(
            &SoundRef::Filename { name: "clip.mp3".into(), guild_id: Some(5) },
            &SoundUpdate { rename: Some("clip2.mp3".into()), slap: Some(true), ..Default::default() },
        );
        assert!(renamed);

        let local = repo.get_by_id(local).unwrap();
        assert_eq!(local.filename, "clip2.mp3");
        assert!(local.slap);
        assert_eq!(repo.get_by_id(global).unwrap().filename, "clip.mp3");
    }

    #[test]
    fn update_nothing_or_missing_is_false() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        let id = repo.insert_sound("a", "a.mp3", None).unwrap();
        assert!(!repo.update(&SoundRef::Id(id), &SoundUpdate::default()));
        assert!(!repo.update(&SoundRef::Id(9999), &SoundUpdate { favorite: Some(true), ..Default::default() }));
        assert!(!repo.update(
            &SoundRef::Filename { name: "zzz.mp3".into(), guild_id: None },
            &SoundUpdate { favorite: Some(true), ..Default::default() },
        ));
    }

    #[test]
    fn toggles_flip_in_place() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        let id = repo.insert_sound("a", "a.mp3", None).unwrap();

        assert_eq!(repo.toggle_favorite(id), Some(true));
        assert_eq!(repo.toggle_favorite(id), Some(false));
        assert_eq!(repo.toggle_blacklist(id), Some(true));
        assert_eq!(repo.toggle_favorite(404), None);
    }

    #[test]
    fn delete_removes_row() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        let id = repo.insert_sound("a", "a.mp3", None).unwrap();
        assert!(repo.delete(id));
        assert!(!repo.delete(id));
        assert!(repo.get_by_id(id).is_none());
    }

    #[test]
    fn search_ranks_closest_first_and_skips_blacklist() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        repo.insert_sound("1", "big moan.mp3", None).unwrap();
        repo.insert_sound("2", "tiny moan remix.mp3", None).unwrap();
        repo.insert_sound("3", "airhorn.mp3", None).unwrap();
        let hidden = repo.insert_sound("4", "moan.mp3", None).unwrap();
        repo.update(&SoundRef::Id(hidden), &SoundUpdate { blacklist: Some(true), ..Default::default() });

        let results = repo.search("big moan", 10);
        assert!(!results.is_empty());
        assert_eq!(results[0].sound.filename, "big moan.mp3");
        assert!(results.iter().all(|r| r.sound.id != hidden));
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn search_matches_leetspeak_through_fallback() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        repo.insert_sound("1", "leet.mp3", None).unwrap();
        repo.insert_sound("2", "zebra.mp3", None).unwrap();

        // "l33t" is not a substring of any filename, so scoring runs on the fallback set
        let results = repo.search("l33t", 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sound.filename, "leet.mp3");
    }

    #[test]
    fn search_ties_keep_candidate_order() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        let first = repo.insert_sound("1", "echo.mp3", None).unwrap();
        let second = repo.insert_sound("2", "echo.mp3", Some(3)).unwrap();

        let results = repo.search("echo", 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].score, results[1].score);
        assert_eq!(results[0].sound.id, first);
        assert_eq!(results[1].sound.id, second);
    }

    #[test]
    fn search_empty_query_is_empty() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        repo.insert_sound("1", "anything.mp3", None).unwrap();
        assert!(repo.search("   ", 5).is_empty());
        assert!(repo.search("anything", 0).is_empty());
    }

    #[test]
    fn scoped_search_hides_other_guilds() {
        let (_tmp, store) = test_store();
        let repo = SoundRepository::new(store);
        repo.insert_sound("1", "secret bell.mp3", Some(1)).unwrap();
        repo.insert_sound("2", "bell.mp3", None).unwrap();

        let results = repo.search_scoped("bell", 10, 2);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sound.filename, "bell.mp3");
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("100%_a\\b"), "100\\%\\_a\\\\b");
    }
}
