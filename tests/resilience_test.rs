mod helpers;

use soundbase::db;
use soundbase::repo::actions::ActionRepository;
use soundbase::repo::now;
use soundbase::repo::sounds::SoundRepository;
use soundbase::repo::stats::StatsRepository;
use soundbase::repo::voice::VoiceActivityRepository;
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("new.db");

    // Should not exist yet
    assert!(!db_path.exists());

    let store = db::Store::open(&db_path).unwrap();

    // Should have been created
    assert!(db_path.exists());
    assert_eq!(helpers::row_count(&store, "sounds"), 0);
}

#[test]
fn health_check_passes_on_valid_db() {
    let (_tmp, store) = helpers::test_store();
    let report = store.health().unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, db::migrations::CURRENT_SCHEMA_VERSION);
    assert_eq!(report.sound_count, 0);
    assert_eq!(report.action_count, 0);
    assert_eq!(report.open_voice_sessions, 0);
}

#[test]
fn repositories_degrade_when_tables_are_missing() {
    let (_tmp, store) = helpers::test_store();
    let sounds = SoundRepository::new(store.clone());
    let actions = ActionRepository::new(store.clone());
    sounds.insert_sound("a.mp3", "a.mp3", None).unwrap();

    store
        .with_conn(|conn| {
            conn.execute_batch("DROP TABLE actions; DROP TABLE sounds;")?;
            Ok(())
        })
        .unwrap();

    assert!(sounds.get_by_id(1).is_none());
    assert!(sounds.search("a", 5).is_empty());
    assert!(sounds.insert_sound("b.mp3", "b.mp3", None).is_none());
    assert_eq!(actions.insert("alice", "play_request", "1", None), None);
    assert_eq!(actions.get_top_users(0, 10), (Vec::new(), 0));

    let summary = StatsRepository::new(store).get_summary_stats(7);
    assert_eq!(summary.total_sounds, 0);
    assert_eq!(summary.total_plays, 0);
}

#[test]
fn lookups_for_missing_things_are_empty_not_errors() {
    let (_tmp, store) = helpers::test_store();
    let sounds = SoundRepository::new(store.clone());
    assert!(sounds.get_by_id(99).is_none());
    assert!(sounds.get_by_filename("nope.mp3", None).is_none());
    assert!(sounds.search("", 5).is_empty());
    assert!(sounds.search("anything", 5).is_empty());
    assert!(ActionRepository::new(store).get_users_who_favorited(99).is_empty());
}

#[test]
fn oversized_windows_fall_back_instead_of_panicking() {
    let (_tmp, store) = helpers::test_store();
    let sounds = SoundRepository::new(store.clone());
    let actions = ActionRepository::new(store.clone());
    let voice = VoiceActivityRepository::new(store.clone());
    let stats = StatsRepository::new(store);

    let id = sounds.insert_sound("a.mp3", "a.mp3", None).unwrap();
    actions.insert("alice", "play_request", &id.to_string(), None);
    voice.log_join("alice", "1", now()).unwrap();

    assert_eq!(actions.get_top_users(u32::MAX, 10), actions.get_top_users(0, 10));
    assert!(actions.get_sounds_on_this_day(u32::MAX, 10).is_empty());
    assert_eq!(stats.get_activity_heatmap(u32::MAX), stats.get_activity_heatmap(0));
    assert_eq!(stats.get_activity_heatmap(u32::MAX).len(), 1);
    assert_eq!(
        voice.get_top_users_by_voice_time(u32::MAX, 10),
        voice.get_top_users_by_voice_time(0, 10)
    );
}
