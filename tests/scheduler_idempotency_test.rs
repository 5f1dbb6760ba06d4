mod helpers;

use soundbase::repo::actions::ActionRepository;

const MARKER: &str = "weekly_wrapped_sent";

#[test]
fn marker_is_scoped_to_its_guild() {
    let (_tmp, store) = helpers::test_store();
    let actions = ActionRepository::new(store);
    let period = "2025-W01";

    assert!(!actions.has_action_for_target(MARKER, period, Some(1), false));
    actions.insert("scheduler", MARKER, period, Some(1)).unwrap();

    assert!(actions.has_action_for_target(MARKER, period, Some(1), false));
    assert!(!actions.has_action_for_target(MARKER, period, Some(2), false));
    assert!(!actions.has_action_for_target(MARKER, "2025-W02", Some(1), false));
    assert!(!actions.has_action_for_target(MARKER, period, None, false));
}

#[test]
fn global_marker_counts_only_when_asked() {
    let (_tmp, store) = helpers::test_store();
    let actions = ActionRepository::new(store);
    actions.insert("scheduler", MARKER, "2025-W05", None).unwrap();

    assert!(!actions.has_action_for_target(MARKER, "2025-W05", Some(9), false));
    assert!(actions.has_action_for_target(MARKER, "2025-W05", Some(9), true));
    assert!(actions.has_action_for_target(MARKER, "2025-W05", None, false));
}

#[test]
fn check_then_insert_sends_once_per_period() {
    let (_tmp, store) = helpers::test_store();
    let actions = ActionRepository::new(store.clone());

    let mut sent = 0;
    for _run in 0..3 {
        for guild in [1_i64, 2] {
            if !actions.has_action_for_target(MARKER, "2025-W10", Some(guild), false) {
                actions.insert("scheduler", MARKER, "2025-W10", Some(guild));
                sent += 1;
            }
        }
    }
    assert_eq!(sent, 2);
    assert_eq!(helpers::row_count(&store, "actions"), 2);
}
