//! Schema upgrade behavior across the wellness versions.

use serde_json::json;
use wellstore_core::migration::wellness::{wellness_plan, UNSPECIFIED_MEAL_TYPE};
use wellstore_core::schema::wellness::collections::{
    CHARACTER_STATES, CONVERSATIONS, FOOD_REFLECTIONS, MOOD_ENTRIES,
};
use wellstore_core::{CoreError, ErrorKind, MigrationOperation, Store};
use wellstore_testkit::prelude::*;

#[test]
fn fresh_store_reaches_each_version() {
    for target in 1..=5 {
        let test_store = TestStore::memory();
        let report = test_store.upgrade(&wellness_plan(), target).unwrap();
        assert_eq!(report.old_version, 0);
        assert_eq!(report.new_version, target);
        assert_eq!(report.steps.len(), target as usize);
        assert_eq!(test_store.version().unwrap(), target);
    }
}

#[test]
fn collections_appear_with_their_version() {
    let test_store = TestStore::memory_at(2);
    let names = test_store.collection_names().unwrap();
    assert!(names.iter().any(|n| n == MOOD_ENTRIES));
    assert!(names.iter().any(|n| n == FOOD_REFLECTIONS));
    assert!(!names.iter().any(|n| n == CONVERSATIONS));

    test_store.upgrade_to(3);
    let names = test_store.collection_names().unwrap();
    assert!(names.iter().any(|n| n == CONVERSATIONS));
    assert!(names.iter().any(|n| n == CHARACTER_STATES));
}

#[test]
fn steps_run_in_order() {
    let (plan, log) = logged_wellness_plan();
    let test_store = TestStore::memory();
    test_store.upgrade(&plan, 2).unwrap();
    test_store.upgrade(&plan, 5).unwrap();
    assert_eq!(log.versions(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn v3_rejects_two_reflections_on_one_date() {
    let test_store = TestStore::memory_at(3);
    test_store
        .put(FOOD_REFLECTIONS, food_reflection("r1", "2024-05-01", Some("lunch")))
        .unwrap();
    let err = test_store
        .put(FOOD_REFLECTIONS, food_reflection("r2", "2024-05-01", Some("dinner")))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
}

#[test]
fn date_index_rebuild_keeps_every_record() {
    let test_store = scenarios::legacy_reflections(3);
    let before = test_store.get_all(FOOD_REFLECTIONS).unwrap();

    let report = test_store.upgrade(&wellness_plan(), 4).unwrap();
    assert!(report
        .operations()
        .any(|op| matches!(op, MigrationOperation::RebuildCollection { records: 3, .. })));

    assert_eq!(test_store.get_all(FOOD_REFLECTIONS).unwrap(), before);
    let date_index = test_store
        .describe()
        .unwrap()
        .into_iter()
        .find(|c| c.name == FOOD_REFLECTIONS)
        .unwrap()
        .indexes
        .into_iter()
        .find(|i| i.name == "date")
        .unwrap();
    assert!(!date_index.unique);
    assert_eq!(date_index.entries, 3);

    test_store
        .put(FOOD_REFLECTIONS, food_reflection("r9", "2024-05-01", Some("snack")))
        .unwrap();
    assert_eq!(
        test_store
            .query_by_index(FOOD_REFLECTIONS, "date", "2024-05-01")
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn meal_type_backfill_fills_only_missing_values() {
    let test_store = TestStore::memory_at(4);
    test_store
        .put(FOOD_REFLECTIONS, food_reflection("r1", "2024-05-01", None))
        .unwrap();
    test_store
        .put(FOOD_REFLECTIONS, food_reflection("r2", "2024-05-02", Some("lunch")))
        .unwrap();
    let mut nulled = food_reflection("r3", "2024-05-03", None);
    nulled["mealType"] = json!(null);
    test_store.put(FOOD_REFLECTIONS, nulled).unwrap();

    let report = test_store.upgrade(&wellness_plan(), 5).unwrap();
    assert!(report
        .operations()
        .any(|op| matches!(op, MigrationOperation::Backfill { records: 2, .. })));

    let r1 = test_store.require(FOOD_REFLECTIONS, "r1").unwrap();
    assert_eq!(r1["mealType"], UNSPECIFIED_MEAL_TYPE);
    assert!(r1["updatedAt"].is_i64());

    let r3 = test_store.require(FOOD_REFLECTIONS, "r3").unwrap();
    assert_eq!(r3["mealType"], UNSPECIFIED_MEAL_TYPE);

    let r2 = test_store.require(FOOD_REFLECTIONS, "r2").unwrap();
    assert_eq!(r2["mealType"], "lunch");
    assert!(r2.get("updatedAt").is_none());

    let unspecified = test_store
        .query_by_index(FOOD_REFLECTIONS, "mealType", UNSPECIFIED_MEAL_TYPE)
        .unwrap();
    assert_eq!(unspecified.len(), 2);
}

#[test]
fn reopening_at_the_same_version_changes_nothing() {
    let test_store = scenarios::legacy_reflections(2);
    test_store.upgrade_to(5);
    let stamped = test_store.require(FOOD_REFLECTIONS, "r0").unwrap();
    let frames = test_store.frame_count();

    let test_store = test_store.reopen();
    let report = test_store.upgrade(&wellness_plan(), 5).unwrap();
    assert!(report.is_noop());
    assert_eq!(test_store.frame_count(), frames);
    assert_eq!(test_store.require(FOOD_REFLECTIONS, "r0").unwrap(), stamped);
}

#[test]
fn version_marker_records_the_upgrade_time() {
    let test_store = TestStore::memory_at(5);
    let marker = test_store.version_marker().unwrap().unwrap();
    assert_eq!(marker.version, 5);
    assert!(marker.last_migration > 0);
}

#[test]
fn downgrade_is_refused_and_harmless() {
    let test_store = TestStore::memory_at(5);
    test_store
        .put(MOOD_ENTRIES, mood_record("m1", "2024-05-01"))
        .unwrap();

    let err = test_store.upgrade(&wellness_plan(), 3).unwrap_err();
    assert!(matches!(
        err,
        CoreError::VersionDowngrade {
            persisted: 5,
            requested: 3
        }
    ));
    assert_eq!(err.kind(), ErrorKind::MigrationFailure);
    assert_eq!(test_store.version().unwrap(), 5);
    assert!(test_store.get(MOOD_ENTRIES, "m1").unwrap().is_some());
}

#[test]
fn target_beyond_the_plan_fails() {
    let test_store = TestStore::memory_at(2);
    let err = test_store.upgrade(&wellness_plan(), 9).unwrap_err();
    assert!(matches!(err, CoreError::MigrationFailed { .. }));
    assert_eq!(test_store.version().unwrap(), 2);
}

#[test]
fn failed_step_leaves_the_store_untouched() {
    let test_store = scenarios::legacy_reflections(3);
    let before = test_store.get_all(FOOD_REFLECTIONS).unwrap();
    let frames = test_store.frame_count();

    let err = test_store
        .upgrade(&wellness_plan_failing_at(5), 5)
        .unwrap_err();
    assert!(matches!(err, CoreError::MigrationFailed { version: 5, .. }));

    assert_eq!(test_store.version().unwrap(), 3);
    assert_eq!(test_store.frame_count(), frames);
    assert_eq!(test_store.get_all(FOOD_REFLECTIONS).unwrap(), before);
    assert_eq!(test_store.get(MOOD_ENTRIES, "staged").unwrap(), None);

    // Steps 4 and 5 ran against the staged copy only; the retry redoes them.
    let report = test_store.upgrade(&wellness_plan(), 5).unwrap();
    assert_eq!(report.old_version, 3);
    assert_eq!(report.steps.len(), 2);
    assert_eq!(test_store.version().unwrap(), 5);
}

#[test]
fn failed_commit_leaves_the_store_untouched() {
    let switch = FaultSwitch::new();
    let store = Store::open(&switch.config()).unwrap();
    store.upgrade(&wellness_plan(), 2).unwrap();

    switch.trip();
    let err = store.upgrade(&wellness_plan(), 5).unwrap_err();
    assert!(matches!(err, CoreError::MigrationFailed { version: 5, .. }));
    assert_eq!(store.version().unwrap(), 2);
    assert!(switch.failures() > 0);

    switch.heal();
    store.close().unwrap();
    let store = Store::open(&switch.config()).unwrap();
    assert_eq!(store.version().unwrap(), 2);
    store.upgrade(&wellness_plan(), 5).unwrap();
    assert_eq!(store.version().unwrap(), 5);
}

#[test]
fn failed_write_is_not_applied() {
    let switch = FaultSwitch::new();
    let store = Store::open(&switch.config()).unwrap();
    store.upgrade(&wellness_plan(), 5).unwrap();

    switch.trip();
    let err = store
        .put(MOOD_ENTRIES, mood_record("m1", "2024-05-01"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionError);
    assert_eq!(store.get(MOOD_ENTRIES, "m1").unwrap(), None);
}
