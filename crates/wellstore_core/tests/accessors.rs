//! Entity accessor behavior at the latest schema version.

use proptest::prelude::*;
use serde_json::json;
use wellstore_core::schema::wellness::collections::{
    CONVERSATIONS, FOOD_REFLECTIONS, HEALTH_CONDITIONS, MOOD_ENTRIES,
};
use wellstore_core::schema::wellness::CHARACTER_TIMESTAMP_INDEX;
use wellstore_core::{CoreError, ErrorKind, KeyRange, KeyValue};
use wellstore_testkit::prelude::*;

#[test]
fn put_then_get_returns_the_record() {
    with_wellness_store(|store| {
        let record = json!({"id": "m1", "date": "2024-05-01", "mood": "calm", "note": {"tags": ["rain", 2]}});
        assert_eq!(store.put(MOOD_ENTRIES, record.clone()).unwrap(), "m1");
        assert_eq!(store.get(MOOD_ENTRIES, "m1").unwrap(), Some(record));
    });
}

#[test]
fn put_overwrites_and_reindexes() {
    with_wellness_store(|store| {
        store.put(MOOD_ENTRIES, mood_record("m1", "2024-05-01")).unwrap();
        store.put(MOOD_ENTRIES, mood_record("m1", "2024-05-09")).unwrap();

        assert_eq!(store.count(MOOD_ENTRIES).unwrap(), 1);
        assert!(store
            .query_by_index(MOOD_ENTRIES, "date", "2024-05-01")
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .query_by_index(MOOD_ENTRIES, "date", "2024-05-09")
                .unwrap()
                .len(),
            1
        );
    });
}

#[test]
fn missing_records_are_absent_not_errors() {
    with_wellness_store(|store| {
        assert_eq!(store.get(MOOD_ENTRIES, "nope").unwrap(), None);

        let err = store.require(MOOD_ENTRIES, "nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = store.delete(MOOD_ENTRIES, "nope").unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    });
}

#[test]
fn delete_removes_from_indexes() {
    with_wellness_store(|store| {
        store.put(MOOD_ENTRIES, mood_record("m1", "2024-05-01")).unwrap();
        store.delete(MOOD_ENTRIES, "m1").unwrap();

        assert_eq!(store.get(MOOD_ENTRIES, "m1").unwrap(), None);
        assert!(store
            .query_by_index(MOOD_ENTRIES, "date", KeyRange::all())
            .unwrap()
            .is_empty());
    });
}

#[test]
fn unique_index_rejects_a_second_holder() {
    with_wellness_store(|store| {
        store.put(HEALTH_CONDITIONS, condition("c1", "asthma")).unwrap();
        let err = store
            .put(HEALTH_CONDITIONS, condition("c2", "asthma"))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert_eq!(store.get(HEALTH_CONDITIONS, "c2").unwrap(), None);
        assert_eq!(store.count(HEALTH_CONDITIONS).unwrap(), 1);
        assert_eq!(store.stats().constraint_violations, 1);

        // The holder itself may be rewritten with the same key.
        store.put(HEALTH_CONDITIONS, condition("c1", "asthma")).unwrap();
    });
}

#[test]
fn two_reflections_may_share_a_date() {
    with_wellness_store(|store| {
        store
            .put(FOOD_REFLECTIONS, food_reflection("r1", "2024-05-01", Some("lunch")))
            .unwrap();
        store
            .put(FOOD_REFLECTIONS, food_reflection("r2", "2024-05-01", Some("dinner")))
            .unwrap();

        let same_day = store
            .query_by_index(FOOD_REFLECTIONS, "date", "2024-05-01")
            .unwrap();
        assert_eq!(same_day.len(), 2);

        let dinner = store
            .query_by_compound_index(
                FOOD_REFLECTIONS,
                "date_mealType",
                &[KeyValue::from("2024-05-01"), KeyValue::from("dinner")],
            )
            .unwrap();
        assert_eq!(dinner.len(), 1);
        assert_eq!(dinner[0]["id"], "r2");
    });
}

#[test]
fn compound_query_orders_by_timestamp() {
    let test_store = scenarios::conversations(5);
    let history = test_store
        .query_by_compound_index(CONVERSATIONS, CHARACTER_TIMESTAMP_INDEX, &[KeyValue::from("baiqi")])
        .unwrap();

    assert_eq!(history.len(), 5);
    assert!(history.iter().all(|m| m["characterId"] == "baiqi"));
    let stamps: Vec<i64> = history
        .iter()
        .map(|m| m["timestamp"].as_i64().unwrap())
        .collect();
    assert_eq!(stamps, vec![996, 997, 998, 999, 1000]);
}

#[test]
fn compound_query_with_empty_prefix_returns_everything() {
    let test_store = scenarios::conversations(3);
    let all = test_store
        .query_by_compound_index(CONVERSATIONS, CHARACTER_TIMESTAMP_INDEX, &[])
        .unwrap();
    assert_eq!(all.len(), 6);
    assert_eq!(all[0]["characterId"], "baiqi");
    assert_eq!(all[5]["characterId"], "lizeyan");
}

#[test]
fn range_queries_on_single_field_indexes() {
    with_wellness_store(|store| {
        for (id, date) in [("m1", "2024-05-01"), ("m2", "2024-05-02"), ("m3", "2024-05-03")] {
            store.put(MOOD_ENTRIES, mood_record(id, date)).unwrap();
        }
        let from_second = store
            .query_by_index(MOOD_ENTRIES, "date", KeyRange::at_least("2024-05-02"))
            .unwrap();
        let ids: Vec<_> = from_second.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("m2"), json!("m3")]);

        let before_second = store
            .query_by_index(MOOD_ENTRIES, "date", KeyRange::less_than("2024-05-02"))
            .unwrap();
        assert_eq!(before_second.len(), 1);
    });
}

#[test]
fn unknown_names_are_invalid_requests() {
    with_wellness_store(|store| {
        let err = store.get("medications", "x").unwrap_err();
        assert!(matches!(err, CoreError::CollectionNotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let err = store
            .query_by_index(MOOD_ENTRIES, "score", KeyRange::all())
            .unwrap_err();
        assert!(matches!(err, CoreError::IndexNotFound { .. }));

        let err = store
            .query_by_compound_index(MOOD_ENTRIES, "date", &[KeyValue::from("2024-05-01")])
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    });
}

#[test]
fn unkeyed_records_are_rejected() {
    with_wellness_store(|store| {
        let err = store.put(MOOD_ENTRIES, json!({"date": "2024-05-01"})).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRecord { .. }));
        let err = store.put(MOOD_ENTRIES, json!(["not", "an", "object"])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRecord { .. }));
    });
}

#[test]
fn closed_store_refuses_access() {
    let test_store = TestStore::memory_at(5);
    test_store.close().unwrap();
    test_store.close().unwrap();

    let err = test_store.get(MOOD_ENTRIES, "m1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionError);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn stored_records_read_back_unchanged(
        (collection, key_path) in collection_strategy(),
        batch in record_batch_strategy(12),
    ) {
        let batch: Vec<_> = batch
            .into_iter()
            .map(|mut record| {
                record[key_path.as_str()] = record["id"].clone();
                record
            })
            .collect();

        let test_store = TestStore::memory_at(5);
        for record in &batch {
            test_store.put(&collection, record.clone()).unwrap();
        }
        for record in &batch {
            let key = record[key_path.as_str()].as_str().unwrap();
            let got = test_store.get(&collection, key).unwrap();
            prop_assert_eq!(got.as_ref(), Some(record));
        }

        let test_store = test_store.reopen();
        prop_assert_eq!(test_store.count(&collection).unwrap(), batch.len());
        for record in &batch {
            let key = record[key_path.as_str()].as_str().unwrap();
            let got = test_store.get(&collection, key).unwrap();
            prop_assert_eq!(got.as_ref(), Some(record));
        }
    }
}
