//! Property-based test generators using proptest.
//!
//! Provides strategies for generating wellness records that satisfy
//! the store's keying rules.

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use wellstore_core::migration::VERSION_COLLECTION;
use wellstore_core::schema::wellness::wellness_registry;

/// Strategy for generating primary keys.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}").expect("Invalid regex")
}

/// Strategy for generating ISO dates in 2024.
pub fn date_strategy() -> impl Strategy<Value = String> {
    (1u32..=12, 1u32..=28).prop_map(|(month, day)| format!("2024-{month:02}-{day:02}"))
}

/// Strategy for generating meal types, including none at all.
pub fn meal_type_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::sample::select(vec![
        "breakfast".to_string(),
        "lunch".to_string(),
        "dinner".to_string(),
        "snack".to_string(),
    ]))
}

/// Strategy for generating scalar JSON values, including finite floats
/// and integers at both ends of the 64-bit ranges.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        (prop::num::f64::NORMAL | prop::num::f64::ZERO).prop_map(Value::from),
        "[ -~]{0,24}".prop_map(Value::String),
    ]
}

/// Strategy for picking an application collection together with its key
/// path. The engine-owned version collection is never picked.
pub fn collection_strategy() -> impl Strategy<Value = (String, String)> {
    let choices: Vec<(String, String)> = wellness_registry()
        .map(|registry| {
            registry
                .iter()
                .filter(|c| c.schema.name != VERSION_COLLECTION)
                .map(|c| (c.schema.name.clone(), c.schema.key_path.clone()))
                .collect()
        })
        .unwrap_or_default();
    prop::sample::select(choices)
}

/// Strategy for generating nested JSON payloads.
pub fn payload_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Strategy for generating arbitrary records keyed on `id`.
pub fn record_strategy() -> impl Strategy<Value = Value> {
    (record_id_strategy(), date_strategy(), payload_strategy()).prop_map(|(id, date, payload)| {
        json!({"id": id, "date": date, "payload": payload})
    })
}

/// Strategy for generating food reflections.
pub fn food_reflection_strategy() -> impl Strategy<Value = Value> {
    (record_id_strategy(), date_strategy(), meal_type_strategy()).prop_map(
        |(id, date, meal_type)| crate::fixtures::food_reflection(&id, &date, meal_type.as_deref()),
    )
}

/// Strategy for generating a batch of records with distinct ids.
pub fn record_batch_strategy(max: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::btree_map(record_id_strategy(), (date_strategy(), payload_strategy()), 1..=max)
        .prop_map(|records| {
            records
                .into_iter()
                .map(|(id, (date, payload))| json!({"id": id, "date": date, "payload": payload}))
                .collect()
        })
}
