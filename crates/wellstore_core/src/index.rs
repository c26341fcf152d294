//! Ordered secondary indexes.

use crate::error::{CoreError, CoreResult};
use crate::key::{KeyRange, KeyValue};
use crate::schema::IndexSchema;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// An ordered index from key to primary keys.
///
/// `SecondaryIndex` supports:
/// - Equality and range lookups
/// - Prefix scans over compound (array) keys
/// - Uniqueness enforcement
///
/// Results come back in key order, and in primary-key order within one key.
#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    /// Owning collection, for error messages.
    collection: String,
    /// Index declaration.
    schema: IndexSchema,
    /// Ordered key to primary keys mapping.
    entries: BTreeMap<KeyValue, BTreeSet<String>>,
    /// Total entry count.
    count: usize,
}

impl SecondaryIndex {
    /// Creates an empty index.
    pub fn new(collection: impl Into<String>, schema: IndexSchema) -> Self {
        Self {
            collection: collection.into(),
            schema,
            entries: BTreeMap::new(),
            count: 0,
        }
    }

    /// Returns the index declaration.
    #[must_use]
    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// Extracts this index's key from a record.
    #[must_use]
    pub fn key_for(&self, record: &Value) -> Option<KeyValue> {
        self.schema.key_path.extract(record)
    }

    /// Checks whether `id` may hold `key` without mutating anything.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the index is unique and another
    /// record already holds `key`.
    pub fn check(&self, key: &KeyValue, id: &str) -> CoreResult<()> {
        if !self.schema.unique {
            return Ok(());
        }
        match self.entries.get(key).and_then(|ids| ids.iter().find(|other| *other != id)) {
            Some(existing) => Err(CoreError::ConstraintViolation {
                collection: self.collection.clone(),
                index: self.schema.name.clone(),
                key: key.to_string(),
                existing_id: existing.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Inserts a key-record mapping.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` on a unique-key clash.
    pub fn insert(&mut self, key: KeyValue, id: &str) -> CoreResult<()> {
        self.check(&key, id)?;
        if self.entries.entry(key).or_default().insert(id.to_string()) {
            self.count += 1;
        }
        Ok(())
    }

    /// Removes a key-record mapping. Returns whether it existed.
    pub fn remove(&mut self, key: &KeyValue, id: &str) -> bool {
        let Some(ids) = self.entries.get_mut(key) else {
            return false;
        };
        if !ids.remove(id) {
            return false;
        }
        self.count -= 1;
        if ids.is_empty() {
            self.entries.remove(key);
        }
        true
    }

    /// Primary keys holding exactly `key`.
    #[must_use]
    pub fn lookup(&self, key: &KeyValue) -> Vec<String> {
        self.entries
            .get(key)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Primary keys whose key falls in `range`, in key order.
    #[must_use]
    pub fn range(&self, range: &KeyRange) -> Vec<String> {
        if range.is_empty() {
            return Vec::new();
        }
        self.entries
            .range(range.clone())
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    /// Primary keys whose array key starts with `prefix`, ordered by the
    /// remaining components.
    #[must_use]
    pub fn prefix(&self, prefix: &[KeyValue]) -> Vec<String> {
        let start = KeyValue::Array(prefix.to_vec());
        self.entries
            .range((Bound::Included(start), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    /// All `(key, primary key)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&KeyValue, &str)> {
        self.entries
            .iter()
            .flat_map(|(key, ids)| ids.iter().map(move |id| (key, id.as_str())))
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn distinct_keys(&self) -> usize {
        self.entries.len()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if the index holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Clears the index.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.count = 0;
    }

    /// Rebuilds the index from `(primary key, record)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if a unique index would hold a key twice;
    /// the index is left cleared in that case.
    pub fn rebuild<'a, I>(&mut self, records: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        self.clear();
        for (id, record) in records {
            if let Some(key) = self.key_for(record) {
                if let Err(e) = self.insert(key, id) {
                    self.clear();
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date_index(unique: bool) -> SecondaryIndex {
        let schema = IndexSchema::on("date");
        SecondaryIndex::new("foodReflections", if unique { schema.unique() } else { schema })
    }

    #[test]
    fn insert_and_lookup() {
        let mut index = date_index(false);
        index.insert("2024-05-01".into(), "r2").unwrap();
        index.insert("2024-05-01".into(), "r1").unwrap();

        assert_eq!(index.lookup(&"2024-05-01".into()), vec!["r1", "r2"]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.distinct_keys(), 1);
    }

    #[test]
    fn unique_rejects_other_record() {
        let mut index = date_index(true);
        index.insert("2024-05-01".into(), "r1").unwrap();

        // Re-inserting the same record is fine.
        index.insert("2024-05-01".into(), "r1").unwrap();

        let err = index.insert("2024-05-01".into(), "r2").unwrap_err();
        match err {
            CoreError::ConstraintViolation {
                index, existing_id, ..
            } => {
                assert_eq!(index, "date");
                assert_eq!(existing_id, "r1");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn range_is_key_ordered() {
        let mut index = SecondaryIndex::new("moodEntries", IndexSchema::on("score"));
        for (score, id) in [(5, "e"), (1, "a"), (3, "c"), (4, "d"), (2, "b")] {
            index.insert(KeyValue::from(score as i64), id).unwrap();
        }

        assert_eq!(index.range(&KeyRange::between(2i64, 4i64)), vec!["b", "c", "d"]);
        assert_eq!(index.range(&KeyRange::greater_than(3i64)), vec!["d", "e"]);
        assert_eq!(index.range(&KeyRange::all()).len(), 5);
        assert!(index.range(&KeyRange::between(4i64, 2i64)).is_empty());
    }

    #[test]
    fn prefix_scan_orders_by_trailing_component() {
        let mut index = SecondaryIndex::new(
            "conversations",
            IndexSchema::compound(["characterId", "timestamp"]),
        );
        let rows = [
            ("m3", "baiqi", 300),
            ("m1", "baiqi", 100),
            ("x1", "lizeyan", 50),
            ("m2", "baiqi", 200),
            ("a0", "another", 10),
        ];
        for (id, character, ts) in rows {
            let key = KeyValue::Array(vec![character.into(), KeyValue::from(ts as i64)]);
            index.insert(key, id).unwrap();
        }

        assert_eq!(index.prefix(&["baiqi".into()]), vec!["m1", "m2", "m3"]);
        assert_eq!(index.prefix(&["nobody".into()]), Vec::<String>::new());
        assert_eq!(
            index.prefix(&["baiqi".into(), KeyValue::from(200i64)]),
            vec!["m2"]
        );
    }

    #[test]
    fn remove_entry() {
        let mut index = date_index(false);
        index.insert("2024-05-01".into(), "r1").unwrap();

        assert!(index.remove(&"2024-05-01".into(), "r1"));
        assert!(!index.remove(&"2024-05-01".into(), "r1"));
        assert!(index.is_empty());
    }

    #[test]
    fn rebuild_skips_unkeyed_records_and_detects_duplicates() {
        let a = json!({"id": "a", "date": "2024-05-01"});
        let b = json!({"id": "b"});
        let c = json!({"id": "c", "date": "2024-05-01"});

        let mut non_unique = date_index(false);
        non_unique.rebuild([("a", &a), ("b", &b), ("c", &c)]).unwrap();
        assert_eq!(non_unique.len(), 2);

        let mut unique = date_index(true);
        assert!(unique.rebuild([("a", &a), ("c", &c)]).is_err());
        assert!(unique.is_empty());
    }
}
