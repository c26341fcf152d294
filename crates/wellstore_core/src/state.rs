//! The materialized store: every live collection, rebuilt from the log.

use crate::collection::CollectionState;
use crate::error::{CoreError, CoreResult};
use crate::log::LogEntry;
use std::collections::BTreeMap;

/// All collections, keyed by name.
///
/// `StoreState` is a pure function of the log entries applied to it.
/// Cloning it gives the upgrade path a staging copy that can be thrown
/// away on failure.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    collections: BTreeMap<String, CollectionState>,
}

impl StoreState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one log entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry does not fit the current state: creating
    /// an existing collection, touching a missing one, or a record the
    /// collection rejects.
    pub fn apply(&mut self, entry: &LogEntry) -> CoreResult<()> {
        match entry {
            LogEntry::CreateCollection { schema } => {
                if self.collections.contains_key(&schema.name) {
                    return Err(CoreError::invalid_operation(format!(
                        "collection {} already exists",
                        schema.name
                    )));
                }
                let state = CollectionState::new(schema.clone())?;
                self.collections.insert(schema.name.clone(), state);
            }
            LogEntry::DeleteCollection { name } => {
                self.collections
                    .remove(name)
                    .ok_or_else(|| CoreError::collection_not_found(name))?;
            }
            LogEntry::CreateIndex { collection, index } => {
                self.collection_mut(collection)?.create_index(index.clone())?;
            }
            LogEntry::Put { collection, record } => {
                self.collection_mut(collection)?.apply_put(record.clone())?;
            }
            LogEntry::Delete { collection, id } => {
                self.collection_mut(collection)?.delete(id);
            }
        }
        Ok(())
    }

    /// Applies a sequence of entries in order.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failing entry's error.
    pub fn apply_all<'a, I>(&mut self, entries: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = &'a LogEntry>,
    {
        entries.into_iter().try_for_each(|e| self.apply(e))
    }

    /// Looks up a collection.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if it does not exist.
    pub fn collection(&self, name: &str) -> CoreResult<&CollectionState> {
        self.collections
            .get(name)
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    /// Looks up a collection for mutation.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if it does not exist.
    pub fn collection_mut(&mut self, name: &str) -> CoreResult<&mut CollectionState> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    /// Returns true if the collection exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Collections in name order.
    pub fn collections(&self) -> impl Iterator<Item = &CollectionState> {
        self.collections.values()
    }

    /// Total records across all collections.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.collections.values().map(CollectionState::len).sum()
    }

    /// Entries that recreate this state from nothing.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogEntry> {
        let mut entries = Vec::with_capacity(self.collections.len() + self.record_count());
        for coll in self.collections.values() {
            entries.push(LogEntry::CreateCollection {
                schema: coll.schema().clone(),
            });
            entries.extend(coll.records().map(|(_, record)| LogEntry::Put {
                collection: coll.name().to_string(),
                record: record.clone(),
            }));
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionSchema, IndexSchema};
    use serde_json::json;

    fn mood_schema() -> CollectionSchema {
        CollectionSchema::new("moodEntries", "id").with_index(IndexSchema::on("date"))
    }

    #[test]
    fn applies_entries() {
        let mut state = StoreState::new();
        state
            .apply_all(&[
                LogEntry::CreateCollection {
                    schema: mood_schema(),
                },
                LogEntry::Put {
                    collection: "moodEntries".into(),
                    record: json!({"id": "m1", "date": "2024-05-01"}),
                },
                LogEntry::Put {
                    collection: "moodEntries".into(),
                    record: json!({"id": "m2", "date": "2024-05-02"}),
                },
                LogEntry::Delete {
                    collection: "moodEntries".into(),
                    id: "m1".into(),
                },
            ])
            .unwrap();

        let moods = state.collection("moodEntries").unwrap();
        assert_eq!(moods.len(), 1);
        assert!(moods.get("m2").is_some());
        assert_eq!(state.record_count(), 1);
    }

    #[test]
    fn rejects_entries_that_do_not_fit() {
        let mut state = StoreState::new();
        let create = LogEntry::CreateCollection {
            schema: mood_schema(),
        };
        state.apply(&create).unwrap();
        assert!(state.apply(&create).is_err());
        assert!(state
            .apply(&LogEntry::Put {
                collection: "nope".into(),
                record: json!({"id": "x"}),
            })
            .is_err());
        assert!(state
            .apply(&LogEntry::DeleteCollection {
                name: "nope".into()
            })
            .is_err());
    }

    #[test]
    fn snapshot_recreates_state() {
        let mut state = StoreState::new();
        state
            .apply(&LogEntry::CreateCollection {
                schema: mood_schema(),
            })
            .unwrap();
        state
            .apply(&LogEntry::CreateIndex {
                collection: "moodEntries".into(),
                index: IndexSchema::on("score"),
            })
            .unwrap();
        for (id, score) in [("a", 3), ("b", 5)] {
            state
                .apply(&LogEntry::Put {
                    collection: "moodEntries".into(),
                    record: json!({"id": id, "date": "2024-05-01", "score": score}),
                })
                .unwrap();
        }

        let mut rebuilt = StoreState::new();
        rebuilt.apply_all(&state.snapshot()).unwrap();

        let moods = rebuilt.collection("moodEntries").unwrap();
        assert_eq!(moods.len(), 2);
        assert_eq!(moods.index("score").unwrap().len(), 2);
        assert_eq!(moods.schema(), state.collection("moodEntries").unwrap().schema());
    }
}
