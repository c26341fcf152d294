//! The upgrade transaction handed to migration steps.

use crate::error::{CoreError, CoreResult};
use crate::log::LogEntry;
use crate::schema::{CollectionSchema, IndexSchema};
use crate::state::StoreState;
use serde::Serialize;
use serde_json::{Map, Value};

/// An operation performed during an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MigrationOperation {
    /// Created a new collection with its declared indexes.
    CreateCollection {
        /// Name of the collection.
        name: String,
    },
    /// Added an index to an existing collection.
    CreateIndex {
        /// Collection the index is on.
        collection: String,
        /// Name of the index.
        index: String,
    },
    /// Dropped a collection.
    DeleteCollection {
        /// Name of the collection.
        name: String,
        /// Records dropped with it.
        records: usize,
    },
    /// Deleted, recreated and refilled a collection.
    RebuildCollection {
        /// Name of the collection.
        name: String,
        /// Records carried across.
        records: usize,
    },
    /// Rewrote records to add or correct fields.
    Backfill {
        /// Collection backfilled.
        collection: String,
        /// Records rewritten.
        records: usize,
    },
    /// Wrote a single record.
    Put {
        /// Collection written to.
        collection: String,
        /// Primary key.
        id: String,
    },
    /// Wrote the version marker.
    SetVersion {
        /// Version recorded.
        version: u32,
    },
}

/// One migration step that ran, with what it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedStep {
    /// Step version.
    pub version: u32,
    /// Step name.
    pub name: String,
    /// Operations in the order they ran.
    pub operations: Vec<MigrationOperation>,
}

/// Outcome of an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// Version before the upgrade.
    pub old_version: u32,
    /// Version after the upgrade.
    pub new_version: u32,
    /// Steps that ran, ascending.
    pub steps: Vec<AppliedStep>,
    /// Engine operations outside any step (version marker bookkeeping).
    pub bookkeeping: Vec<MigrationOperation>,
    /// Migration timestamp, in ms since the epoch. `None` when nothing ran.
    pub committed_at: Option<i64>,
}

impl MigrationReport {
    /// A report for an open that needed no upgrade.
    #[must_use]
    pub fn unchanged(version: u32) -> Self {
        Self {
            old_version: version,
            new_version: version,
            steps: Vec::new(),
            bookkeeping: Vec::new(),
            committed_at: None,
        }
    }

    /// Returns true if nothing ran.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty() && self.bookkeeping.is_empty()
    }

    /// Every operation, steps first.
    pub fn operations(&self) -> impl Iterator<Item = &MigrationOperation> {
        self.steps
            .iter()
            .flat_map(|s| s.operations.iter())
            .chain(self.bookkeeping.iter())
    }
}

/// Staged changes of one upgrade.
///
/// Every primitive applies its change to a staging copy of the store and
/// records the matching log entry. Nothing reaches the log until the whole
/// upgrade succeeds; on error the staging copy is dropped.
///
/// The `ensure_*` primitives check before they create, so a step may be
/// re-run against a store where it already (partly) applied.
pub struct UpgradeTransaction<'a> {
    state: &'a mut StoreState,
    entries: Vec<LogEntry>,
    report: MigrationReport,
    now: i64,
    in_bookkeeping: bool,
}

impl<'a> UpgradeTransaction<'a> {
    pub(crate) fn new(state: &'a mut StoreState, old_version: u32, new_version: u32, now: i64) -> Self {
        Self {
            state,
            entries: Vec::new(),
            report: MigrationReport {
                old_version,
                new_version,
                steps: Vec::new(),
                bookkeeping: Vec::new(),
                committed_at: Some(now),
            },
            now,
            in_bookkeeping: false,
        }
    }

    /// Persisted version when the upgrade began.
    #[must_use]
    pub fn old_version(&self) -> u32 {
        self.report.old_version
    }

    /// Version the upgrade is heading to.
    #[must_use]
    pub fn new_version(&self) -> u32 {
        self.report.new_version
    }

    /// Timestamp of this upgrade, shared by every step.
    #[must_use]
    pub fn now(&self) -> i64 {
        self.now
    }

    pub(crate) fn begin_step(&mut self, version: u32, name: &str) {
        self.report.steps.push(AppliedStep {
            version,
            name: name.to_string(),
            operations: Vec::new(),
        });
    }

    pub(crate) fn end_steps(&mut self) {
        self.in_bookkeeping = true;
    }

    pub(crate) fn finish(self) -> (Vec<LogEntry>, MigrationReport) {
        (self.entries, self.report)
    }

    fn apply(&mut self, entry: LogEntry) -> CoreResult<()> {
        self.state.apply(&entry)?;
        self.entries.push(entry);
        Ok(())
    }

    fn record(&mut self, op: MigrationOperation) {
        tracing::debug!(operation = ?op, "migration operation");
        match self.report.steps.last_mut() {
            Some(step) if !self.in_bookkeeping => step.operations.push(op),
            _ => self.report.bookkeeping.push(op),
        }
    }

    /// Returns true if the collection exists.
    #[must_use]
    pub fn has_collection(&self, name: &str) -> bool {
        self.state.contains(name)
    }

    /// Live declaration of a collection.
    #[must_use]
    pub fn collection_schema(&self, name: &str) -> Option<&CollectionSchema> {
        self.state.collection(name).ok().map(|c| c.schema())
    }

    /// Live declaration of an index.
    #[must_use]
    pub fn index_schema(&self, collection: &str, index: &str) -> Option<&IndexSchema> {
        self.collection_schema(collection)?.index(index)
    }

    /// Copies every record of a collection, in primary-key order.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if it does not exist.
    pub fn scan(&self, collection: &str) -> CoreResult<Vec<Value>> {
        Ok(self
            .state
            .collection(collection)?
            .records()
            .map(|(_, r)| r.clone())
            .collect())
    }

    /// Creates the collection if it is missing, then any declared index
    /// the live collection lacks. Returns true if the collection was created.
    ///
    /// # Errors
    ///
    /// Fails if an existing index has a different definition, or an added
    /// unique index meets duplicate data.
    pub fn ensure_collection(&mut self, schema: &CollectionSchema) -> CoreResult<bool> {
        if !self.has_collection(&schema.name) {
            self.apply(LogEntry::CreateCollection {
                schema: schema.clone(),
            })?;
            self.record(MigrationOperation::CreateCollection {
                name: schema.name.clone(),
            });
            return Ok(true);
        }
        for index in &schema.indexes {
            self.ensure_index(&schema.name, index)?;
        }
        Ok(false)
    }

    /// Creates the index if it is missing. Returns true if it was created.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if an index with that name exists with a
    /// different definition (uniqueness cannot change in place; rebuild the
    /// collection instead), `CollectionNotFound` for a missing collection,
    /// or `ConstraintViolation` if a unique index meets duplicate data.
    pub fn ensure_index(&mut self, collection: &str, index: &IndexSchema) -> CoreResult<bool> {
        if !self.has_collection(collection) {
            return Err(CoreError::collection_not_found(collection));
        }
        if let Some(existing) = self.index_schema(collection, &index.name) {
            if existing == index {
                return Ok(false);
            }
            return Err(CoreError::invalid_operation(format!(
                "index {collection}.{} exists with a different definition; rebuild the collection to change it",
                index.name
            )));
        }
        self.apply(LogEntry::CreateIndex {
            collection: collection.to_string(),
            index: index.clone(),
        })?;
        self.record(MigrationOperation::CreateIndex {
            collection: collection.to_string(),
            index: index.name.clone(),
        });
        Ok(true)
    }

    /// Drops a collection and its records. Returns false if it was absent.
    ///
    /// # Errors
    ///
    /// Propagates staging errors.
    pub fn delete_collection(&mut self, name: &str) -> CoreResult<bool> {
        let Ok(existing) = self.state.collection(name) else {
            return Ok(false);
        };
        let records = existing.len();
        self.apply(LogEntry::DeleteCollection {
            name: name.to_string(),
        })?;
        self.record(MigrationOperation::DeleteCollection {
            name: name.to_string(),
            records,
        });
        Ok(true)
    }

    /// Rebuilds a collection under a new declaration: reads every row,
    /// deletes the collection, recreates it and reinserts the rows
    /// unchanged. Returns the number of rows carried across.
    ///
    /// A missing collection is simply created.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the rows do not fit the new unique
    /// indexes, or `MigrationFailed` if the row count changes.
    pub fn rebuild_collection(&mut self, schema: &CollectionSchema) -> CoreResult<usize> {
        if !self.has_collection(&schema.name) {
            self.ensure_collection(schema)?;
            return Ok(0);
        }

        let rows = self.scan(&schema.name)?;
        let before = rows.len();

        self.apply(LogEntry::DeleteCollection {
            name: schema.name.clone(),
        })?;
        self.apply(LogEntry::CreateCollection {
            schema: schema.clone(),
        })?;
        for record in rows {
            self.apply(LogEntry::Put {
                collection: schema.name.clone(),
                record,
            })?;
        }

        let after = self.state.collection(&schema.name)?.len();
        if after != before {
            return Err(CoreError::migration_failed(
                self.new_version(),
                format!("rebuild of {} changed row count from {before} to {after}", schema.name),
            ));
        }

        tracing::info!(collection = %schema.name, records = after, "collection rebuilt");
        self.record(MigrationOperation::RebuildCollection {
            name: schema.name.clone(),
            records: after,
        });
        Ok(after)
    }

    /// Offers every record to `fill`, rewriting those it reports as changed.
    /// Returns the number of rewritten records.
    ///
    /// `fill` receives the record's fields and returns true if it modified
    /// them. Records that are not objects are skipped.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` for a missing collection, or any error
    /// raised while writing a rewritten record.
    pub fn backfill<F>(&mut self, collection: &str, mut fill: F) -> CoreResult<usize>
    where
        F: FnMut(&mut Map<String, Value>) -> bool,
    {
        let mut rewritten = 0;
        for mut record in self.scan(collection)? {
            let changed = match record.as_object_mut() {
                Some(fields) => fill(fields),
                None => false,
            };
            if changed {
                self.apply(LogEntry::Put {
                    collection: collection.to_string(),
                    record,
                })?;
                rewritten += 1;
            }
        }
        self.record(MigrationOperation::Backfill {
            collection: collection.to_string(),
            records: rewritten,
        });
        Ok(rewritten)
    }

    /// Writes one record.
    ///
    /// # Errors
    ///
    /// Same as a regular put.
    pub fn put(&mut self, collection: &str, record: Value) -> CoreResult<()> {
        let id = self.state.collection(collection)?.check_put(&record)?;
        self.apply(LogEntry::Put {
            collection: collection.to_string(),
            record,
        })?;
        self.record(MigrationOperation::Put {
            collection: collection.to_string(),
            id,
        });
        Ok(())
    }

    pub(crate) fn set_version(&mut self, collection: &str, record: Value, version: u32) -> CoreResult<()> {
        self.apply(LogEntry::Put {
            collection: collection.to_string(),
            record,
        })?;
        self.record(MigrationOperation::SetVersion { version });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cups() -> CollectionSchema {
        CollectionSchema::new("sugarCups", "id").with_index(IndexSchema::on("date"))
    }

    fn seeded() -> StoreState {
        let mut state = StoreState::new();
        state
            .apply(&LogEntry::CreateCollection { schema: cups() })
            .unwrap();
        for (id, date) in [("c1", "2024-05-01"), ("c2", "2024-05-02")] {
            state
                .apply(&LogEntry::Put {
                    collection: "sugarCups".into(),
                    record: json!({"id": id, "date": date}),
                })
                .unwrap();
        }
        state
    }

    #[test]
    fn ensure_collection_is_idempotent() {
        let mut state = StoreState::new();
        let mut tx = UpgradeTransaction::new(&mut state, 0, 1, 1);
        tx.begin_step(1, "first");

        assert!(tx.ensure_collection(&cups()).unwrap());
        assert!(!tx.ensure_collection(&cups()).unwrap());

        let (entries, report) = tx.finish();
        assert_eq!(entries.len(), 1);
        assert_eq!(
            report.steps[0].operations,
            vec![MigrationOperation::CreateCollection {
                name: "sugarCups".into()
            }]
        );
    }

    #[test]
    fn ensure_collection_adds_missing_indexes() {
        let mut state = seeded();
        let mut tx = UpgradeTransaction::new(&mut state, 1, 2, 1);
        let wider = cups().with_index(IndexSchema::on("size"));

        assert!(!tx.ensure_collection(&wider).unwrap());
        assert!(tx.index_schema("sugarCups", "size").is_some());
    }

    #[test]
    fn ensure_index_refuses_to_alter_in_place() {
        let mut state = seeded();
        let mut tx = UpgradeTransaction::new(&mut state, 1, 2, 1);

        let err = tx
            .ensure_index("sugarCups", &IndexSchema::on("date").unique())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
        assert!(tx.ensure_index("missing", &IndexSchema::on("date")).is_err());
    }

    #[test]
    fn rebuild_is_lossless() {
        let mut state = seeded();
        let before = state.collection("sugarCups").unwrap().len();
        let mut tx = UpgradeTransaction::new(&mut state, 1, 2, 1);

        let unique = CollectionSchema::new("sugarCups", "id")
            .with_index(IndexSchema::on("date").unique());
        assert_eq!(tx.rebuild_collection(&unique).unwrap(), before);
        let (entries, _) = tx.finish();
        // delete + create + one put per row
        assert_eq!(entries.len(), 2 + before);

        let coll = state.collection("sugarCups").unwrap();
        assert_eq!(coll.len(), before);
        assert!(coll.schema().index("date").unwrap().unique);
    }

    #[test]
    fn rebuild_fails_when_rows_violate_new_unique_index() {
        let mut state = seeded();
        state
            .apply(&LogEntry::Put {
                collection: "sugarCups".into(),
                record: json!({"id": "c3", "date": "2024-05-01"}),
            })
            .unwrap();
        let mut tx = UpgradeTransaction::new(&mut state, 1, 2, 1);
        let unique = CollectionSchema::new("sugarCups", "id")
            .with_index(IndexSchema::on("date").unique());

        assert!(matches!(
            tx.rebuild_collection(&unique),
            Err(CoreError::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn backfill_rewrites_changed_rows_only() {
        let mut state = seeded();
        let mut tx = UpgradeTransaction::new(&mut state, 1, 2, 42);
        let now = tx.now();

        let rewritten = tx
            .backfill("sugarCups", |fields| {
                if fields.get("date") == Some(&json!("2024-05-01")) {
                    fields.insert("updatedAt".into(), json!(now));
                    true
                } else {
                    false
                }
            })
            .unwrap();
        assert_eq!(rewritten, 1);
        drop(tx);

        let coll = state.collection("sugarCups").unwrap();
        assert_eq!(coll.get("c1").unwrap()["updatedAt"], json!(42));
        assert!(coll.get("c2").unwrap().get("updatedAt").is_none());
    }

    #[test]
    fn delete_collection_reports_absence() {
        let mut state = seeded();
        let mut tx = UpgradeTransaction::new(&mut state, 1, 2, 1);
        assert!(tx.delete_collection("sugarCups").unwrap());
        assert!(!tx.delete_collection("sugarCups").unwrap());
        assert!(!tx.has_collection("sugarCups"));
    }

    #[test]
    fn bookkeeping_is_kept_apart_from_steps() {
        let mut state = StoreState::new();
        let mut tx = UpgradeTransaction::new(&mut state, 0, 1, 1);
        tx.begin_step(1, "first");
        tx.ensure_collection(&cups()).unwrap();
        tx.end_steps();
        tx.ensure_collection(&CollectionSchema::new("dbVersion", "id"))
            .unwrap();

        let (_, report) = tx.finish();
        assert_eq!(report.steps[0].operations.len(), 1);
        assert_eq!(report.bookkeeping.len(), 1);
        assert_eq!(report.operations().count(), 2);
        assert!(!report.is_noop());
        assert!(MigrationReport::unchanged(3).is_noop());
    }
}
