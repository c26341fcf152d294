//! The store: materialized state over a commit log.

use crate::config::{StoreConfig, StoreLocation};
use crate::dir::StoreDir;
use crate::error::{CoreError, CoreResult};
use crate::key::{KeyRange, KeyValue};
use crate::log::{LogEntry, StoreLog};
use crate::migration::{self, MigrationPlan, MigrationReport, VersionMarker};
use crate::state::StoreState;
use crate::stats::{StoreStats, StoreStatsSnapshot};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use wellstore_storage::{FileBackend, StorageBackend};

/// Summary of one index, for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    /// Index name.
    pub name: String,
    /// Field or fields, rendered.
    pub key_path: String,
    /// Whether the index is unique.
    pub unique: bool,
    /// Entries held.
    pub entries: usize,
}

/// Summary of one collection, for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    /// Collection name.
    pub name: String,
    /// Primary key field.
    pub key_path: String,
    /// Records held.
    pub records: usize,
    /// Live indexes.
    pub indexes: Vec<IndexSummary>,
}

/// Result of an integrity check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    /// Frames decoded from the log.
    pub frames: usize,
    /// Entries replayed.
    pub entries: usize,
    /// Records in the replayed state.
    pub records: usize,
    /// Everything found wrong. Empty for a healthy store.
    pub problems: Vec<String>,
}

impl VerifyReport {
    /// Returns true if no problems were found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// An open store.
///
/// All reads and writes are atomic with respect to each other: writers take
/// the state lock exclusively, append their frame and apply it before
/// releasing. A write that fails to reach the log is never applied.
pub struct Store {
    state: RwLock<StoreState>,
    log: StoreLog,
    stats: StoreStats,
    open: AtomicBool,
    dir: Mutex<Option<StoreDir>>,
}

impl Store {
    /// Opens a store, replaying its log.
    ///
    /// # Errors
    ///
    /// Returns a connection-class error if the location is unusable, locked
    /// by another process, or its log is corrupt.
    pub fn open(config: &StoreConfig) -> CoreResult<Self> {
        let (dir, backend): (Option<StoreDir>, Box<dyn StorageBackend>) = match &config.location {
            StoreLocation::Directory(path) => {
                let dir = StoreDir::open(path, config.create_if_missing)?;
                let backend = FileBackend::open(&dir.log_path())?;
                (Some(dir), Box::new(backend))
            }
            StoreLocation::Memory(buffer) => (None, Box::new(buffer.clone())),
            StoreLocation::Custom(factory) => (None, (**factory)()?),
        };

        let (log, recovery) = StoreLog::recover(backend, config.sync_on_commit)?;
        let mut state = StoreState::new();
        let mut entries = 0usize;
        for frame in &recovery.frames {
            state.apply_all(&frame.entries).map_err(|e| {
                CoreError::corruption(
                    frame.offset,
                    format!("frame {} does not replay: {e}", frame.sequence),
                )
            })?;
            entries += frame.entries.len();
        }

        tracing::info!(
            location = ?config.location,
            frames = recovery.frames.len(),
            entries,
            records = state.record_count(),
            truncated_bytes = recovery.truncated_bytes,
            "store opened"
        );

        let store = Self {
            state: RwLock::new(state),
            log,
            stats: StoreStats::new(),
            open: AtomicBool::new(true),
            dir: Mutex::new(dir),
        };

        if config.compact_threshold > 0 && store.log.frame_count() > config.compact_threshold {
            store.compact()?;
        }
        Ok(store)
    }

    /// Opens a fresh, private in-memory store.
    ///
    /// # Errors
    ///
    /// Infallible in practice; kept fallible to match [`open`](Self::open).
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open(&StoreConfig::new())
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CoreError::ConnectionClosed)
        }
    }

    /// Returns true until [`close`](Self::close) is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Persisted schema version, 0 for a store never upgraded.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` after close, or `Codec` for a malformed marker.
    pub fn version(&self) -> CoreResult<u32> {
        Ok(self.version_marker()?.map_or(0, |m| m.version))
    }

    /// The version marker row, if any.
    ///
    /// # Errors
    ///
    /// Same as [`version`](Self::version).
    pub fn version_marker(&self) -> CoreResult<Option<VersionMarker>> {
        self.ensure_open()?;
        VersionMarker::read(&self.state.read())
    }

    /// Reads a record by primary key.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` for an unknown collection.
    pub fn get(&self, collection: &str, id: &str) -> CoreResult<Option<Value>> {
        self.ensure_open()?;
        self.stats.record_read();
        Ok(self.state.read().collection(collection)?.get(id).cloned())
    }

    /// Reads a record that must exist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not.
    pub fn require(&self, collection: &str, id: &str) -> CoreResult<Value> {
        self.get(collection, id)?
            .ok_or_else(|| CoreError::not_found(collection, id))
    }

    /// Inserts or overwrites a record and returns its primary key.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if a unique index holds one of the
    /// record's keys for another record, `InvalidRecord` for an unkeyed
    /// record, or a storage error. Nothing is written on error.
    pub fn put(&self, collection: &str, record: Value) -> CoreResult<String> {
        self.ensure_open()?;
        let mut state = self.state.write();
        let id = match state.collection(collection)?.check_put(&record) {
            Ok(id) => id,
            Err(e) => {
                if matches!(e, CoreError::ConstraintViolation { .. }) {
                    self.stats.record_constraint_violation();
                }
                return Err(e);
            }
        };

        let entry = LogEntry::Put {
            collection: collection.to_string(),
            record,
        };
        self.log.commit(std::slice::from_ref(&entry))?;
        self.stats.record_commit();
        state.apply(&entry)?;
        self.stats.record_write();

        tracing::trace!(collection, id = %id, "put");
        Ok(id)
    }

    /// Deletes a record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not exist.
    pub fn delete(&self, collection: &str, id: &str) -> CoreResult<()> {
        self.ensure_open()?;
        let mut state = self.state.write();
        if state.collection(collection)?.get(id).is_none() {
            return Err(CoreError::not_found(collection, id));
        }

        let entry = LogEntry::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        };
        self.log.commit(std::slice::from_ref(&entry))?;
        self.stats.record_commit();
        state.apply(&entry)?;
        self.stats.record_delete();

        tracing::trace!(collection, id, "delete");
        Ok(())
    }

    /// Every record of a collection, in primary-key order.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` for an unknown collection.
    pub fn get_all(&self, collection: &str) -> CoreResult<Vec<Value>> {
        self.ensure_open()?;
        let state = self.state.read();
        Ok(state
            .collection(collection)?
            .records()
            .map(|(_, r)| r.clone())
            .collect())
    }

    /// Number of records in a collection.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` for an unknown collection.
    pub fn count(&self, collection: &str) -> CoreResult<usize> {
        self.ensure_open()?;
        Ok(self.state.read().collection(collection)?.len())
    }

    /// Records whose key on `index` falls in `range`, in key order.
    ///
    /// Accepts a single key (exact match) or a [`KeyRange`].
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` or `IndexNotFound` for unknown names.
    pub fn query_by_index(
        &self,
        collection: &str,
        index: &str,
        range: impl Into<KeyRange>,
    ) -> CoreResult<Vec<Value>> {
        self.ensure_open()?;
        self.stats.record_index_query();
        self.state
            .read()
            .collection(collection)?
            .query_index(index, &range.into())
    }

    /// Records whose compound key on `index` starts with `prefix`, ordered
    /// by the remaining components.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` or `IndexNotFound` for unknown names, or
    /// `InvalidOperation` if the index is not compound.
    pub fn query_by_compound_index(
        &self,
        collection: &str,
        index: &str,
        prefix: &[KeyValue],
    ) -> CoreResult<Vec<Value>> {
        self.ensure_open()?;
        self.stats.record_index_query();
        self.state
            .read()
            .collection(collection)?
            .query_prefix(index, prefix)
    }

    /// Names of every live collection.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` after close.
    pub fn collection_names(&self) -> CoreResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self
            .state
            .read()
            .collections()
            .map(|c| c.name().to_string())
            .collect())
    }

    /// Describes every live collection and index.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` after close.
    pub fn describe(&self) -> CoreResult<Vec<CollectionSummary>> {
        self.ensure_open()?;
        let state = self.state.read();
        Ok(state
            .collections()
            .map(|c| CollectionSummary {
                name: c.name().to_string(),
                key_path: c.schema().key_path.clone(),
                records: c.len(),
                indexes: c
                    .indexes()
                    .map(|i| IndexSummary {
                        name: i.schema().name.clone(),
                        key_path: i.schema().key_path.to_string(),
                        unique: i.schema().unique,
                        entries: i.len(),
                    })
                    .collect(),
            })
            .collect())
    }

    /// Brings the schema up to `target` using `plan`.
    ///
    /// Every step runs against a staged copy; the whole upgrade is then
    /// appended as one frame and swapped in. On any failure nothing is
    /// written and the store stays at its previous version.
    ///
    /// # Errors
    ///
    /// Returns `VersionDowngrade` if `target` is below the persisted
    /// version, or `MigrationFailed` if a step or the commit fails.
    pub fn upgrade(&self, plan: &MigrationPlan, target: u32) -> CoreResult<MigrationReport> {
        self.ensure_open()?;
        let mut state = self.state.write();

        let Some(staged) = migration::stage(&state, plan, target)? else {
            return Ok(MigrationReport::unchanged(target));
        };

        self.log
            .commit(&staged.entries)
            .map_err(|e| e.into_migration_failure(target))?;
        *state = staged.state;
        self.stats.record_commit();
        self.stats.record_upgrade();

        tracing::info!(
            from = staged.report.old_version,
            to = staged.report.new_version,
            steps = staged.report.steps.len(),
            entries = staged.entries.len(),
            "schema upgrade committed"
        );
        Ok(staged.report)
    }

    /// Rewrites the log as a single snapshot frame.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the snapshot cannot be written; the old
    /// log is kept in that case.
    pub fn compact(&self) -> CoreResult<()> {
        self.ensure_open()?;
        let state = self.state.read();
        let before = self.log.size()?;
        let snapshot = state.snapshot();
        self.log.compact(&snapshot)?;
        self.stats.record_compaction();

        tracing::info!(
            before_bytes = before,
            after_bytes = self.log.size()?,
            entries = snapshot.len(),
            "store log compacted"
        );
        Ok(())
    }

    /// Replays the log from scratch and checks it against the live state.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if the log no longer decodes.
    pub fn verify(&self) -> CoreResult<VerifyReport> {
        self.ensure_open()?;
        let state = self.state.read();
        let frames = self.log.read_frames()?;

        let mut report = VerifyReport {
            frames: frames.len(),
            ..VerifyReport::default()
        };
        let mut replayed = StoreState::new();
        for frame in &frames {
            report.entries += frame.entries.len();
            if let Err(e) = replayed.apply_all(&frame.entries) {
                report
                    .problems
                    .push(format!("frame {} does not replay: {e}", frame.sequence));
            }
        }
        report.records = replayed.record_count();

        for live in state.collections() {
            report.problems.extend(live.integrity_problems());
            match replayed.collection(live.name()) {
                Ok(other) if other.len() != live.len() => report.problems.push(format!(
                    "{}: log holds {} records, memory holds {}",
                    live.name(),
                    other.len(),
                    live.len()
                )),
                Ok(_) => {}
                Err(_) => report
                    .problems
                    .push(format!("{}: missing from the log", live.name())),
            }
        }
        Ok(report)
    }

    /// Counters for this store.
    #[must_use]
    pub fn stats(&self) -> StoreStatsSnapshot {
        self.stats.snapshot()
    }

    /// Current log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the size cannot be read.
    pub fn log_size(&self) -> CoreResult<u64> {
        self.log.size()
    }

    /// Frames in the log.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.log.frame_count()
    }

    /// Closes the store: later calls fail with `ConnectionClosed` and the
    /// directory lock is released. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the final sync fails; the store is closed
    /// regardless.
    pub fn close(&self) -> CoreResult<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        // Wait out in-flight writers before syncing.
        let _state = self.state.write();
        let synced = self.log.sync();
        let dir = self.dir.lock().take();
        tracing::info!(path = ?dir.as_ref().map(StoreDir::path), "store closed");
        synced
    }

    /// Directory of a file-backed store while it is open.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.dir.lock().as_ref().map(|dir| dir.path().to_path_buf())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("open", &self.is_open())
            .field("path", &self.path())
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::wellness::wellness_plan;
    use crate::schema::wellness::collections::{CONVERSATIONS, FOOD_REFLECTIONS, HEALTH_CONDITIONS};
    use serde_json::json;
    use wellstore_storage::InMemoryBackend;

    fn wellness_store() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.upgrade(&wellness_plan(), 5).unwrap();
        store
    }

    #[test]
    fn fresh_store_is_version_zero() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.version().unwrap(), 0);
        assert!(store.version_marker().unwrap().is_none());
        assert!(store.collection_names().unwrap().is_empty());
    }

    #[test]
    fn upgrade_writes_one_frame() {
        let store = Store::open_in_memory().unwrap();
        let report = store.upgrade(&wellness_plan(), 5).unwrap();

        assert_eq!(report.new_version, 5);
        assert_eq!(store.version().unwrap(), 5);
        assert_eq!(store.frame_count(), 1);
        assert_eq!(store.collection_names().unwrap().len(), 13);
        assert!(store.upgrade(&wellness_plan(), 5).unwrap().is_noop());
        assert_eq!(store.frame_count(), 1);
    }

    #[test]
    fn crud() {
        let store = wellness_store();
        let record = json!({"id": "c1", "name": "asthma", "status": "active"});

        assert_eq!(store.put(HEALTH_CONDITIONS, record.clone()).unwrap(), "c1");
        assert_eq!(store.get(HEALTH_CONDITIONS, "c1").unwrap(), Some(record));
        assert_eq!(store.count(HEALTH_CONDITIONS).unwrap(), 1);

        store.delete(HEALTH_CONDITIONS, "c1").unwrap();
        assert!(store.get(HEALTH_CONDITIONS, "c1").unwrap().is_none());
        assert!(matches!(
            store.delete(HEALTH_CONDITIONS, "c1"),
            Err(CoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.require(HEALTH_CONDITIONS, "c1"),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn unknown_names_are_errors() {
        let store = wellness_store();
        assert!(matches!(
            store.get("nope", "x"),
            Err(CoreError::CollectionNotFound { .. })
        ));
        assert!(matches!(
            store.query_by_index(FOOD_REFLECTIONS, "nope", KeyValue::from("x")),
            Err(CoreError::IndexNotFound { .. })
        ));
    }

    #[test]
    fn constraint_violation_writes_nothing() {
        let store = wellness_store();
        store
            .put(HEALTH_CONDITIONS, json!({"id": "c1", "name": "asthma"}))
            .unwrap();
        let frames = store.frame_count();

        let err = store
            .put(HEALTH_CONDITIONS, json!({"id": "c2", "name": "asthma"}))
            .unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation { .. }));
        assert_eq!(store.frame_count(), frames);
        assert_eq!(store.stats().constraint_violations, 1);
    }

    #[test]
    fn compound_query() {
        let store = wellness_store();
        for (id, ts) in [("m3", 300), ("m1", 100), ("m2", 200)] {
            store
                .put(
                    CONVERSATIONS,
                    json!({"id": id, "characterId": "baiqi", "timestamp": ts}),
                )
                .unwrap();
        }
        let ids: Vec<_> = store
            .query_by_compound_index(CONVERSATIONS, "characterId_timestamp", &["baiqi".into()])
            .unwrap()
            .into_iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn reopen_replays_log() {
        let buffer = InMemoryBackend::new();
        {
            let store = Store::open(&StoreConfig::in_memory(buffer.clone())).unwrap();
            store.upgrade(&wellness_plan(), 5).unwrap();
            store
                .put(HEALTH_CONDITIONS, json!({"id": "c1", "name": "asthma"}))
                .unwrap();
        }
        let store = Store::open(&StoreConfig::in_memory(buffer)).unwrap();
        assert_eq!(store.version().unwrap(), 5);
        assert!(store.get(HEALTH_CONDITIONS, "c1").unwrap().is_some());
    }

    #[test]
    fn compact_and_verify() {
        let buffer = InMemoryBackend::new();
        let store = Store::open(&StoreConfig::in_memory(buffer.clone())).unwrap();
        store.upgrade(&wellness_plan(), 5).unwrap();
        for i in 0..10 {
            store
                .put(HEALTH_CONDITIONS, json!({"id": format!("c{i}"), "name": format!("n{i}")}))
                .unwrap();
        }
        store.delete(HEALTH_CONDITIONS, "c0").unwrap();
        let before = store.log_size().unwrap();

        store.compact().unwrap();
        assert_eq!(store.frame_count(), 1);
        assert!(store.log_size().unwrap() < before);
        assert!(store.verify().unwrap().is_ok());

        drop(store);
        let reopened = Store::open(&StoreConfig::in_memory(buffer)).unwrap();
        assert_eq!(reopened.count(HEALTH_CONDITIONS).unwrap(), 9);
        assert_eq!(reopened.version().unwrap(), 5);
    }

    #[test]
    fn auto_compaction_on_open() {
        let buffer = InMemoryBackend::new();
        {
            let store = Store::open(&StoreConfig::in_memory(buffer.clone())).unwrap();
            store.upgrade(&wellness_plan(), 5).unwrap();
            for i in 0..5 {
                store
                    .put(HEALTH_CONDITIONS, json!({"id": format!("c{i}"), "name": format!("n{i}")}))
                    .unwrap();
            }
            assert_eq!(store.frame_count(), 6);
        }
        let store =
            Store::open(&StoreConfig::in_memory(buffer).compact_threshold(3)).unwrap();
        assert_eq!(store.frame_count(), 1);
        assert_eq!(store.count(HEALTH_CONDITIONS).unwrap(), 5);
    }

    #[test]
    fn closed_store_rejects_calls() {
        let store = wellness_store();
        store.close().unwrap();
        store.close().unwrap();
        assert!(!store.is_open());
        assert!(matches!(
            store.get(HEALTH_CONDITIONS, "c1"),
            Err(CoreError::ConnectionClosed)
        ));
        assert!(matches!(
            store.put(HEALTH_CONDITIONS, json!({"id": "c1"})),
            Err(CoreError::ConnectionClosed)
        ));
    }

    #[test]
    fn describe_lists_indexes() {
        let store = wellness_store();
        let summary = store.describe().unwrap();
        let reflections = summary
            .iter()
            .find(|c| c.name == FOOD_REFLECTIONS)
            .unwrap();
        let names: Vec<_> = reflections.indexes.iter().map(|i| i.name.as_str()).collect();
        assert!(names.contains(&"date_mealType"));
        assert!(reflections.indexes.iter().all(|i| !i.unique));
    }

    #[test]
    fn file_store_reports_its_directory_until_closed() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("store");
        let store = Store::open(&StoreConfig::at(path.clone())).unwrap();

        assert_eq!(store.path(), Some(path.clone()));
        assert!(format!("{store:?}").contains("store"));
        store.close().unwrap();
        assert_eq!(store.path(), None);

        assert_eq!(wellness_store().path(), None);
    }
}
