//! Store fixtures and record builders.
//!
//! Provides convenience functions for setting up test stores
//! and common wellness records.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wellstore_core::migration::wellness::wellness_plan;
use wellstore_core::{Store, StoreConfig};
use wellstore_storage::InMemoryBackend;

/// A test store with automatic cleanup.
///
/// Memory stores keep their buffer and file stores keep their temporary
/// directory, so [`reopen`](Self::reopen) sees everything committed so far.
pub struct TestStore {
    /// The store instance.
    pub store: Store,
    config: StoreConfig,
    buffer: Option<InMemoryBackend>,
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an empty in-memory store at version 0.
    pub fn memory() -> Self {
        let buffer = InMemoryBackend::new();
        let config = StoreConfig::in_memory(buffer.clone());
        Self {
            store: Store::open(&config).expect("Failed to open in-memory store"),
            config,
            buffer: Some(buffer),
            _temp_dir: None,
        }
    }

    /// Creates an in-memory store upgraded to `version` with the wellness plan.
    pub fn memory_at(version: u32) -> Self {
        let test_store = Self::memory();
        test_store.upgrade_to(version);
        test_store
    }

    /// Creates an empty store in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = StoreConfig::at(temp_dir.path().join("store"));
        Self {
            store: Store::open(&config).expect("Failed to open file store"),
            config,
            buffer: None,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Creates a file store upgraded to `version` with the wellness plan.
    pub fn file_at(version: u32) -> Self {
        let test_store = Self::file();
        test_store.upgrade_to(version);
        test_store
    }

    /// Upgrades with the wellness plan, panicking on failure.
    pub fn upgrade_to(&self, version: u32) {
        self.store
            .upgrade(&wellness_plan(), version)
            .expect("Failed to upgrade test store");
    }

    /// Closes the store and opens it again from the same location.
    pub fn reopen(self) -> Self {
        let Self {
            store,
            config,
            buffer,
            _temp_dir,
        } = self;
        store.close().expect("Failed to close test store");
        drop(store);
        Self {
            store: Store::open(&config).expect("Failed to reopen test store"),
            config,
            buffer,
            _temp_dir,
        }
    }

    /// Configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The shared log buffer, for memory stores.
    pub fn buffer(&self) -> Option<&InMemoryBackend> {
        self.buffer.as_ref()
    }

    /// The store directory, for file stores.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join("store"))
    }

    /// The log file, for file stores.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.path().map(|p| p.join("store.log"))
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test against a fresh store at the latest wellness version.
pub fn with_wellness_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store) -> R,
{
    let test_store = TestStore::memory_at(5);
    f(&test_store.store)
}

/// Runs a test against a fresh file store and its directory.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store.path().expect("File store should have a path");
    f(&test_store.store, &path)
}

/// A mood check-in record.
pub fn mood_record(id: &str, date: &str) -> Value {
    json!({"id": id, "date": date, "mood": "calm", "score": 3})
}

/// A food reflection record. `meal_type: None` leaves the field out.
pub fn food_reflection(id: &str, date: &str, meal_type: Option<&str>) -> Value {
    let mut record = json!({"id": id, "date": date, "feeling": "satisfied"});
    if let (Some(meal_type), Some(fields)) = (meal_type, record.as_object_mut()) {
        fields.insert("mealType".into(), Value::from(meal_type));
    }
    record
}

/// A conversation message record.
pub fn message(id: &str, character_id: &str, timestamp: i64) -> Value {
    json!({
        "id": id,
        "characterId": character_id,
        "role": "user",
        "content": format!("message {id}"),
        "timestamp": timestamp,
    })
}

/// A health condition record.
pub fn condition(id: &str, name: &str) -> Value {
    json!({"id": id, "name": name, "status": "active"})
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use wellstore_core::schema::wellness::collections::{CONVERSATIONS, FOOD_REFLECTIONS};

    /// A v3 store holding `count` food reflections on distinct dates,
    /// none of which has a meal type.
    pub fn legacy_reflections(count: usize) -> TestStore {
        let test_store = TestStore::memory_at(3);
        for i in 0..count {
            let date = format!("2024-05-{:02}", i + 1);
            test_store
                .put(FOOD_REFLECTIONS, food_reflection(&format!("r{i}"), &date, None))
                .expect("Failed to seed reflection");
        }
        test_store
    }

    /// A v5 store holding interleaved conversations with two characters.
    pub fn conversations(per_character: i64) -> TestStore {
        let test_store = TestStore::memory_at(5);
        for ts in 0..per_character {
            for character in ["baiqi", "lizeyan"] {
                test_store
                    .put(
                        CONVERSATIONS,
                        message(&format!("{character}-{ts}"), character, 1_000 - ts),
                    )
                    .expect("Failed to seed message");
            }
        }
        test_store
    }
}
