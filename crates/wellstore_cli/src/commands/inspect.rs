//! Inspect command implementation.

use super::open_existing;
use serde::Serialize;
use std::path::Path;
use wellstore_core::{CollectionSummary, Store};

/// Store inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Persisted schema version.
    pub version: u32,
    /// When that version was committed, ms since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_migration: Option<i64>,
    /// Log size in bytes.
    pub log_size: u64,
    /// Frames in the log.
    pub frames: u64,
    /// Records across all collections.
    pub records: usize,
    /// Per-collection details.
    pub collections: Vec<CollectionSummary>,
}

/// Gathers inspection data from an open store.
pub fn inspect(store: &Store, path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let marker = store.version_marker()?;
    let collections = store.describe()?;
    Ok(InspectResult {
        path: path.display().to_string(),
        version: marker.map_or(0, |m| m.version),
        last_migration: marker.map(|m| m.last_migration),
        log_size: store.log_size()?,
        frames: store.frame_count(),
        records: collections.iter().map(|c| c.records).sum(),
        collections,
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let result = inspect(&store, path)?;
    store.close()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("WellStore: {}", result.path);
    println!("  Schema version: {}", result.version);
    if let Some(at) = result.last_migration {
        println!("  Last migration: {at} (ms since epoch)");
    }
    println!("  Log size:       {} bytes", result.log_size);
    println!("  Frames:         {}", result.frames);
    println!("  Records:        {}", result.records);
    println!();
    println!("Collections:");
    for collection in &result.collections {
        println!(
            "  {} (key: {}) - {} records",
            collection.name, collection.key_path, collection.records
        );
        for index in &collection.indexes {
            println!(
                "      {} on {}{} - {} entries",
                index.name,
                index.key_path,
                if index.unique { " [unique]" } else { "" },
                index.entries
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wellstore_testkit::TestStore;

    #[test]
    fn inspect_counts_records() {
        let test_store = TestStore::file_at(5);
        test_store
            .put("moodEntries", wellstore_testkit::mood_record("m1", "2024-05-01"))
            .unwrap();

        let path = test_store.path().unwrap();
        let result = inspect(&test_store, &path).unwrap();
        assert_eq!(result.version, 5);
        assert!(result.last_migration.is_some());
        // The mood entry plus the version marker.
        assert_eq!(result.records, 2);
        assert!(result.collections.iter().any(|c| c.name == "conversations"));
    }
}
