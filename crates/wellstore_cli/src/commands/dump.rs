//! Dump command implementation.
//!
//! Log frames are decoded straight from `store.log` without opening the
//! store, so a store held open elsewhere can still be dumped.

use super::open_existing;
use serde::Serialize;
use std::path::Path;
use wellstore_core::log::{decode_frames, LogEntry};
use wellstore_storage::{FileBackend, StorageBackend};

/// One decoded frame.
#[derive(Debug, Serialize)]
pub struct FrameInfo {
    /// Byte offset in the log.
    pub offset: u64,
    /// Commit sequence number.
    pub sequence: u64,
    /// Entries committed together.
    pub entries: Vec<LogEntry>,
}

/// Decodes up to `limit` frames from a log file.
pub fn read_frames(
    log_path: &Path,
    limit: Option<usize>,
) -> Result<(Vec<FrameInfo>, u64), Box<dyn std::error::Error>> {
    let backend = FileBackend::open(log_path)?;
    let scan = decode_frames(&backend.read_all()?)?;
    let frames = scan
        .frames
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|f| FrameInfo {
            offset: f.offset,
            sequence: f.sequence.as_u64(),
            entries: f.entries,
        })
        .collect();
    Ok((frames, scan.torn_bytes))
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    collection: Option<&str>,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(collection) = collection {
        return dump_records(path, collection, limit);
    }

    let log_path = path.join("store.log");
    if !log_path.is_file() {
        return Err(format!("No log found at {}", log_path.display()).into());
    }
    let (frames, torn_bytes) = read_frames(&log_path, limit)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&frames)?),
        _ => {
            for frame in &frames {
                println!("seq:{} @{}", frame.sequence, frame.offset);
                for entry in &frame.entries {
                    println!("  {:<18} {}", entry.op_name(), entry.collection());
                }
            }
            if torn_bytes > 0 {
                println!("({torn_bytes} torn bytes at the end of the log)");
            }
        }
    }
    Ok(())
}

fn dump_records(
    path: &Path,
    collection: &str,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_existing(path)?;
    let records = store.get_all(collection)?;
    store.close()?;
    for record in records.iter().take(limit.unwrap_or(usize::MAX)) {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wellstore_testkit::{mood_record, TestStore};

    #[test]
    fn frames_decode_from_disk() {
        let test_store = TestStore::file_at(5);
        test_store
            .put("moodEntries", mood_record("m1", "2024-05-01"))
            .unwrap();
        let log_path = test_store.log_path().unwrap();

        let (frames, torn) = read_frames(&log_path, None).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(torn, 0);
        assert_eq!(frames[1].entries[0].op_name(), "put");
        assert_eq!(frames[1].entries[0].collection(), "moodEntries");

        let (first, _) = read_frames(&log_path, Some(1)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].offset, 0);
    }
}
