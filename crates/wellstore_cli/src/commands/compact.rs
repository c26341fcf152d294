//! Compact command implementation.

use super::open_existing;
use std::path::Path;
use wellstore_core::Store;

/// Compaction statistics.
#[derive(Debug)]
pub struct CompactStats {
    /// Frames before compaction.
    pub frames_before: u64,
    /// Bytes before compaction.
    pub bytes_before: u64,
    /// Bytes after compaction, unchanged for a dry run.
    pub bytes_after: u64,
}

/// Compacts `store` unless `dry_run`.
pub fn compact(store: &Store, dry_run: bool) -> Result<CompactStats, Box<dyn std::error::Error>> {
    let frames_before = store.frame_count();
    let bytes_before = store.log_size()?;
    if !dry_run {
        store.compact()?;
    }
    Ok(CompactStats {
        frames_before,
        bytes_before,
        bytes_after: store.log_size()?,
    })
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting store at {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let store = open_existing(path)?;
    let stats = compact(&store, dry_run)?;
    store.close()?;

    println!("  Frames before: {}", stats.frames_before);
    println!("  Size before:   {} bytes", stats.bytes_before);
    println!("  Size after:    {} bytes", stats.bytes_after);
    let saved = stats.bytes_before.saturating_sub(stats.bytes_after);
    println!(
        "  Space saved:   {} bytes ({:.1}%)",
        saved,
        if stats.bytes_before > 0 {
            saved as f64 / stats.bytes_before as f64 * 100.0
        } else {
            0.0
        }
    );
    Ok(())
}
