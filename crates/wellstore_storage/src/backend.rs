//! Storage backend trait definition.

use crate::error::StorageResult;

/// A low-level byte store holding one commit log.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `replace` swaps the whole content atomically: a reader observes either
///   the old bytes or the new bytes, never a mix
/// - Backends must be `Send + Sync`; the core wraps them in a mutex
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `ReadPastEnd` if the range extends beyond the current size.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes appended data to the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Makes all data and metadata durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Drops every byte after `new_size`. Used to cut a torn tail.
    ///
    /// # Errors
    ///
    /// Returns `TruncateBeyondEnd` if `new_size` exceeds the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;

    /// Atomically replaces the whole content with `data`. Used by compaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement cannot be made durable; in that
    /// case the previous content is left in place.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Reads the entire content.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size)
            .map_err(|_| crate::StorageError::unavailable("storage too large to load"))?;
        self.read_at(0, len)
    }
}
