//! Log writer and recovery.

use super::entry::LogEntry;
use super::frame::{decode_frames, encode_frame, Frame};
use crate::error::CoreResult;
use crate::types::SequenceNumber;
use parking_lot::Mutex;
use wellstore_storage::StorageBackend;

/// What recovery found in an existing log.
#[derive(Debug, Default)]
pub struct Recovery {
    /// Committed frames in order.
    pub frames: Vec<Frame>,
    /// Bytes cut from the end because they belonged to an interrupted write.
    pub truncated_bytes: u64,
}

struct LogInner {
    backend: Box<dyn StorageBackend>,
    next_sequence: SequenceNumber,
    frames: u64,
}

/// Appends commit frames to a storage backend.
///
/// Each call to [`commit`](Self::commit) writes exactly one frame, so a
/// group of entries becomes durable together or not at all.
pub struct StoreLog {
    inner: Mutex<LogInner>,
    sync_on_commit: bool,
}

impl StoreLog {
    /// Opens a log over `backend`, replaying and repairing its content.
    ///
    /// A torn final frame is truncated away before the log accepts writes.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if damage is found before the final frame, or a
    /// storage error if the backend cannot be read or truncated.
    pub fn recover(
        mut backend: Box<dyn StorageBackend>,
        sync_on_commit: bool,
    ) -> CoreResult<(Self, Recovery)> {
        let data = backend.read_all()?;
        let scan = decode_frames(&data)?;

        if scan.torn_bytes > 0 {
            tracing::warn!(
                valid_len = scan.valid_len,
                torn_bytes = scan.torn_bytes,
                "truncating torn tail of store log"
            );
            backend.truncate(scan.valid_len)?;
            backend.sync()?;
        }

        let next_sequence = scan
            .frames
            .last()
            .map_or(SequenceNumber::new(1), |f| f.sequence.next());
        let frames = scan.frames.len() as u64;

        tracing::debug!(frames, next = %next_sequence, "store log recovered");

        let log = Self {
            inner: Mutex::new(LogInner {
                backend,
                next_sequence,
                frames,
            }),
            sync_on_commit,
        };
        Ok((
            log,
            Recovery {
                frames: scan.frames,
                truncated_bytes: scan.torn_bytes,
            },
        ))
    }

    /// Appends `entries` as one frame and returns its sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails. The caller must not
    /// apply the entries in that case.
    pub fn commit(&self, entries: &[LogEntry]) -> CoreResult<SequenceNumber> {
        let mut inner = self.inner.lock();
        let sequence = inner.next_sequence;
        let data = encode_frame(sequence, entries)?;

        let offset = inner.backend.append(&data)?;
        let durable = if self.sync_on_commit {
            inner.backend.sync()
        } else {
            inner.backend.flush()
        };
        if let Err(e) = durable {
            // An unsynced frame must not resurface on the next open.
            if let Err(undo) = inner.backend.truncate(offset) {
                tracing::warn!(offset, error = %undo, "failed to drop unsynced frame");
            }
            return Err(e.into());
        }

        inner.next_sequence = sequence.next();
        inner.frames += 1;
        Ok(sequence)
    }

    /// Replaces the whole log with one snapshot frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be encoded or written; the
    /// previous log is kept in that case.
    pub fn compact(&self, snapshot: &[LogEntry]) -> CoreResult<SequenceNumber> {
        let mut inner = self.inner.lock();
        let sequence = inner.next_sequence;
        let data = encode_frame(sequence, snapshot)?;

        inner.backend.replace(&data)?;
        inner.next_sequence = sequence.next();
        inner.frames = 1;
        Ok(sequence)
    }

    /// Flushes pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.inner.lock().backend.sync()?;
        Ok(())
    }

    /// Returns the current log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.inner.lock().backend.size()?)
    }

    /// Number of frames in the log.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.inner.lock().frames
    }

    /// Sequence number the next commit will receive.
    #[must_use]
    pub fn next_sequence(&self) -> SequenceNumber {
        self.inner.lock().next_sequence
    }

    /// Re-reads the log and decodes every frame without repairing anything.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if the content no longer decodes.
    pub fn read_frames(&self) -> CoreResult<Vec<Frame>> {
        let data = self.inner.lock().backend.read_all()?;
        Ok(decode_frames(&data)?.frames)
    }
}

impl std::fmt::Debug for StoreLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("StoreLog")
            .field("next_sequence", &inner.next_sequence)
            .field("frames", &inner.frames)
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}
