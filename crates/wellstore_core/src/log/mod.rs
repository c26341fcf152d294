//! Store log: the durable record of every committed change.
//!
//! ## Frame Format
//!
//! ```text
//! | magic "WSLG" (4) | version (2) | length (4) | payload (N) | sha256 (32) |
//! ```
//!
//! The payload is CBOR `{sequence, entries}`. One frame is one commit: a
//! single put, a single delete, or an entire schema upgrade.
//!
//! ## Recovery Policy
//!
//! Tolerated (cut from the log, open proceeds):
//!
//! - Fewer than a header's worth of bytes at the end
//! - A final frame whose length runs past the end of the log
//! - A final frame whose digest does not match
//!
//! These are writes interrupted before they finished. Their commit never
//! happened, so discarding them loses nothing that was acknowledged.
//!
//! Fatal (open fails with `Corruption`):
//!
//! - Bad magic bytes or an unknown format version
//! - A digest mismatch on a frame that is followed by more data
//! - A payload that passes its digest but fails to decode
//!
//! ## Compaction
//!
//! Compaction rewrites the whole log as one snapshot frame that recreates
//! every collection, index and record.

mod entry;
mod frame;
mod writer;

pub use entry::LogEntry;
pub use frame::{decode_frames, encode_frame, Frame, LogScan, FRAME_OVERHEAD, LOG_MAGIC, LOG_VERSION};
pub use writer::{Recovery, StoreLog};
