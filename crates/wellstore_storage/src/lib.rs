//! # WellStore Storage
//!
//! Byte-store backends for the WellStore commit log.
//!
//! Backends know nothing about frames, records or collections. They hold
//! an append-only sequence of bytes that the core crate interprets as its
//! commit log, and support whole-content replacement for compaction.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - Shared in-process buffer; clones see the same bytes
//! - [`FileBackend`] - Persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use wellstore_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
