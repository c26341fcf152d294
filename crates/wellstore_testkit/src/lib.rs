//! # WellStore Testkit
//!
//! Test utilities for WellStore.
//!
//! This crate provides:
//! - Store fixtures over memory and temporary directories
//! - Property-based record generators using proptest
//! - Fault injection: failing backends and failing or counting migrations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wellstore_testkit::prelude::*;
//!
//! #[test]
//! fn mood_round_trip() {
//!     let store = TestStore::memory_at(5);
//!     store.put("moodEntries", mood_record("m1", "2024-05-01")).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
