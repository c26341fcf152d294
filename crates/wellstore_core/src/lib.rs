//! # WellStore Core
//!
//! Embedded record store for the wellness application.
//!
//! This crate provides:
//! - Named collections of JSON records keyed by a string primary key
//! - Unique, non-unique and compound secondary indexes
//! - A framed, checksummed commit log with torn-tail recovery and compaction
//! - Versioned schema upgrades that commit atomically
//! - A connection manager that coalesces concurrent opens
//!
//! ## Example
//!
//! ```rust,no_run
//! use wellstore_core::{ConnectionManager, StoreConfig, KeyValue};
//! use wellstore_core::schema::wellness::{collections, CHARACTER_TIMESTAMP_INDEX};
//!
//! # async fn run() -> wellstore_core::CoreResult<()> {
//! let manager = ConnectionManager::new(StoreConfig::at("wellness-data"));
//! let conn = manager.open(5).await?;
//!
//! conn.put(
//!     collections::CONVERSATIONS,
//!     serde_json::json!({"id": "m1", "characterId": "baiqi", "timestamp": 1, "content": "hi"}),
//! )?;
//! let history = conn.query_by_compound_index(
//!     collections::CONVERSATIONS,
//!     CHARACTER_TIMESTAMP_INDEX,
//!     &[KeyValue::from("baiqi")],
//! )?;
//! assert_eq!(history.len(), 1);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod config;
mod connection;
mod dir;
pub mod entity;
mod error;
mod index;
mod key;
pub mod log;
pub mod migration;
pub mod schema;
mod state;
mod stats;
mod store;
mod types;

pub use collection::CollectionState;
pub use config::{BackendFactory, StoreConfig, StoreLocation, DEFAULT_DIR, ENV_PATH, ENV_SYNC};
pub use connection::{
    close_connection, global, init_global, open_connection, Connection, ConnectionManager,
};
pub use entity::{Entity, TypedCollection};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use index::SecondaryIndex;
pub use key::{KeyPath, KeyRange, KeyValue};
pub use migration::{
    Migration, MigrationOperation, MigrationPlan, MigrationReport, UpgradeTransaction,
    VersionMarker,
};
pub use schema::{CollectionSchema, IndexSchema, SchemaRegistry};
pub use state::StoreState;
pub use stats::{ConnectionStatsSnapshot, StoreStatsSnapshot};
pub use store::{CollectionSummary, IndexSummary, Store, VerifyReport};
pub use types::{new_record_id, now_millis, SequenceNumber};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
