//! Log entry types.

use crate::schema::{CollectionSchema, IndexSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One change recorded in a commit frame.
///
/// Replaying every entry of every frame in order rebuilds the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogEntry {
    /// Creates an empty collection with its declared indexes.
    CreateCollection {
        /// Collection declaration.
        schema: CollectionSchema,
    },
    /// Drops a collection and all of its records.
    DeleteCollection {
        /// Collection name.
        name: String,
    },
    /// Adds an index to an existing collection.
    CreateIndex {
        /// Collection name.
        collection: String,
        /// Index declaration.
        index: IndexSchema,
    },
    /// Inserts or overwrites a record.
    Put {
        /// Collection name.
        collection: String,
        /// Full record.
        record: Value,
    },
    /// Removes a record.
    Delete {
        /// Collection name.
        collection: String,
        /// Primary key.
        id: String,
    },
}

impl LogEntry {
    /// Collection this entry touches.
    #[must_use]
    pub fn collection(&self) -> &str {
        match self {
            Self::CreateCollection { schema } => &schema.name,
            Self::DeleteCollection { name } => name,
            Self::CreateIndex { collection, .. }
            | Self::Put { collection, .. }
            | Self::Delete { collection, .. } => collection,
        }
    }

    /// Short operation name for logs and CLI output.
    #[must_use]
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::CreateCollection { .. } => "create_collection",
            Self::DeleteCollection { .. } => "delete_collection",
            Self::CreateIndex { .. } => "create_index",
            Self::Put { .. } => "put",
            Self::Delete { .. } => "delete",
        }
    }
}
