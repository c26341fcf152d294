//! Error types for WellStore core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested record does not exist. Non-fatal.
    NotFound,
    /// A unique index rejected the write. Nothing was written.
    ConstraintViolation,
    /// The schema upgrade failed. The store stays at its previous version.
    MigrationFailure,
    /// The store could not be opened or is no longer usable.
    ConnectionError,
    /// The request itself is malformed (unknown collection, bad record).
    InvalidRequest,
}

/// Errors that can occur in WellStore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] wellstore_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Log payload could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// Record not found.
    #[error("record {id:?} not found in {collection}")]
    NotFound {
        /// Collection searched.
        collection: String,
        /// Primary key that was not found.
        id: String,
    },

    /// A unique index already maps the key to another record.
    #[error("unique index {collection}.{index} already holds {key} for record {existing_id:?}")]
    ConstraintViolation {
        /// Collection written to.
        collection: String,
        /// Index that rejected the write.
        index: String,
        /// Offending key, rendered as JSON.
        key: String,
        /// Primary key of the record already holding the key.
        existing_id: String,
    },

    /// A migration step failed.
    #[error("migration to v{version} failed: {message}")]
    MigrationFailed {
        /// Version whose step failed.
        version: u32,
        /// Description of the failure.
        message: String,
    },

    /// Requested a schema version below the persisted one.
    #[error("cannot open at v{requested}: store is already at v{persisted}")]
    VersionDowngrade {
        /// Persisted version.
        persisted: u32,
        /// Requested target.
        requested: u32,
    },

    /// Collection not found.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Name of the collection.
        name: String,
    },

    /// Index not found.
    #[error("index {index} not found on {collection}")]
    IndexNotFound {
        /// Collection searched.
        collection: String,
        /// Name of the index.
        index: String,
    },

    /// Record is not storable (not an object, missing primary key).
    #[error("invalid record for {collection}: {message}")]
    InvalidRecord {
        /// Collection written to.
        collection: String,
        /// Description of the problem.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// Log is corrupted beyond a torn tail.
    #[error("store corrupted at offset {offset}: {message}")]
    Corruption {
        /// Offset of the bad frame.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Another process holds the store lock.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// Handle was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Store location is unusable.
    #[error("cannot open store: {message}")]
    Unavailable {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates a migration failed error.
    pub fn migration_failed(version: u32, message: impl Into<String>) -> Self {
        Self::MigrationFailed {
            version,
            message: message.into(),
        }
    }

    /// Creates a collection not found error.
    pub fn collection_not_found(name: impl Into<String>) -> Self {
        Self::CollectionNotFound { name: name.into() }
    }

    /// Creates an index not found error.
    pub fn index_not_found(collection: impl Into<String>, index: impl Into<String>) -> Self {
        Self::IndexNotFound {
            collection: collection.into(),
            index: index.into(),
        }
    }

    /// Creates an invalid record error.
    pub fn invalid_record(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::Corruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Classifies this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            Self::MigrationFailed { .. } | Self::VersionDowngrade { .. } => {
                ErrorKind::MigrationFailure
            }
            Self::Storage(_)
            | Self::Io(_)
            | Self::Codec { .. }
            | Self::Corruption { .. }
            | Self::StoreLocked
            | Self::ConnectionClosed
            | Self::Unavailable { .. } => ErrorKind::ConnectionError,
            Self::CollectionNotFound { .. }
            | Self::IndexNotFound { .. }
            | Self::InvalidRecord { .. }
            | Self::InvalidOperation { .. } => ErrorKind::InvalidRequest,
        }
    }

    /// Wraps any error raised inside a migration step as a failure of `version`.
    ///
    /// Errors that already name a migration are passed through.
    #[must_use]
    pub fn into_migration_failure(self, version: u32) -> Self {
        match self {
            Self::MigrationFailed { .. } => self,
            other => Self::migration_failed(version, other.to_string()),
        }
    }
}
