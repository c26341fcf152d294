//! Schema registry: collections, primary keys and index declarations.
//!
//! The registry is a static description. It creates nothing by itself;
//! migration steps hand its definitions to
//! [`UpgradeTransaction::ensure_collection`](crate::migration::UpgradeTransaction::ensure_collection).

pub mod wellness;

use crate::error::{CoreError, CoreResult};
use crate::key::KeyPath;
use serde::{Deserialize, Serialize};

/// Declaration of one secondary or compound index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    /// Index name, unique within its collection.
    pub name: String,
    /// Field or fields the index reads.
    pub key_path: KeyPath,
    /// Whether two records may share a key.
    pub unique: bool,
}

impl IndexSchema {
    /// Declares a non-unique index on one field, named after the field.
    pub fn on(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            name: field.clone(),
            key_path: KeyPath::Single(field),
            unique: false,
        }
    }

    /// Declares a non-unique compound index named `a_b_...`.
    pub fn compound<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        Self {
            name: fields.join("_"),
            key_path: KeyPath::Compound(fields),
            unique: false,
        }
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Overrides the generated name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Declaration of one entity collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Collection name.
    pub name: String,
    /// Field holding the string primary key.
    pub key_path: String,
    /// Declared indexes.
    pub indexes: Vec<IndexSchema>,
}

impl CollectionSchema {
    /// Declares a collection with no indexes.
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            indexes: Vec::new(),
        }
    }

    /// Adds an index declaration.
    #[must_use]
    pub fn with_index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    /// Looks up an index declaration by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Checks the declaration is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for empty names, empty key paths or
    /// duplicate index names.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::invalid_operation("collection name is empty"));
        }
        if self.key_path.is_empty() {
            return Err(CoreError::invalid_operation(format!(
                "collection {} has an empty key path",
                self.name
            )));
        }
        for (i, index) in self.indexes.iter().enumerate() {
            if index.name.is_empty() || index.key_path.fields().iter().any(|f| f.is_empty()) {
                return Err(CoreError::invalid_operation(format!(
                    "collection {} declares an index with an empty name or field",
                    self.name
                )));
            }
            if self.indexes[..i].iter().any(|other| other.name == index.name) {
                return Err(CoreError::invalid_operation(format!(
                    "collection {} declares index {} twice",
                    self.name, index.name
                )));
            }
        }
        Ok(())
    }
}

/// A collection declaration plus the schema version that introduced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredCollection {
    /// Version whose migration step creates the collection.
    pub since: u32,
    /// Final (current) declaration.
    pub schema: CollectionSchema,
}

/// Ordered set of collection declarations.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    collections: Vec<RegisteredCollection>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a collection introduced at `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the declaration is invalid or the name is taken.
    pub fn declare(&mut self, since: u32, schema: CollectionSchema) -> CoreResult<()> {
        schema.validate()?;
        if self.get(&schema.name).is_some() {
            return Err(CoreError::invalid_operation(format!(
                "collection {} declared twice",
                schema.name
            )));
        }
        self.collections.push(RegisteredCollection { since, schema });
        Ok(())
    }

    /// Looks up a collection declaration.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections
            .iter()
            .find(|c| c.schema.name == name)
            .map(|c| &c.schema)
    }

    /// Looks up a collection declaration, failing if it is unknown.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if the name is not declared.
    pub fn require(&self, name: &str) -> CoreResult<&CollectionSchema> {
        self.get(name)
            .ok_or_else(|| CoreError::collection_not_found(name))
    }

    /// Collections introduced exactly at `version`, in declaration order.
    pub fn introduced_in(&self, version: u32) -> impl Iterator<Item = &CollectionSchema> {
        self.collections
            .iter()
            .filter(move |c| c.since == version)
            .map(|c| &c.schema)
    }

    /// All declarations in order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredCollection> {
        self.collections.iter()
    }

    /// Number of declared collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Returns true if nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}
