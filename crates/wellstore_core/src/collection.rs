//! In-memory collection state: records plus their secondary indexes.

use crate::error::{CoreError, CoreResult};
use crate::index::SecondaryIndex;
use crate::key::{lookup_field, KeyRange, KeyValue};
use crate::schema::{CollectionSchema, IndexSchema};
use serde_json::Value;
use std::collections::BTreeMap;

/// One live collection.
///
/// Records are keyed by their string primary key and kept in key order.
/// Every index is updated in the same call that changes a record, so a
/// reader never sees an index out of step with the rows.
#[derive(Debug, Clone)]
pub struct CollectionState {
    schema: CollectionSchema,
    records: BTreeMap<String, Value>,
    indexes: Vec<SecondaryIndex>,
}

impl CollectionState {
    /// Creates an empty collection with the declared indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the declaration is invalid.
    pub fn new(schema: CollectionSchema) -> CoreResult<Self> {
        schema.validate()?;
        let indexes = schema
            .indexes
            .iter()
            .map(|i| SecondaryIndex::new(&schema.name, i.clone()))
            .collect();
        Ok(Self {
            schema,
            records: BTreeMap::new(),
            indexes,
        })
    }

    /// Current declaration, including indexes added after creation.
    #[must_use]
    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Reads the primary key of `record`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` if the record is not an object or its key
    /// field is missing, empty or not a string.
    pub fn primary_key(&self, record: &Value) -> CoreResult<String> {
        if !record.is_object() {
            return Err(CoreError::invalid_record(self.name(), "record is not an object"));
        }
        match lookup_field(record, &self.schema.key_path) {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            Some(_) => Err(CoreError::invalid_record(
                self.name(),
                format!("primary key {} must be a non-empty string", self.schema.key_path),
            )),
            None => Err(CoreError::invalid_record(
                self.name(),
                format!("missing primary key {}", self.schema.key_path),
            )),
        }
    }

    /// Validates a put without applying it and returns the record's key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRecord` for an unkeyed record or `ConstraintViolation`
    /// if a unique index already holds one of its keys for another record.
    pub fn check_put(&self, record: &Value) -> CoreResult<String> {
        let id = self.primary_key(record)?;
        for index in &self.indexes {
            if let Some(key) = index.key_for(record) {
                index.check(&key, &id)?;
            }
        }
        Ok(id)
    }

    /// Inserts or overwrites a record, returning the previous version.
    ///
    /// # Errors
    ///
    /// Same as [`check_put`](Self::check_put); nothing changes on error.
    pub fn apply_put(&mut self, record: Value) -> CoreResult<Option<Value>> {
        let id = self.check_put(&record)?;
        let previous = self.records.remove(&id);
        if let Some(old) = &previous {
            self.unindex(&id, old);
        }
        for index in &mut self.indexes {
            if let Some(key) = index.key_for(&record) {
                index.insert(key, &id)?;
            }
        }
        self.records.insert(id, record);
        Ok(previous)
    }

    /// Removes a record, returning it if it existed.
    pub fn delete(&mut self, id: &str) -> Option<Value> {
        let removed = self.records.remove(id)?;
        self.unindex(id, &removed);
        Some(removed)
    }

    fn unindex(&mut self, id: &str, record: &Value) {
        for index in &mut self.indexes {
            if let Some(key) = index.key_for(record) {
                index.remove(&key, id);
            }
        }
    }

    /// Looks up a record by primary key.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.records.get(id)
    }

    /// All records in primary-key order.
    pub fn records(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.records.iter().map(|(id, r)| (id.as_str(), r))
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the collection holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Live indexes in declaration order.
    pub fn indexes(&self) -> impl Iterator<Item = &SecondaryIndex> {
        self.indexes.iter()
    }

    /// Looks up a live index.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotFound` if no index has that name.
    pub fn index(&self, name: &str) -> CoreResult<&SecondaryIndex> {
        self.indexes
            .iter()
            .find(|i| i.schema().name == name)
            .ok_or_else(|| CoreError::index_not_found(self.name(), name))
    }

    /// Adds an index and fills it from the existing records.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the name is taken, or
    /// `ConstraintViolation` if a unique index meets duplicate data.
    pub fn create_index(&mut self, schema: IndexSchema) -> CoreResult<()> {
        if self.index(&schema.name).is_ok() {
            return Err(CoreError::invalid_operation(format!(
                "index {} already exists on {}",
                schema.name,
                self.name()
            )));
        }
        let mut index = SecondaryIndex::new(self.name(), schema.clone());
        index.rebuild(self.records())?;
        self.indexes.push(index);
        self.schema.indexes.push(schema);
        Ok(())
    }

    /// Records whose key on index `name` falls in `range`, in key order.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotFound` for an unknown index.
    pub fn query_index(&self, name: &str, range: &KeyRange) -> CoreResult<Vec<Value>> {
        let ids = self.index(name)?.range(range);
        Ok(self.resolve(ids))
    }

    /// Records whose compound key on index `name` starts with `prefix`,
    /// ordered by the remaining components.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotFound` for an unknown index, or `InvalidOperation`
    /// if the index is not compound or the prefix is longer than its key.
    pub fn query_prefix(&self, name: &str, prefix: &[KeyValue]) -> CoreResult<Vec<Value>> {
        let index = self.index(name)?;
        let fields = index.schema().key_path.fields().len();
        if !index.schema().key_path.is_compound() {
            return Err(CoreError::invalid_operation(format!(
                "index {name} on {} is not compound",
                self.name()
            )));
        }
        if prefix.len() > fields {
            return Err(CoreError::invalid_operation(format!(
                "prefix of {} values is longer than index {name} ({fields} fields)",
                prefix.len()
            )));
        }
        Ok(self.resolve(index.prefix(prefix)))
    }

    fn resolve(&self, ids: Vec<String>) -> Vec<Value> {
        ids.into_iter()
            .filter_map(|id| self.records.get(&id).cloned())
            .collect()
    }

    /// Rebuilds every index from the rows and reports any that disagree
    /// with the live copy.
    #[must_use]
    pub fn integrity_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (id, record) in self.records() {
            match self.primary_key(record) {
                Ok(key) if key == id => {}
                Ok(key) => problems.push(format!(
                    "{}: record stored under {id:?} is keyed {key:?}",
                    self.name()
                )),
                Err(e) => problems.push(e.to_string()),
            }
        }
        for live in &self.indexes {
            let mut fresh = SecondaryIndex::new(self.name(), live.schema().clone());
            match fresh.rebuild(self.records()) {
                Err(e) => problems.push(e.to_string()),
                Ok(()) => {
                    if !fresh.iter().eq(live.iter()) {
                        problems.push(format!(
                            "index {}.{} does not match its records",
                            self.name(),
                            live.schema().name
                        ));
                    }
                }
            }
        }
        problems
    }
}
