//! Typed access to collections.
//!
//! Records are stored as JSON objects. An [`Entity`] is a serde type bound
//! to one collection, and [`TypedCollection`] converts on the way in and
//! out so callers never handle raw values.
//!
//! # Example
//!
//! ```rust,ignore
//! use wellstore_core::entity::{MoodEntry, TypedCollection};
//!
//! let moods = store.collection::<MoodEntry>();
//! moods.put(&MoodEntry { id: "m1".into(), date: "2024-05-01".into(), mood: "calm".into(), score: 4, note: None })?;
//! let today = moods.query_by_index("date", KeyValue::from("2024-05-01"))?;
//! ```

mod wellness;

pub use wellness::{
    CharacterState, ConversationMessage, FoodReflection, HealthCondition, IngredientList,
    JournalEntry, MealSuggestion, MedicalRecord, MoodEntry, SugarCup, SymptomEntry,
    UserPreferences,
};

use crate::error::{CoreError, CoreResult};
use crate::key::{KeyRange, KeyValue};
use crate::store::Store;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;

/// A record type stored in one collection.
pub trait Entity: Serialize + DeserializeOwned {
    /// Collection the type lives in.
    const COLLECTION: &'static str;

    /// The record's primary key.
    fn key(&self) -> &str;
}

/// Type-safe view of one collection.
pub struct TypedCollection<'a, T: Entity> {
    store: &'a Store,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Entity> TypedCollection<'a, T> {
    /// Creates a view over `store`.
    #[must_use]
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        T::COLLECTION
    }

    fn encode(entity: &T) -> CoreResult<Value> {
        serde_json::to_value(entity).map_err(|e| CoreError::invalid_record(T::COLLECTION, e.to_string()))
    }

    fn decode(record: Value) -> CoreResult<T> {
        serde_json::from_value(record)
            .map_err(|e| CoreError::codec(format!("{} record does not decode: {e}", T::COLLECTION)))
    }

    fn decode_all(records: Vec<Value>) -> CoreResult<Vec<T>> {
        records.into_iter().map(Self::decode).collect()
    }

    /// Gets an entity by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection is missing or the row does not decode.
    pub fn get(&self, key: &str) -> CoreResult<Option<T>> {
        self.store
            .get(T::COLLECTION, key)?
            .map(Self::decode)
            .transpose()
    }

    /// Gets an entity that must exist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not.
    pub fn require(&self, key: &str) -> CoreResult<T> {
        Self::decode(self.store.require(T::COLLECTION, key)?)
    }

    /// Inserts or overwrites an entity.
    ///
    /// # Errors
    ///
    /// Same as [`Store::put`].
    pub fn put(&self, entity: &T) -> CoreResult<()> {
        self.store.put(T::COLLECTION, Self::encode(entity)?)?;
        Ok(())
    }

    /// Deletes an entity by key.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not exist.
    pub fn delete(&self, key: &str) -> CoreResult<()> {
        self.store.delete(T::COLLECTION, key)
    }

    /// Deletes the stored copy of `entity`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not exist.
    pub fn remove(&self, entity: &T) -> CoreResult<()> {
        self.delete(entity.key())
    }

    /// Every entity in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if a row does not decode.
    pub fn all(&self) -> CoreResult<Vec<T>> {
        Self::decode_all(self.store.get_all(T::COLLECTION)?)
    }

    /// Number of entities.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection is missing.
    pub fn count(&self) -> CoreResult<usize> {
        self.store.count(T::COLLECTION)
    }

    /// Entities whose key on `index` falls in `range`.
    ///
    /// # Errors
    ///
    /// Same as [`Store::query_by_index`].
    pub fn query_by_index(&self, index: &str, range: impl Into<KeyRange>) -> CoreResult<Vec<T>> {
        Self::decode_all(self.store.query_by_index(T::COLLECTION, index, range)?)
    }

    /// Entities whose compound key on `index` starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Same as [`Store::query_by_compound_index`].
    pub fn query_by_compound_index(&self, index: &str, prefix: &[KeyValue]) -> CoreResult<Vec<T>> {
        Self::decode_all(self.store.query_by_compound_index(T::COLLECTION, index, prefix)?)
    }
}

impl Store {
    /// Typed view of the collection `T` lives in.
    #[must_use]
    pub fn collection<T: Entity>(&self) -> TypedCollection<'_, T> {
        TypedCollection::new(self)
    }
}
