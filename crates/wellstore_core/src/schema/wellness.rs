//! Collection declarations for the wellness application.

use super::{CollectionSchema, IndexSchema, SchemaRegistry};
use crate::error::CoreResult;
use crate::migration::version_collection;

/// Latest released schema version.
pub const WELLNESS_SCHEMA_VERSION: u32 = 5;

/// Persisted collection names.
pub mod collections {
    /// Uploaded medical documents.
    pub const MEDICAL_RECORDS: &str = "medicalRecords";
    /// Diagnosed or tracked conditions.
    pub const HEALTH_CONDITIONS: &str = "healthConditions";
    /// Symptom log.
    pub const SYMPTOM_ENTRIES: &str = "symptomEntries";
    /// Mood log.
    pub const MOOD_ENTRIES: &str = "moodEntries";
    /// Free-form journal.
    pub const JOURNAL_ENTRIES: &str = "journalEntries";
    /// Singleton user preferences.
    pub const USER_PREFERENCES: &str = "userPreferences";
    /// Ingredient lists captured from the fridge or a receipt.
    pub const INGREDIENT_LISTS: &str = "ingredientLists";
    /// Meals suggested for an ingredient list.
    pub const MEAL_SUGGESTIONS: &str = "mealSuggestions";
    /// Post-meal reflections.
    pub const FOOD_REFLECTIONS: &str = "foodReflections";
    /// Sugar-reduction cups.
    pub const SUGAR_CUPS: &str = "sugarCups";
    /// Companion character relationship state.
    pub const CHARACTER_STATES: &str = "characterStates";
    /// Companion conversation messages.
    pub const CONVERSATIONS: &str = "conversations";
}

use collections::*;

/// Singleton key of the user preferences row.
pub const PREFERENCES_KEY: &str = "preferences";

/// Name of the compound index listing one character's messages by time.
pub const CHARACTER_TIMESTAMP_INDEX: &str = "characterId_timestamp";

/// `foodReflections` as released in v2, with the unique `date` index that
/// blocked logging two meals on one day.
#[must_use]
pub fn legacy_food_reflections() -> CollectionSchema {
    CollectionSchema::new(FOOD_REFLECTIONS, "id")
        .with_index(IndexSchema::on("date").unique())
        .with_index(IndexSchema::on("mealType"))
}

/// `foodReflections` after the v4 correction.
#[must_use]
pub fn food_reflections() -> CollectionSchema {
    CollectionSchema::new(FOOD_REFLECTIONS, "id")
        .with_index(IndexSchema::on("date"))
        .with_index(IndexSchema::on("mealType"))
        .with_index(IndexSchema::compound(["date", "mealType"]))
}

/// Builds the registry holding every collection at its current shape.
///
/// # Errors
///
/// Returns an error if a declaration is invalid or a name repeats.
pub fn wellness_registry() -> CoreResult<SchemaRegistry> {
    let declarations = [
        // v1
        (
            1,
            CollectionSchema::new(MEDICAL_RECORDS, "id")
                .with_index(IndexSchema::on("uploadDate"))
                .with_index(IndexSchema::on("processingStatus")),
        ),
        (
            1,
            CollectionSchema::new(HEALTH_CONDITIONS, "id")
                .with_index(IndexSchema::on("name").unique())
                .with_index(IndexSchema::on("status")),
        ),
        (
            1,
            CollectionSchema::new(SYMPTOM_ENTRIES, "id")
                .with_index(IndexSchema::on("date"))
                .with_index(IndexSchema::on("conditionId")),
        ),
        (
            1,
            CollectionSchema::new(MOOD_ENTRIES, "id").with_index(IndexSchema::on("date")),
        ),
        (
            1,
            CollectionSchema::new(JOURNAL_ENTRIES, "id")
                .with_index(IndexSchema::on("date"))
                .with_index(IndexSchema::on("createdAt")),
        ),
        (1, CollectionSchema::new(USER_PREFERENCES, "id")),
        (1, version_collection()),
        // v2
        (
            2,
            CollectionSchema::new(INGREDIENT_LISTS, "id").with_index(IndexSchema::on("createdAt")),
        ),
        (
            2,
            CollectionSchema::new(MEAL_SUGGESTIONS, "id")
                .with_index(IndexSchema::on("ingredientListId"))
                .with_index(IndexSchema::on("createdAt")),
        ),
        (2, food_reflections()),
        (
            2,
            CollectionSchema::new(SUGAR_CUPS, "id").with_index(IndexSchema::on("date")),
        ),
        // v3
        (
            3,
            CollectionSchema::new(CHARACTER_STATES, "characterId")
                .with_index(IndexSchema::on("lastInteraction")),
        ),
        (
            3,
            CollectionSchema::new(CONVERSATIONS, "id")
                .with_index(IndexSchema::on("characterId"))
                .with_index(IndexSchema::on("timestamp"))
                .with_index(IndexSchema::compound(["characterId", "timestamp"])),
        ),
    ];

    let mut registry = SchemaRegistry::new();
    for (since, schema) in declarations {
        registry.declare(since, schema)?;
    }
    Ok(registry)
}
