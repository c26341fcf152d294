//! Wellness record types.
//!
//! Field names are camelCase on disk. Optional fields are omitted when
//! empty so a record reads back exactly as it was written.

use super::Entity;
use crate::schema::wellness::collections;
use serde::{Deserialize, Serialize};

macro_rules! entity {
    ($ty:ty, $collection:expr, $key:ident) => {
        impl Entity for $ty {
            const COLLECTION: &'static str = $collection;

            fn key(&self) -> &str {
                &self.$key
            }
        }
    };
}

/// An uploaded medical document and its processing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecord {
    /// Primary key.
    pub id: String,
    /// Original file name.
    pub file_name: String,
    /// MIME type.
    pub file_type: String,
    /// Upload date, ISO 8601.
    pub upload_date: String,
    /// `pending`, `processing`, `completed` or `failed`.
    pub processing_status: String,
    /// Text extracted from the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
    /// Generated summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

entity!(MedicalRecord, collections::MEDICAL_RECORDS, id);

/// A diagnosed or tracked condition. Names are unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCondition {
    /// Primary key.
    pub id: String,
    /// Condition name.
    pub name: String,
    /// `active`, `managed` or `resolved`.
    pub status: String,
    /// Diagnosis date, ISO 8601.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosed_date: Option<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

entity!(HealthCondition, collections::HEALTH_CONDITIONS, id);

/// One logged symptom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymptomEntry {
    /// Primary key.
    pub id: String,
    /// Day of the symptom, ISO 8601.
    pub date: String,
    /// Symptom description.
    pub symptom: String,
    /// Severity, 1 to 10.
    pub severity: u8,
    /// Related condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_id: Option<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

entity!(SymptomEntry, collections::SYMPTOM_ENTRIES, id);

/// One mood check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
    /// Primary key.
    pub id: String,
    /// Day of the check-in, ISO 8601.
    pub date: String,
    /// Mood label.
    pub mood: String,
    /// Mood score.
    pub score: i32,
    /// Free-form note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

entity!(MoodEntry, collections::MOOD_ENTRIES, id);

/// A journal page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    /// Primary key.
    pub id: String,
    /// Day the entry is about, ISO 8601.
    pub date: String,
    /// Entry text.
    pub content: String,
    /// Creation time, ms since the epoch.
    pub created_at: i64,
}

entity!(JournalEntry, collections::JOURNAL_ENTRIES, id);

/// The single user preferences row, keyed `"preferences"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    /// Always [`PREFERENCES_KEY`](crate::schema::wellness::PREFERENCES_KEY).
    pub id: String,
    /// UI language code.
    pub language: String,
    /// UI theme.
    pub theme: String,
    /// Whether reminders are enabled.
    pub notifications_enabled: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            id: crate::schema::wellness::PREFERENCES_KEY.to_string(),
            language: "en".to_string(),
            theme: "light".to_string(),
            notifications_enabled: true,
        }
    }
}

entity!(UserPreferences, collections::USER_PREFERENCES, id);

/// Ingredients captured from the fridge or a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientList {
    /// Primary key.
    pub id: String,
    /// Ingredient names.
    pub ingredients: Vec<String>,
    /// Where the list came from (`photo`, `receipt`, `manual`).
    pub source: String,
    /// Creation time, ms since the epoch.
    pub created_at: i64,
}

entity!(IngredientList, collections::INGREDIENT_LISTS, id);

/// A meal suggested for an ingredient list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealSuggestion {
    /// Primary key.
    pub id: String,
    /// Source ingredient list.
    pub ingredient_list_id: String,
    /// Meal name.
    pub name: String,
    /// Preparation notes.
    pub description: String,
    /// Creation time, ms since the epoch.
    pub created_at: i64,
}

entity!(MealSuggestion, collections::MEAL_SUGGESTIONS, id);

/// How a meal felt afterwards. Several may share a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodReflection {
    /// Primary key.
    pub id: String,
    /// Day of the meal, ISO 8601.
    pub date: String,
    /// `breakfast`, `lunch`, `dinner`, `snack` or `unspecified`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_type: Option<String>,
    /// How the meal felt.
    pub feeling: String,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Last update, ms since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

entity!(FoodReflection, collections::FOOD_REFLECTIONS, id);

/// Sugary drinks logged on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SugarCup {
    /// Primary key.
    pub id: String,
    /// Day, ISO 8601.
    pub date: String,
    /// Cups consumed.
    pub cups: u32,
    /// Daily goal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<u32>,
}

entity!(SugarCup, collections::SUGAR_CUPS, id);

/// Relationship state with one companion character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterState {
    /// Primary key.
    pub character_id: String,
    /// Affection level.
    pub affection: i32,
    /// Last interaction, ms since the epoch.
    pub last_interaction: i64,
    /// Current mood label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
}

entity!(CharacterState, collections::CHARACTER_STATES, character_id);

/// One message exchanged with a companion character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    /// Primary key.
    pub id: String,
    /// Character spoken to.
    pub character_id: String,
    /// `user` or `character`.
    pub role: String,
    /// Message text.
    pub content: String,
    /// Send time, ms since the epoch.
    pub timestamp: i64,
}

entity!(ConversationMessage, collections::CONVERSATIONS, id);
