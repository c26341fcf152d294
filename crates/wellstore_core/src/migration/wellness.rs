//! The released wellness schema history, v1 through v5.

use super::{Migration, MigrationPlan, UpgradeTransaction};
use crate::error::CoreResult;
use crate::schema::wellness::{
    collections::FOOD_REFLECTIONS, food_reflections, legacy_food_reflections, wellness_registry,
};
use crate::schema::SchemaRegistry;
use serde_json::Value;
use std::sync::Arc;

/// Meal type given to reflections logged before meal types existed.
pub const UNSPECIFIED_MEAL_TYPE: &str = "unspecified";

fn ensure_introduced(
    tx: &mut UpgradeTransaction<'_>,
    registry: &SchemaRegistry,
    version: u32,
) -> CoreResult<()> {
    for schema in registry.introduced_in(version) {
        tx.ensure_collection(schema)?;
    }
    Ok(())
}

/// v1: medical records, conditions, symptoms, mood, journal, preferences.
#[derive(Debug, Default)]
pub struct CoreHealthRecords;

impl Migration for CoreHealthRecords {
    fn version(&self) -> u32 {
        1
    }

    fn name(&self) -> &str {
        "core_health_records"
    }

    fn description(&self) -> &str {
        "create health record, mood, journal and preference collections"
    }

    fn up(&self, tx: &mut UpgradeTransaction<'_>) -> CoreResult<()> {
        ensure_introduced(tx, &wellness_registry()?, 1)
    }
}

/// v2: ingredient lists, meal suggestions, food reflections, sugar cups.
///
/// Food reflections are created in their released shape, with a unique
/// `date` index; v4 corrects it.
#[derive(Debug, Default)]
pub struct Nutrition;

impl Migration for Nutrition {
    fn version(&self) -> u32 {
        2
    }

    fn name(&self) -> &str {
        "nutrition"
    }

    fn description(&self) -> &str {
        "create ingredient, meal suggestion, food reflection and sugar cup collections"
    }

    fn up(&self, tx: &mut UpgradeTransaction<'_>) -> CoreResult<()> {
        let registry = wellness_registry()?;
        for schema in registry.introduced_in(2) {
            if schema.name == FOOD_REFLECTIONS {
                if !tx.has_collection(FOOD_REFLECTIONS) {
                    tx.ensure_collection(&legacy_food_reflections())?;
                }
            } else {
                tx.ensure_collection(schema)?;
            }
        }
        Ok(())
    }
}

/// v3: companion character state and conversation history.
#[derive(Debug, Default)]
pub struct Companion;

impl Migration for Companion {
    fn version(&self) -> u32 {
        3
    }

    fn name(&self) -> &str {
        "companion"
    }

    fn description(&self) -> &str {
        "create character state and conversation collections"
    }

    fn up(&self, tx: &mut UpgradeTransaction<'_>) -> CoreResult<()> {
        ensure_introduced(tx, &wellness_registry()?, 3)
    }
}

/// v4: lets several meals share a date.
///
/// An index's uniqueness cannot change in place, so the collection is
/// rebuilt. Skipped if the live `date` index is already non-unique.
#[derive(Debug, Default)]
pub struct FoodReflectionDateIndex;

impl Migration for FoodReflectionDateIndex {
    fn version(&self) -> u32 {
        4
    }

    fn name(&self) -> &str {
        "food_reflection_date_index"
    }

    fn description(&self) -> &str {
        "make foodReflections.date non-unique and add the date_mealType index"
    }

    fn up(&self, tx: &mut UpgradeTransaction<'_>) -> CoreResult<()> {
        let target = food_reflections();
        let date_is_unique = tx
            .index_schema(FOOD_REFLECTIONS, "date")
            .is_some_and(|index| index.unique);

        if date_is_unique {
            tx.rebuild_collection(&target)?;
        } else {
            tx.ensure_collection(&target)?;
        }
        Ok(())
    }
}

/// v5: gives legacy reflections a meal type and an update time.
#[derive(Debug, Default)]
pub struct MealTypeBackfill;

impl Migration for MealTypeBackfill {
    fn version(&self) -> u32 {
        5
    }

    fn name(&self) -> &str {
        "meal_type_backfill"
    }

    fn description(&self) -> &str {
        "set mealType and updatedAt on food reflections that lack a meal type"
    }

    fn up(&self, tx: &mut UpgradeTransaction<'_>) -> CoreResult<()> {
        let now = tx.now();
        tx.backfill(FOOD_REFLECTIONS, |fields| {
            let missing = fields.get("mealType").map_or(true, Value::is_null);
            if missing {
                fields.insert("mealType".into(), Value::from(UNSPECIFIED_MEAL_TYPE));
                fields.insert("updatedAt".into(), Value::from(now));
            }
            missing
        })?;
        Ok(())
    }
}

/// The full wellness plan, v1 through v5.
#[must_use]
pub fn wellness_plan() -> MigrationPlan {
    let steps: [Arc<dyn Migration>; 5] = [
        Arc::new(CoreHealthRecords),
        Arc::new(Nutrition),
        Arc::new(Companion),
        Arc::new(FoodReflectionDateIndex),
        Arc::new(MealTypeBackfill),
    ];
    MigrationPlan::sequential(steps)
}
