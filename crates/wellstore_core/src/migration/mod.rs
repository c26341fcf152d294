//! Schema versioning and upgrade.
//!
//! ## Design
//!
//! Upgrades are:
//! - **Forward-only**: a target below the persisted version is rejected
//! - **Version-gated**: step `v` runs only if the persisted version is below `v`
//! - **All-or-nothing**: every step of one upgrade commits as a single log
//!   frame, together with the new version marker
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wellstore_core::migration::{Migration, MigrationPlan, UpgradeTransaction};
//!
//! struct AddMoodIndex;
//! impl Migration for AddMoodIndex {
//!     fn version(&self) -> u32 { 1 }
//!     fn name(&self) -> &str { "add_mood_index" }
//!     fn up(&self, tx: &mut UpgradeTransaction<'_>) -> CoreResult<()> {
//!         tx.ensure_index("moodEntries", &IndexSchema::on("date"))?;
//!         Ok(())
//!     }
//! }
//!
//! let mut plan = MigrationPlan::new();
//! plan.register(AddMoodIndex)?;
//! store.upgrade(&plan, 1)?;
//! ```

mod transaction;
pub mod wellness;

pub use transaction::{AppliedStep, MigrationOperation, MigrationReport, UpgradeTransaction};

use crate::error::{CoreError, CoreResult};
use crate::log::LogEntry;
use crate::schema::CollectionSchema;
use crate::state::StoreState;
use crate::types::now_millis;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Engine-owned collection holding the version marker.
pub const VERSION_COLLECTION: &str = "dbVersion";
/// Primary key field of the version collection.
pub const VERSION_KEY_PATH: &str = "id";
/// Primary key of the single version marker row.
pub const VERSION_KEY: &str = "version";

/// The persisted schema version row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMarker {
    /// Highest fully applied version.
    pub version: u32,
    /// When that version was committed, in ms since the epoch.
    pub last_migration: i64,
}

impl VersionMarker {
    /// Reads the marker from a store state. `None` for a store that was
    /// never upgraded.
    ///
    /// # Errors
    ///
    /// Returns `Codec` if the row exists but is malformed.
    pub fn read(state: &StoreState) -> CoreResult<Option<Self>> {
        let Ok(collection) = state.collection(VERSION_COLLECTION) else {
            return Ok(None);
        };
        collection
            .get(VERSION_KEY)
            .map(|row| {
                serde_json::from_value(row.clone())
                    .map_err(|e| CoreError::codec(format!("malformed version marker: {e}")))
            })
            .transpose()
    }

    /// Renders the marker as its stored row.
    #[must_use]
    pub fn to_record(&self) -> Value {
        serde_json::json!({
            VERSION_KEY_PATH: VERSION_KEY,
            "version": self.version,
            "lastMigration": self.last_migration,
        })
    }
}

/// Declaration of the version collection.
#[must_use]
pub fn version_collection() -> CollectionSchema {
    CollectionSchema::new(VERSION_COLLECTION, VERSION_KEY_PATH)
}

/// A single schema upgrade step.
pub trait Migration: Send + Sync {
    /// Version this step brings the store to. Unique within a plan.
    fn version(&self) -> u32;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// What the step does.
    fn description(&self) -> &str {
        ""
    }

    /// Applies the step.
    ///
    /// # Errors
    ///
    /// Any error aborts the whole upgrade.
    fn up(&self, tx: &mut UpgradeTransaction<'_>) -> CoreResult<()>;
}

/// Information about a registered step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationInfo {
    /// Step version.
    pub version: u32,
    /// Step name.
    pub name: String,
    /// Step description.
    pub description: String,
}

/// Ordered set of migration steps.
#[derive(Clone, Default)]
pub struct MigrationPlan {
    migrations: BTreeMap<u32, Arc<dyn Migration>>,
}

impl MigrationPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a step.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for version 0 or a version already taken.
    pub fn register<M: Migration + 'static>(&mut self, migration: M) -> CoreResult<()> {
        self.register_arc(Arc::new(migration))
    }

    /// Registers a shared step.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_arc(&mut self, migration: Arc<dyn Migration>) -> CoreResult<()> {
        let version = migration.version();
        if version == 0 {
            return Err(CoreError::invalid_operation("migration version 0 is reserved"));
        }
        if self.migrations.contains_key(&version) {
            return Err(CoreError::invalid_operation(format!(
                "migration version {version} already registered"
            )));
        }
        self.migrations.insert(version, migration);
        Ok(())
    }

    /// Builds a plan from steps listed in version order. The first step is
    /// keyed as v1, the next as v2, and so on.
    ///
    /// A step whose own version disagrees with its position is reported by
    /// [`validate`](Self::validate), which every upgrade runs first.
    #[must_use]
    pub fn sequential<I>(steps: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Migration>>,
    {
        Self {
            migrations: (1u32..).zip(steps).collect(),
        }
    }

    /// Highest registered version, 0 for an empty plan.
    #[must_use]
    pub fn latest(&self) -> u32 {
        self.migrations.keys().next_back().copied().unwrap_or(0)
    }

    /// Number of registered steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Returns true if no steps are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Registered steps in version order.
    #[must_use]
    pub fn list(&self) -> Vec<MigrationInfo> {
        self.migrations.values().map(|m| info(m.as_ref())).collect()
    }

    /// Steps that an upgrade from `current` to `target` would run.
    #[must_use]
    pub fn pending(&self, current: u32, target: u32) -> Vec<MigrationInfo> {
        self.steps_between(current, target)
            .map(|m| info(m.as_ref()))
            .collect()
    }

    fn steps_between(&self, current: u32, target: u32) -> impl Iterator<Item = &Arc<dyn Migration>> {
        self.migrations
            .range(1..=target)
            .filter(move |(v, _)| current < **v)
            .map(|(_, m)| m)
    }

    /// Validates that versions run 1..=N with no gaps and that every step
    /// sits at the version it declares.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` naming the first gap.
    pub fn validate(&self) -> CoreResult<()> {
        for (i, (version, migration)) in self.migrations.iter().enumerate() {
            let expected = i as u32 + 1;
            if *version != expected {
                return Err(CoreError::invalid_operation(format!(
                    "migration version gap: expected {expected}, got {version}"
                )));
            }
            if migration.version() != *version {
                return Err(CoreError::invalid_operation(format!(
                    "migration {} declares v{} but is listed as v{version}",
                    migration.name(),
                    migration.version()
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MigrationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.migrations.values().map(|m| (m.version(), m.name().to_string())))
            .finish()
    }
}

fn info(m: &dyn Migration) -> MigrationInfo {
    MigrationInfo {
        version: m.version(),
        name: m.name().to_string(),
        description: m.description().to_string(),
    }
}

/// A computed upgrade, not yet committed.
#[derive(Debug)]
pub(crate) struct StagedUpgrade {
    pub state: StoreState,
    pub entries: Vec<LogEntry>,
    pub report: MigrationReport,
}

/// Runs every step between the persisted version and `target` against a
/// copy of `state`.
///
/// Returns `None` if the store is already at `target`.
pub(crate) fn stage(
    state: &StoreState,
    plan: &MigrationPlan,
    target: u32,
) -> CoreResult<Option<StagedUpgrade>> {
    let old = VersionMarker::read(state)?.map_or(0, |m| m.version);
    if target < old {
        return Err(CoreError::VersionDowngrade {
            persisted: old,
            requested: target,
        });
    }
    if target == old {
        return Ok(None);
    }
    if target > plan.latest() {
        return Err(CoreError::migration_failed(
            target,
            format!("no migration registered for v{target} (latest is v{})", plan.latest()),
        ));
    }
    plan.validate()
        .map_err(|e| e.into_migration_failure(target))?;

    tracing::info!(from = old, to = target, "upgrading store schema");

    let mut staged = state.clone();
    let now = now_millis();
    let mut tx = UpgradeTransaction::new(&mut staged, old, target, now);

    for migration in plan.steps_between(old, target) {
        let version = migration.version();
        tracing::info!(version, name = migration.name(), "applying migration step");
        tx.begin_step(version, migration.name());
        migration
            .up(&mut tx)
            .map_err(|e| e.into_migration_failure(version))?;
    }

    tx.end_steps();
    tx.ensure_collection(&version_collection())
        .map_err(|e| e.into_migration_failure(target))?;
    let marker = VersionMarker {
        version: target,
        last_migration: now,
    };
    tx.set_version(VERSION_COLLECTION, marker.to_record(), target)
        .map_err(|e| e.into_migration_failure(target))?;

    let (entries, report) = tx.finish();
    Ok(Some(StagedUpgrade {
        state: staged,
        entries,
        report,
    }))
}
