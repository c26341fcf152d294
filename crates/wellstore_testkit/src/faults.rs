//! Fault injection.
//!
//! [`FaultSwitch`] hands out backends whose writes can be failed on demand,
//! and the migration wrappers here fail or count upgrade steps so tests can
//! check atomicity and single-flight behavior.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wellstore_core::migration::wellness::{
    Companion, CoreHealthRecords, FoodReflectionDateIndex, MealTypeBackfill, Nutrition,
};
use wellstore_core::{CoreError, CoreResult, Migration, MigrationPlan, StoreConfig, UpgradeTransaction};
use wellstore_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};

/// Shared toggle for [`FailingBackend`]s.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    buffer: InMemoryBackend,
    fail_writes: Arc<AtomicBool>,
    failures: Arc<AtomicUsize>,
}

impl FaultSwitch {
    /// Creates a switch over a fresh buffer, writes enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent append, sync and replace fail.
    pub fn trip(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Lets writes through again.
    pub fn heal(&self) {
        self.fail_writes.store(false, Ordering::SeqCst);
    }

    /// Number of writes refused so far.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// The buffer all backends from this switch write to.
    pub fn buffer(&self) -> &InMemoryBackend {
        &self.buffer
    }

    /// A backend over the shared buffer.
    pub fn backend(&self) -> FailingBackend {
        FailingBackend {
            inner: self.buffer.clone(),
            switch: self.clone(),
        }
    }

    /// A store configuration opening backends from this switch.
    pub fn config(&self) -> StoreConfig {
        let switch = self.clone();
        StoreConfig::with_backend(move || Ok(Box::new(switch.backend()) as Box<dyn StorageBackend>))
    }

    fn check(&self, op: &str) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::unavailable(format!("injected {op} failure")))
        } else {
            Ok(())
        }
    }
}

/// A memory backend whose writes fail while its switch is tripped.
#[derive(Debug)]
pub struct FailingBackend {
    inner: InMemoryBackend,
    switch: FaultSwitch,
}

impl StorageBackend for FailingBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.switch.check("append")?;
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.switch.check("sync")?;
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.switch.check("replace")?;
        self.inner.replace(data)
    }
}

/// A step that stages a write, then fails.
#[derive(Debug, Clone)]
pub struct FailingMigration {
    version: u32,
}

impl FailingMigration {
    /// Creates a failing step for `version`.
    pub fn new(version: u32) -> Self {
        Self { version }
    }
}

impl Migration for FailingMigration {
    fn version(&self) -> u32 {
        self.version
    }

    fn name(&self) -> &str {
        "failing_step"
    }

    fn up(&self, tx: &mut UpgradeTransaction<'_>) -> CoreResult<()> {
        if tx.has_collection("moodEntries") {
            tx.put("moodEntries", json!({"id": "staged", "date": "2024-01-01"}))?;
        }
        Err(CoreError::invalid_operation("injected step failure"))
    }
}

/// Wraps a step, counting how often it runs.
pub struct CountingMigration {
    inner: Arc<dyn Migration>,
    runs: Arc<AtomicUsize>,
    delay: Duration,
}

impl CountingMigration {
    /// Wraps `inner`, incrementing `runs` each time it is applied.
    pub fn new(inner: Arc<dyn Migration>, runs: Arc<AtomicUsize>) -> Self {
        Self {
            inner,
            runs,
            delay: Duration::ZERO,
        }
    }

    /// Sleeps for `delay` before running, widening race windows.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Migration for CountingMigration {
    fn version(&self) -> u32 {
        self.inner.version()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn up(&self, tx: &mut UpgradeTransaction<'_>) -> CoreResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.inner.up(tx)
    }
}

/// Records the order steps run in.
#[derive(Debug, Clone, Default)]
pub struct StepLog {
    versions: Arc<Mutex<Vec<u32>>>,
}

impl StepLog {
    /// Versions applied so far, in order.
    pub fn versions(&self) -> Vec<u32> {
        self.versions.lock().clone()
    }
}

struct LoggedMigration {
    inner: Arc<dyn Migration>,
    log: StepLog,
}

impl Migration for LoggedMigration {
    fn version(&self) -> u32 {
        self.inner.version()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn up(&self, tx: &mut UpgradeTransaction<'_>) -> CoreResult<()> {
        self.inner.up(tx)?;
        self.log.versions.lock().push(self.inner.version());
        Ok(())
    }
}

/// The wellness steps, v1 through v5.
pub fn wellness_steps() -> Vec<Arc<dyn Migration>> {
    vec![
        Arc::new(CoreHealthRecords),
        Arc::new(Nutrition),
        Arc::new(Companion),
        Arc::new(FoodReflectionDateIndex),
        Arc::new(MealTypeBackfill),
    ]
}

fn plan_from(steps: impl IntoIterator<Item = Arc<dyn Migration>>) -> MigrationPlan {
    MigrationPlan::sequential(steps)
}

/// The wellness plan with every step counted into `runs`.
pub fn counting_wellness_plan(runs: &Arc<AtomicUsize>, delay: Duration) -> MigrationPlan {
    plan_from(wellness_steps().into_iter().map(|step| {
        Arc::new(CountingMigration::new(step, Arc::clone(runs)).with_delay(delay))
            as Arc<dyn Migration>
    }))
}

/// The wellness plan with step `version` replaced by a failing one.
pub fn wellness_plan_failing_at(version: u32) -> MigrationPlan {
    plan_from(wellness_steps().into_iter().map(|step| {
        if step.version() == version {
            Arc::new(FailingMigration::new(version)) as Arc<dyn Migration>
        } else {
            step
        }
    }))
}

/// The wellness plan recording the order steps complete in.
pub fn logged_wellness_plan() -> (MigrationPlan, StepLog) {
    let log = StepLog::default();
    let plan = plan_from(wellness_steps().into_iter().map(|step| {
        Arc::new(LoggedMigration {
            inner: step,
            log: log.clone(),
        }) as Arc<dyn Migration>
    }));
    (plan, log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wellstore_core::Store;

    #[test]
    fn tripped_switch_fails_appends() {
        let switch = FaultSwitch::new();
        let mut backend = switch.backend();
        backend.append(b"ok").unwrap();

        switch.trip();
        assert!(backend.append(b"no").is_err());
        assert_eq!(switch.failures(), 1);
        assert_eq!(switch.buffer().snapshot(), b"ok");

        switch.heal();
        backend.append(b"!").unwrap();
        assert_eq!(switch.buffer().snapshot(), b"ok!");
    }

    #[test]
    fn failing_step_fails_upgrade() {
        let store = Store::open_in_memory().unwrap();
        let err = store.upgrade(&wellness_plan_failing_at(2), 2).unwrap_err();
        assert!(matches!(err, CoreError::MigrationFailed { version: 2, .. }));
        assert_eq!(store.version().unwrap(), 0);
    }

    #[test]
    fn counting_plan_counts_each_step() {
        let runs = Arc::new(AtomicUsize::new(0));
        let store = Store::open_in_memory().unwrap();
        store
            .upgrade(&counting_wellness_plan(&runs, Duration::ZERO), 5)
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn logged_plan_runs_in_order() {
        let (plan, log) = logged_wellness_plan();
        let store = Store::open_in_memory().unwrap();
        store.upgrade(&plan, 5).unwrap();
        assert_eq!(log.versions(), vec![1, 2, 3, 4, 5]);
    }
}
