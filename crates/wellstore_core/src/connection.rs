//! Connection management: one shared store handle per manager.
//!
//! The manager holds an async mutex across the whole open and upgrade
//! sequence. Concurrent callers queue on it and the first one does the
//! work; the rest find the handle cached and reuse it.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::migration::wellness::wellness_plan;
use crate::migration::{MigrationPlan, MigrationReport};
use crate::stats::{ConnectionStats, ConnectionStatsSnapshot};
use crate::store::Store;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

/// A shared handle to an open store.
///
/// Clones refer to the same store. Once the manager closes it, every clone
/// fails with `ConnectionClosed`.
#[derive(Debug, Clone)]
pub struct Connection {
    store: Arc<Store>,
}

impl Connection {
    /// Returns true if both handles refer to the same store.
    #[must_use]
    pub fn same_store(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }
}

impl Deref for Connection {
    type Target = Store;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Opens, upgrades, caches and closes the store handle.
pub struct ConnectionManager {
    config: StoreConfig,
    plan: Arc<MigrationPlan>,
    slot: Mutex<Option<Connection>>,
    stats: ConnectionStats,
}

impl ConnectionManager {
    /// Creates a manager using the wellness migration plan.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self::with_plan(config, wellness_plan())
    }

    /// Creates a manager with a custom plan.
    #[must_use]
    pub fn with_plan(config: StoreConfig, plan: MigrationPlan) -> Self {
        Self {
            config,
            plan: Arc::new(plan),
            slot: Mutex::new(None),
            stats: ConnectionStats::default(),
        }
    }

    /// The store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Latest version the plan can reach.
    #[must_use]
    pub fn latest_version(&self) -> u32 {
        self.plan.latest()
    }

    /// Returns the open handle, opening and upgrading to `target` first if
    /// needed.
    ///
    /// A cached handle below `target` is upgraded in place. Concurrent
    /// calls run at most one open and one upgrade between them.
    ///
    /// # Errors
    ///
    /// - `VersionDowngrade` if `target` is below the persisted version
    /// - `MigrationFailed` if `target` is beyond the plan, before anything
    ///   is opened or closed
    /// - `MigrationFailed` if an upgrade step or its commit fails; the
    ///   store is closed and nothing is cached
    /// - A connection-class error if the store cannot be opened
    pub async fn open(&self, target: u32) -> CoreResult<Connection> {
        let latest = self.plan.latest();
        if target > latest {
            self.stats.record_upgrade_failure();
            return Err(CoreError::migration_failed(
                target,
                format!("no migration registered for v{target} (latest is v{latest})"),
            ));
        }

        let mut slot = self.slot.lock().await;

        if let Some(conn) = slot.as_ref().filter(|c| c.is_open()) {
            let current = conn.version()?;
            if target < current {
                return Err(CoreError::VersionDowngrade {
                    persisted: current,
                    requested: target,
                });
            }
            let conn = conn.clone();
            if target == current {
                self.stats.record_reuse();
                return Ok(conn);
            }

            tracing::info!(from = current, to = target, "upgrading cached connection");
            if let Err(e) = self.upgrade(conn.clone(), target).await {
                slot.take();
                self.stats.record_close();
                Self::release(&conn);
                return Err(e);
            }
            return Ok(conn);
        }

        let config = self.config.clone();
        let opened = tokio::task::spawn_blocking(move || Store::open(&config).map(Arc::new))
            .await
            .map_err(|e| CoreError::unavailable(format!("open task failed: {e}")))??;
        let conn = Connection { store: opened };

        if let Err(e) = self.upgrade(conn.clone(), target).await {
            Self::release(&conn);
            return Err(e);
        }

        self.stats.record_open();
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Opens at the plan's latest version.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub async fn open_latest(&self) -> CoreResult<Connection> {
        self.open(self.latest_version()).await
    }

    fn release(conn: &Connection) {
        if let Err(e) = conn.close() {
            tracing::warn!(error = %e, "failed to close store after failed upgrade");
        }
    }

    async fn upgrade(&self, conn: Connection, target: u32) -> CoreResult<MigrationReport> {
        let plan = Arc::clone(&self.plan);
        let result = tokio::task::spawn_blocking(move || conn.upgrade(&plan, target))
            .await
            .map_err(|e| CoreError::migration_failed(target, format!("upgrade task failed: {e}")))
            .and_then(|r| r);

        match &result {
            Ok(report) if !report.is_noop() => self.stats.record_upgrade(),
            Ok(_) => {}
            Err(CoreError::MigrationFailed { .. }) => self.stats.record_upgrade_failure(),
            Err(_) => {}
        }
        if let Err(e) = &result {
            tracing::error!(target_version = target, error = %e, "store upgrade failed");
        }
        result
    }

    /// Closes the cached handle. The next [`open`](Self::open) starts over.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the final sync fails; the handle is
    /// released regardless.
    pub async fn close(&self) -> CoreResult<()> {
        let Some(conn) = self.slot.lock().await.take() else {
            return Ok(());
        };
        self.stats.record_close();
        conn.close()
    }

    /// Returns true if a live handle is cached.
    pub async fn is_open(&self) -> bool {
        self.slot
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| c.is_open())
    }

    /// Lifecycle counters.
    #[must_use]
    pub fn stats(&self) -> ConnectionStatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}

static GLOBAL: OnceLock<ConnectionManager> = OnceLock::new();

/// Installs the process-wide manager.
///
/// # Errors
///
/// Returns `InvalidOperation` if a manager is already installed, including
/// one created lazily by [`global`].
pub fn init_global(config: StoreConfig) -> CoreResult<&'static ConnectionManager> {
    let mut installed = false;
    let manager = GLOBAL.get_or_init(|| {
        installed = true;
        ConnectionManager::new(config)
    });
    if installed {
        Ok(manager)
    } else {
        Err(CoreError::invalid_operation(
            "global connection manager already initialized",
        ))
    }
}

/// The process-wide manager, configured from the environment on first use
/// unless [`init_global`] ran earlier.
pub fn global() -> &'static ConnectionManager {
    GLOBAL.get_or_init(|| ConnectionManager::new(StoreConfig::from_env()))
}

/// Opens the process-wide connection at `target`.
///
/// # Errors
///
/// Same as [`ConnectionManager::open`].
pub async fn open_connection(target: u32) -> CoreResult<Connection> {
    global().open(target).await
}

/// Closes the process-wide connection.
///
/// # Errors
///
/// Same as [`ConnectionManager::close`].
pub async fn close_connection() -> CoreResult<()> {
    global().close().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::wellness::{Companion, CoreHealthRecords, Nutrition};
    use crate::migration::{Migration, UpgradeTransaction};
    use crate::schema::wellness::collections::MOOD_ENTRIES;
    use serde_json::json;
    use wellstore_storage::InMemoryBackend;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(StoreConfig::in_memory(InMemoryBackend::new()))
    }

    #[tokio::test]
    async fn open_caches_the_handle() {
        let manager = manager();
        let a = manager.open(5).await.unwrap();
        let b = manager.open(5).await.unwrap();

        assert!(a.same_store(&b));
        assert_eq!(a.version().unwrap(), 5);
        let stats = manager.stats();
        assert_eq!(stats.opens, 1);
        assert_eq!(stats.reuses, 1);
        assert_eq!(stats.upgrades, 1);
    }

    #[tokio::test]
    async fn cached_handle_upgrades_in_place() {
        let manager = manager();
        let v3 = manager.open(3).await.unwrap();
        let v5 = manager.open(5).await.unwrap();

        assert!(v3.same_store(&v5));
        assert_eq!(v3.version().unwrap(), 5);
        assert_eq!(manager.stats().upgrades, 2);
    }

    #[tokio::test]
    async fn downgrade_is_rejected() {
        let manager = manager();
        manager.open(5).await.unwrap();
        let err = manager.open(2).await.unwrap_err();
        assert!(matches!(err, CoreError::VersionDowngrade { .. }));
    }

    #[tokio::test]
    async fn close_resets_the_slot() {
        let manager = manager();
        let first = manager.open(5).await.unwrap();
        first
            .put(MOOD_ENTRIES, json!({"id": "m1", "date": "2024-05-01"}))
            .unwrap();

        manager.close().await.unwrap();
        assert!(!manager.is_open().await);
        assert!(matches!(
            first.get(MOOD_ENTRIES, "m1"),
            Err(CoreError::ConnectionClosed)
        ));

        let second = manager.open(5).await.unwrap();
        assert!(!first.same_store(&second));
        assert!(second.get(MOOD_ENTRIES, "m1").unwrap().is_some());
        assert_eq!(manager.stats().closes, 1);
        assert_eq!(manager.stats().opens, 2);
    }

    struct Refuse;

    impl Migration for Refuse {
        fn version(&self) -> u32 {
            4
        }

        fn name(&self) -> &str {
            "refuse"
        }

        fn up(&self, _tx: &mut UpgradeTransaction<'_>) -> CoreResult<()> {
            Err(CoreError::invalid_operation("step refused"))
        }
    }

    fn plan_failing_at_v4() -> MigrationPlan {
        let steps: [Arc<dyn Migration>; 4] = [
            Arc::new(CoreHealthRecords),
            Arc::new(Nutrition),
            Arc::new(Companion),
            Arc::new(Refuse),
        ];
        MigrationPlan::sequential(steps)
    }

    #[tokio::test]
    async fn failed_in_place_upgrade_drops_the_handle() {
        let manager = ConnectionManager::with_plan(
            StoreConfig::in_memory(InMemoryBackend::new()),
            plan_failing_at_v4(),
        );
        let v3 = manager.open(3).await.unwrap();
        let err = manager.open(4).await.unwrap_err();

        assert!(matches!(err, CoreError::MigrationFailed { version: 4, .. }));
        assert!(!manager.is_open().await);
        assert!(!v3.is_open());

        let again = manager.open(3).await.unwrap();
        assert_eq!(again.version().unwrap(), 3);
        assert!(!again.same_store(&v3));
    }

    #[tokio::test]
    async fn target_beyond_plan_leaves_live_handles_alone() {
        let manager = manager();
        let v3 = manager.open(3).await.unwrap();

        let err = manager.open(9).await.unwrap_err();
        assert!(matches!(err, CoreError::MigrationFailed { version: 9, .. }));
        assert!(v3.is_open());
        assert!(manager.is_open().await);
        assert_eq!(v3.version().unwrap(), 3);

        let same = manager.open(3).await.unwrap();
        assert!(same.same_store(&v3));
        assert_eq!(manager.stats().closes, 0);
    }

    #[tokio::test]
    async fn target_beyond_plan_caches_nothing() {
        let manager = manager();
        let err = manager.open(6).await.unwrap_err();
        assert!(matches!(err, CoreError::MigrationFailed { version: 6, .. }));
        assert!(!manager.is_open().await);
        assert_eq!(manager.stats().upgrade_failures, 1);
        assert_eq!(manager.stats().opens, 0);
    }

    // The process-wide manager is shared by every test in this binary, so
    // its whole lifecycle is exercised in one test.
    #[tokio::test]
    async fn global_manager_lifecycle() {
        let installed = init_global(StoreConfig::in_memory(InMemoryBackend::new())).unwrap();
        assert!(std::ptr::eq(installed, global()));

        let err = init_global(StoreConfig::in_memory(InMemoryBackend::new())).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));

        let first = open_connection(5).await.unwrap();
        let second = open_connection(5).await.unwrap();
        assert!(first.same_store(&second));
        first
            .put(MOOD_ENTRIES, json!({"id": "m1", "date": "2024-05-01"}))
            .unwrap();

        close_connection().await.unwrap();
        assert!(!first.is_open());
        assert!(!global().is_open().await);

        let fresh = open_connection(5).await.unwrap();
        assert!(!fresh.same_store(&first));
        assert!(fresh.get(MOOD_ENTRIES, "m1").unwrap().is_some());

        close_connection().await.unwrap();
        close_connection().await.unwrap();
    }
}
