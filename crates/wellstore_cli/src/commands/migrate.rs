//! Migrate command implementation.

use serde::Serialize;
use std::path::Path;
use tracing::info;
use wellstore_core::migration::wellness::wellness_plan;
use wellstore_core::migration::MigrationInfo;
use wellstore_core::{MigrationPlan, MigrationReport, Store, StoreConfig};

/// What a migrate run did or would do.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateResult {
    /// Version before the run.
    pub from: u32,
    /// Version requested.
    pub to: u32,
    /// Steps between the two.
    pub pending: Vec<MigrationInfo>,
    /// The committed upgrade, absent for a dry run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<MigrationReport>,
}

/// Plans, and unless `dry_run`, applies an upgrade to `target`.
pub fn migrate(
    store: &Store,
    plan: &MigrationPlan,
    target: Option<u32>,
    dry_run: bool,
) -> Result<MigrateResult, Box<dyn std::error::Error>> {
    let from = store.version()?;
    let to = target.unwrap_or_else(|| plan.latest());
    let pending = plan.pending(from, to);

    let report = if dry_run {
        None
    } else {
        info!(from, to, steps = pending.len(), "applying schema upgrade");
        Some(store.upgrade(plan, to)?)
    };
    Ok(MigrateResult {
        from,
        to,
        pending,
        report,
    })
}

/// Runs the migrate command.
pub fn run(
    path: &Path,
    target: Option<u32>,
    dry_run: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    // A dry run must not create a store at a mistyped path.
    let store = if dry_run {
        super::open_existing(path)?
    } else {
        Store::open(&StoreConfig::at(path))?
    };
    let result = migrate(&store, &wellness_plan(), target, dry_run)?;
    store.close()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("Schema v{} -> v{}", result.from, result.to);
    if result.pending.is_empty() {
        println!("  Nothing to do.");
    }
    for step in &result.pending {
        let status = if result.report.is_some() { "applied" } else { "pending" };
        println!("  v{}: {} [{}]", step.version, step.name, status);
        if !step.description.is_empty() {
            println!("      {}", step.description);
        }
    }
    if let Some(report) = &result.report {
        println!();
        println!("Operations:");
        for op in report.operations() {
            println!("  {}", serde_json::to_string(op)?);
        }
    }
    Ok(())
}
