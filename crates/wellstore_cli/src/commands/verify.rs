//! Verify command implementation.

use super::open_existing;
use std::path::Path;
use wellstore_core::VerifyReport;

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {}", path.display());
    println!();

    let store = open_existing(path)?;
    let report = store.verify()?;
    store.close()?;
    print_report(&report);

    println!();
    if report.is_ok() {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err("Verification failed".into())
    }
}

fn print_report(report: &VerifyReport) {
    println!("Log:");
    println!("  Frames:  {}", report.frames);
    println!("  Entries: {}", report.entries);
    println!("  Records: {}", report.records);
    if !report.problems.is_empty() {
        println!();
        println!("Problems:");
        for problem in &report.problems {
            println!("  - {problem}");
        }
    }
}
