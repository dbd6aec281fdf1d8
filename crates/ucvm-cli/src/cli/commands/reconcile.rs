//! `ucvm reconcile` – mark orphaned "downloading" records as interrupted.

use anyhow::Result;
use ucvm_core::engine::DownloadEngine;

pub fn run_reconcile(engine: &DownloadEngine) -> Result<()> {
    let marked = engine.reconcile_orphans()?;
    if marked.is_empty() {
        println!("No orphaned downloads.");
    } else {
        for id in &marked {
            println!("{id}: marked interrupted");
        }
    }
    Ok(())
}
