//! `ucvm downloads` – show persisted download records.

use anyhow::Result;
use ucvm_core::engine::DownloadEngine;
use ucvm_core::store::DownloadRecord;

use super::mib;

pub fn run_downloads(engine: &DownloadEngine, all: bool) -> Result<()> {
    let records = if all {
        engine.list_downloads()?
    } else {
        engine.get_active_downloads()?
    };
    if records.is_empty() {
        println!("No downloads.");
        return Ok(());
    }
    println!("{:<20} {:<12} {:<18} {}", "ID", "STATUS", "MIB", "URL");
    for r in &records {
        println!(
            "{:<20} {:<12} {:<18} {}",
            r.id,
            r.status.as_str(),
            size_column(r),
            r.url
        );
        if let Some(err) = &r.error {
            println!("{:<20} {}", "", err);
        }
    }
    Ok(())
}

fn size_column(r: &DownloadRecord) -> String {
    if r.total_bytes > 0 {
        format!("{} / {}", mib(r.downloaded), mib(r.total_bytes))
    } else {
        mib(r.downloaded)
    }
}
