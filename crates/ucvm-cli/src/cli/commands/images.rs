//! `ucvm images` – list registered cloud images.

use anyhow::Result;
use ucvm_core::store::Store;

use super::mib;

pub fn run_images(store: &Store) -> Result<()> {
    let settings = store.load()?;
    if settings.cloud_images.is_empty() {
        println!("No cloud images registered.");
        return Ok(());
    }
    println!("{:<16} {:<8} {:<6} {:>10} {}", "NAME", "RELEASE", "ARCH", "MIB", "PATH");
    for img in &settings.cloud_images {
        println!(
            "{:<16} {:<8} {:<6} {:>10} {}",
            img.name,
            img.release,
            img.arch,
            mib(img.size_bytes),
            img.path.display()
        );
    }
    Ok(())
}
