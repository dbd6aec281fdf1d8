//! CLI command handlers, one file per command.

mod checksum;
mod downloads;
mod fetch;
mod images;
mod reconcile;

pub use checksum::run_checksum;
pub use downloads::run_downloads;
pub use fetch::{run_fetch, FetchArgs};
pub use images::run_images;
pub use reconcile::run_reconcile;

const MIB: f64 = 1_048_576.0;

/// Bytes as MiB with one decimal.
pub(crate) fn mib(bytes: u64) -> String {
    format!("{:.1}", bytes as f64 / MIB)
}
