//! `ucvm fetch` – background download with live progress.

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use ucvm_core::checksum;
use ucvm_core::engine::{DownloadEngine, DownloadRequest, EngineError};
use ucvm_core::store::{now_unix, CloudImage, DownloadRecord, DownloadStatus};
use ucvm_core::transfer::ProgressStats;

use super::mib;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct FetchArgs {
    pub url: String,
    pub dest: PathBuf,
    pub sha256: Option<String>,
    pub id: Option<String>,
    pub register: Option<String>,
    pub release: Option<String>,
    pub arch: String,
}

pub async fn run_fetch(engine: &DownloadEngine, args: FetchArgs) -> Result<()> {
    if let Some(expected) = &args.sha256 {
        let valid = checksum::normalize_sha256(expected).map_or(false, |d| checksum::is_sha256_hex(&d));
        if !valid {
            bail!("--sha256 is not a 64-digit hex digest: {expected}");
        }
    }
    let id = args.id.clone().unwrap_or_else(|| default_id(&args.dest, &args.url));
    let mut req = DownloadRequest::new(&id, &args.url, &args.dest);
    if let Some(expected) = &args.sha256 {
        req = req.with_sha256(expected);
    }

    engine.start(req)?;
    tracing::info!(id, url = %args.url, "fetch started");
    println!("Downloading {} -> {} (id {})", args.url, args.dest.display(), id);

    let started = Instant::now();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                res.context("listen for ctrl-c")?;
                println!();
                println!("Cancelling {id}...");
                cancel_or_finished(engine, &id).await?;
                break;
            }
            finished = engine.wait_for_download(&id, PROGRESS_INTERVAL) => {
                if finished || !engine.is_download_active(&id) {
                    println!();
                    break;
                }
                if let Some(rec) = find_record(engine, &id)? {
                    let stats = ProgressStats::since(started, rec.downloaded, rec.total_bytes);
                    print!("\r  {}", format_progress(&stats));
                    std::io::stdout().flush().context("write progress")?;
                }
            }
        }
    }

    let rec = find_record(engine, &id)?
        .with_context(|| format!("download {id} finished but has no record"))?;
    match rec.status {
        DownloadStatus::Complete => {
            println!(
                "Done: {} MiB in {:.1}s -> {}",
                mib(rec.downloaded),
                started.elapsed().as_secs_f64(),
                rec.dest_path.display()
            );
        }
        _ => bail!(
            "download {id} failed: {}",
            rec.error.as_deref().unwrap_or(rec.status.as_str())
        ),
    }

    if let Some(name) = args.register.as_deref() {
        register_image(engine, name, &args, &rec)?;
        println!("Registered cloud image {name}");
    }
    Ok(())
}

/// Cancel `id`; a worker that already finished is not an error, its record
/// decides the outcome.
async fn cancel_or_finished(engine: &DownloadEngine, id: &str) -> Result<()> {
    match engine.cancel_download(id).await {
        Ok(()) => Ok(()),
        Err(EngineError::NotFound(_)) => {
            tracing::debug!(id, "cancel raced with completion");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn find_record(engine: &DownloadEngine, id: &str) -> Result<Option<DownloadRecord>> {
    Ok(engine.list_downloads()?.into_iter().find(|r| r.id == id))
}

fn register_image(
    engine: &DownloadEngine,
    name: &str,
    args: &FetchArgs,
    rec: &DownloadRecord,
) -> Result<()> {
    let sha256 = match args.sha256.as_deref().and_then(checksum::normalize_sha256) {
        Some(verified) => verified,
        None => checksum::sha256_path(&rec.dest_path)?,
    };
    let image = CloudImage {
        name: name.to_string(),
        release: args.release.clone().unwrap_or_default(),
        arch: args.arch.clone(),
        url: args.url.clone(),
        path: rec.dest_path.clone(),
        sha256: Some(sha256),
        size_bytes: rec.downloaded,
        added_at: now_unix(),
    };
    engine
        .store()
        .load_and_save(|settings| {
            settings.upsert_image(image);
            Ok(())
        })
        .with_context(|| format!("register cloud image {name}"))?;
    Ok(())
}

/// Download id when none is given: the destination file name, else the URL.
pub(crate) fn default_id(dest: &Path, url: &str) -> String {
    dest.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| url.to_string())
}

pub(crate) fn format_progress(stats: &ProgressStats) -> String {
    let rate_mib = stats.bytes_per_sec() / 1_048_576.0;
    let eta = stats
        .eta_secs()
        .map(|s| format!("{:.0}s", s))
        .unwrap_or_else(|| "?".to_string());
    match stats.fraction() {
        Some(f) => format!(
            "{} / {} MiB ({:.1}%)  {:.2} MiB/s  ETA {}",
            mib(stats.downloaded),
            mib(stats.total),
            f * 100.0,
            rate_mib,
            eta
        ),
        None => format!("{} MiB  {:.2} MiB/s", mib(stats.downloaded), rate_mib),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_after_completion_is_not_an_error() {
        // Never written: cancelling an unknown id does not touch the store.
        let store = std::sync::Arc::new(ucvm_core::store::Store::in_dir(Path::new(
            "/nonexistent/ucvm-state",
        )));
        let engine = DownloadEngine::new(store, Default::default());
        cancel_or_finished(&engine, "already-done").await.unwrap();
        assert!(engine.cancel_download("already-done").await.is_err());
    }

    #[test]
    fn default_id_uses_file_name() {
        assert_eq!(
            default_id(Path::new("/var/lib/ucvm/noble.img"), "http://h/x"),
            "noble.img"
        );
        assert_eq!(default_id(Path::new("/"), "http://h/x"), "http://h/x");
    }

    #[test]
    fn progress_line_known_and_unknown_total() {
        let known = ProgressStats {
            downloaded: 1_048_576,
            total: 4 * 1_048_576,
            elapsed_secs: 1.0,
        };
        let line = format_progress(&known);
        assert!(line.starts_with("1.0 / 4.0 MiB (25.0%)"), "{line}");
        assert!(line.contains("ETA 3s"), "{line}");

        let unknown = ProgressStats {
            downloaded: 0,
            total: 0,
            elapsed_secs: 0.0,
        };
        assert_eq!(format_progress(&unknown), "0.0 MiB  0.00 MiB/s");
    }
}
