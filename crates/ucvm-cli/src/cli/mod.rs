//! CLI for ucvm image downloads and local state.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ucvm_core::config;
use ucvm_core::engine::DownloadEngine;
use ucvm_core::store::Store;

use commands::{run_checksum, run_downloads, run_fetch, run_images, run_reconcile, FetchArgs};

/// Top-level CLI for ucvm.
#[derive(Debug, Parser)]
#[command(name = "ucvm")]
#[command(about = "ucvm: cloud image downloads and VM settings", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a URL to a file in the background, showing progress. Ctrl-C cancels.
    Fetch {
        /// Direct HTTP/HTTPS URL to download.
        url: String,
        /// Destination file path.
        dest: PathBuf,
        /// Expected SHA-256 (hex, optionally prefixed with "sha256:").
        #[arg(long, value_name = "HEX")]
        sha256: Option<String>,
        /// Download id (defaults to the destination file name).
        #[arg(long)]
        id: Option<String>,
        /// Register the finished file as a cloud image with this name.
        #[arg(long, value_name = "NAME", requires = "release")]
        register: Option<String>,
        /// Ubuntu release of the registered image, e.g. 24.04.
        #[arg(long, value_name = "R")]
        release: Option<String>,
        /// Architecture of the registered image.
        #[arg(long, value_name = "A", default_value = "amd64")]
        arch: String,
    },

    /// Show persisted downloads (only in-progress ones unless --all).
    Downloads {
        #[arg(long)]
        all: bool,
    },

    /// Mark downloads left "downloading" by an earlier process as interrupted.
    Reconcile,

    /// List registered cloud images.
    Images,

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: String,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let store = Arc::new(Store::open_default(&cfg)?);
        let engine = DownloadEngine::new(Arc::clone(&store), cfg.transfer.to_options());

        match cli.command {
            CliCommand::Fetch {
                url,
                dest,
                sha256,
                id,
                register,
                release,
                arch,
            } => {
                let args = FetchArgs {
                    url,
                    dest,
                    sha256,
                    id,
                    register,
                    release,
                    arch,
                };
                run_fetch(&engine, args).await?
            }
            CliCommand::Downloads { all } => run_downloads(&engine, all)?,
            CliCommand::Reconcile => run_reconcile(&engine)?,
            CliCommand::Images => run_images(&store)?,
            CliCommand::Checksum { path } => run_checksum(Path::new(&path)).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
