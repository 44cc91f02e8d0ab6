//! # media-backup CLI interface
//!
//! Command parsing and the wiring of local collaborators around the core
//! engine. All backup logic lives in `media-backup-core`; this module only
//! turns a config file into a [`run_module_backup`] call and reports on it.
//!
//! - For command-line users: run the `media-backup` binary with `--help`.
//! - For programmatic/integration use: call [`run`] with a constructed [`Cli`].

use crate::load_config::load_config;
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use media_backup_core::assets::HeuristicHostClassifier;
use media_backup_core::backup::{run_module_backup, Collaborators, ModuleReport};
use media_backup_core::config::IncrementMode;
use media_backup_core::export::ExportTargets;
use media_backup_core::fetcher::HttpPageSource;
use media_backup_core::local::{JsonBackupMarker, JsonSnapshotStore, LocalFs, TaskListQueue};
use media_backup_core::progress::LogProgressSink;
use media_backup_core::registrar::UrlFilenameMap;
use std::path::PathBuf;

/// CLI for media-backup: incremental local backups of a remote media collection.
#[derive(Parser)]
#[clap(
    name = "media-backup",
    version,
    about = "Back up a paginated remote media collection to local HTML, Markdown, link or JSON files"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch new items, merge them over the last backup and export
    Backup {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Ignore the previous backup and walk every page
        #[clap(long)]
        full: bool,
    },
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Backup { config, full } => {
            let mut config = load_config(config)?;
            if full {
                config.module.increment = IncrementMode::Full;
            }
            tracing::info!(command = "backup", module = %config.module.name, "Starting backup");

            let module = &config.module;
            let root = config.output_dir.as_path();
            let source = HttpPageSource::new(
                config.source.list_url.clone(),
                module.page_size,
                &config.source.user_agent,
                config.source.timeout(),
            )?;
            let fs = LocalFs::with_offset(module.display_offset());
            let snapshots = JsonSnapshotStore::new(root);
            let marker = JsonBackupMarker::new(root);
            let progress = LogProgressSink::new(module.name.clone());
            let queue = TaskListQueue::new();
            let classifier = HeuristicHostClassifier;

            let collaborators = Collaborators {
                source: &source,
                progress: &progress,
                queue: &queue,
                classifier: &classifier,
                export: ExportTargets {
                    text: &fs,
                    templates: &fs,
                    folders: &fs,
                },
                snapshots: &snapshots,
                marker: &marker,
            };
            let report =
                run_module_backup(module, root, collaborators, &mut UrlFilenameMap::new()).await;

            if !queue.is_empty() {
                queue
                    .write_manifest(&root.join(TaskListQueue::MANIFEST_NAME))
                    .await?;
            }
            print_report(&report)?;
            finish(report)
        }
    }
}

fn print_report(report: &ModuleReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn finish(report: ModuleReport) -> Result<()> {
    if let Some(e) = report.error {
        tracing::error!(command = "backup", error = %e, "Backup failed");
        bail!("backup of {} failed: {e}", report.module);
    }
    if report.frontier_held {
        tracing::error!(command = "backup", module = %report.module, "Backup has failed pages");
        bail!(
            "backup of {} is partial: {} page(s) failed, rerun to fetch them",
            report.module,
            report.progress.failed_pages.len()
        );
    }
    if !report.marked {
        tracing::error!(command = "backup", module = %report.module, "Backup export incomplete");
        bail!(
            "backup of {} is incomplete: {} file(s) failed to export",
            report.module,
            report.files_failed
        );
    }
    tracing::info!(command = "backup", module = %report.module, "Backup complete");
    Ok(())
}
