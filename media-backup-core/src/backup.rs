//! One backup run of one module, end to end.
//!
//! [`run_module_backup`] chains the engine stages:
//!
//! 1. load the previous snapshot (skipped for full backups)
//! 2. collect pages up to the backup frontier and merge over the snapshot
//! 3. register downloads for the fresh items
//! 4. export the merged collection
//! 5. only if the export wrote every file and no page failed: save the
//!    snapshot and record the backup marker, once
//!
//! A run with failed pages keeps the previous snapshot, so the next run's
//! frontier still sits behind the items those pages held.
//!
//! The run never returns an error. Whatever went wrong is logged where it
//! happened and summarised in the [`ModuleReport`].

use std::path::Path;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::assets::HostClassifier;
use crate::collector::{IncrementalCollector, StopReason};
use crate::config::ModuleConfig;
use crate::contract::{BackupMarker, DownloadQueue, PageSource, ProgressSink, SnapshotStore};
use crate::export::{ExportDispatcher, ExportFormat, ExportOutcome, ExportTargets};
use crate::fetcher::PageFetcher;
use crate::frontier::frontier_for;
use crate::progress::{ProgressState, ProgressTracker};
use crate::registrar::{DownloadTaskRegistrar, RegisterContext, RegisterSummary, UrlFilenameMap};

/// Everything a run talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub source: &'a dyn PageSource,
    pub progress: &'a dyn ProgressSink,
    pub queue: &'a dyn DownloadQueue,
    pub classifier: &'a dyn HostClassifier,
    pub export: ExportTargets<'a>,
    pub snapshots: &'a dyn SnapshotStore,
    pub marker: &'a dyn BackupMarker,
}

/// Summary of one module run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModuleReport {
    pub module: String,
    /// `None` when the run could not start collecting.
    pub stop: Option<StopReason>,
    pub progress: ProgressState,
    pub fresh_items: usize,
    pub total_items: usize,
    #[serde(skip)]
    pub registered: RegisterSummary,
    pub export_format: Option<ExportFormat>,
    pub files_written: usize,
    pub files_failed: usize,
    /// Snapshot saved and marker recorded.
    pub marked: bool,
    /// Pages failed, so the snapshot and marker were left at the previous run.
    pub frontier_held: bool,
    pub error: Option<String>,
}

impl ModuleReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.marked
    }
}

/// Run one module. `urls` may be shared with other runs of the same export
/// so an asset referenced by several modules is downloaded once.
pub async fn run_module_backup(
    config: &ModuleConfig,
    root: &Path,
    collaborators: Collaborators<'_>,
    urls: &mut UrlFilenameMap,
) -> ModuleReport {
    let mut report = ModuleReport {
        module: config.name.clone(),
        ..Default::default()
    };
    info!(module = %config.name, root = %root.display(), "[BACKUP] Starting module backup");

    let previous = if config.is_incremental() {
        collaborators.snapshots.load(config).await
    } else {
        info!(module = %config.name, "[BACKUP] Full backup, previous snapshot ignored");
        Vec::new()
    };

    let fetcher = match PageFetcher::new(collaborators.source, config.payload.clone()) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!(module = %config.name, error = %e, "[BACKUP][ERROR] Cannot build page fetcher");
            report.error = Some(e.to_string());
            return report;
        }
    };
    let frontier = frontier_for(config, &previous);
    let collector = IncrementalCollector::new(&fetcher, config, frontier.as_ref());
    let mut run = collector
        .run(previous, ProgressTracker::new(collaborators.progress))
        .await;

    report.stop = Some(run.stop);
    report.fresh_items = run.fresh_count;
    report.total_items = run.collection.len();

    let registrar =
        DownloadTaskRegistrar::new(config, collaborators.queue, collaborators.classifier);
    report.registered = registrar.register(&mut run.collection, RegisterContext::default(), urls);

    let dispatcher = ExportDispatcher::new(config, collaborators.export, root);
    let outcome = dispatcher.export(&run.collection, &config.export_type).await;
    report.export_format = outcome.format;
    report.files_written = outcome.written.len();
    report.files_failed = outcome.failed.len();
    report.progress = run.progress;

    if !outcome.is_complete() {
        warn_incomplete(config, &outcome);
        return report;
    }
    if !report.progress.failed_pages.is_empty() {
        warn!(
            module = %config.name,
            failed_pages = report.progress.failed_pages.len(),
            "[BACKUP] Pages failed, snapshot and backup marker left at the previous run"
        );
        report.frontier_held = true;
        return report;
    }

    if let Err(e) = collaborators.snapshots.save(config, &run.collection).await {
        error!(module = %config.name, error = %e, "[BACKUP][ERROR] Failed to save snapshot");
        report.error = Some(e.to_string());
        return report;
    }
    match collaborators.marker.record(config, &run.collection).await {
        Ok(()) => report.marked = true,
        Err(e) => {
            error!(module = %config.name, error = %e, "[BACKUP][ERROR] Failed to record backup marker");
            report.error = Some(e.to_string());
        }
    }

    info!(
        module = %config.name,
        stop = ?report.stop,
        fresh = report.fresh_items,
        total = report.total_items,
        failed_pages = report.progress.failed_pages.len(),
        "[BACKUP] Module backup finished"
    );
    report
}

fn warn_incomplete(config: &ModuleConfig, outcome: &ExportOutcome) {
    warn!(
        module = %config.name,
        format = ?outcome.format,
        failed = outcome.failed.len(),
        "[BACKUP] Export incomplete, backup marker not recorded"
    );
}
