//! Incremental, fault-tolerant walk over the pages of a remote list.
//!
//! Pages are fetched strictly one after another: whether page N+1 is needed
//! depends on what page N contained. Each step ends in one of three ways:
//!
//! - the page reached already backed-up content → [`StopReason::StoppedEarly`]
//! - the list ran out (short page, reported total reached, page cap hit, or too
//!   many failures in a row) → [`StopReason::StoppedExhausted`]
//! - otherwise the next page index is requested.
//!
//! A failed page is recorded in the progress report and skipped. It is never
//! retried within the run and never rewinds what was already collected.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ModuleConfig;
use crate::contract::PageSpan;
use crate::fetcher::PageFetcher;
use crate::frontier::BackupFrontier;
use crate::merge::{Accumulator, DedupMerger};
use crate::model::{Collection, MediaItem};
use crate::progress::{ProgressState, ProgressTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// A page contained content already captured by a previous run.
    StoppedEarly,
    /// No further pages are expected.
    StoppedExhausted,
}

/// Result of one collection run.
#[derive(Debug, Clone)]
pub struct CollectedRun {
    /// Fresh items merged with the previous snapshot, newest first.
    pub collection: Collection,
    /// Items fetched in this run before merging.
    pub fresh_count: usize,
    pub stop: StopReason,
    pub progress: ProgressState,
}

pub struct IncrementalCollector<'a> {
    fetcher: &'a PageFetcher<'a>,
    config: &'a ModuleConfig,
    frontier: &'a dyn BackupFrontier,
    merger: DedupMerger,
}

impl<'a> IncrementalCollector<'a> {
    pub fn new(
        fetcher: &'a PageFetcher<'a>,
        config: &'a ModuleConfig,
        frontier: &'a dyn BackupFrontier,
    ) -> Self {
        let merger = DedupMerger::new(config.identity.clone(), config.pre_backup.field.clone());
        Self {
            fetcher,
            config,
            frontier,
            merger,
        }
    }

    /// Walk all pages, then merge what was fetched over `previous`.
    pub async fn run(&self, previous: Collection, mut tracker: ProgressTracker<'_>) -> CollectedRun {
        tracker.start();
        let (fresh, stop) = self.paginate(&mut tracker).await;
        let fresh_count = fresh.len();

        let collection = self.merger.merge(previous, fresh);
        let progress = tracker.complete();

        info!(
            module = %self.config.name,
            fresh = fresh_count,
            total = collection.len(),
            failed_pages = progress.failed_pages.len(),
            stop = ?stop,
            "[COLLECT] Collection finished"
        );

        CollectedRun {
            collection,
            fresh_count,
            stop,
            progress,
        }
    }

    /// The page loop. Bounded by `max_pages` requests whatever the remote reports.
    pub async fn paginate(&self, tracker: &mut ProgressTracker<'_>) -> (Collection, StopReason) {
        let page_size = self.config.page_size.max(1);
        let max_pages = self.config.max_pages.max(1);
        let max_failures = self.config.max_consecutive_failures.max(1);

        let mut acc = Accumulator::default();
        let mut total: Option<u64> = None;
        let mut consecutive_failures = 0u32;
        let mut page_index = 0u32;

        let stop = loop {
            tracker.set_index(page_index + 1);
            tracker.add_download(page_size);

            match self.fetcher.fetch(page_index).await {
                Ok(page) => {
                    consecutive_failures = 0;
                    // Later pages may omit the total; keep the last one reported.
                    if let Some(reported) = page.total.filter(|t| *t > 0) {
                        total = Some(reported);
                    }
                    tracker.set_total(total.unwrap_or(0));
                    tracker.add_success(&page.items);

                    let received = page.items.len();
                    let (fresh, backed_up): (Vec<MediaItem>, Vec<MediaItem>) = page
                        .items
                        .into_iter()
                        .partition(|item| !self.frontier.is_backed_up(item));
                    self.merger.union_into(&mut acc, fresh);

                    if !backed_up.is_empty() {
                        info!(
                            page = page_index + 1,
                            skipped = backed_up.len(),
                            "[COLLECT] Reached previously backed-up content, stopping"
                        );
                        break StopReason::StoppedEarly;
                    }
                    if received < page_size as usize {
                        break StopReason::StoppedExhausted;
                    }
                }
                Err(e) => {
                    error!(page = page_index + 1, error = %e, "[COLLECT][ERROR] Page fetch failed, skipping");
                    tracker.add_failed(PageSpan {
                        page_index,
                        page_size,
                    });
                    consecutive_failures += 1;
                    if consecutive_failures >= max_failures {
                        warn!(
                            failures = consecutive_failures,
                            "[COLLECT] Too many consecutive page failures, giving up"
                        );
                        break StopReason::StoppedExhausted;
                    }
                }
            }

            let next = page_index + 1;
            if let Some(total) = total {
                if u64::from(next) * u64::from(page_size) >= total {
                    break StopReason::StoppedExhausted;
                }
            }
            if next >= max_pages {
                warn!(max_pages, "[COLLECT] Page cap reached before the list ended");
                break StopReason::StoppedExhausted;
            }
            page_index = next;
        };

        (acc.into_items(), stop)
    }
}
