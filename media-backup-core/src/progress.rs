//! Per-run progress counters and the default log sink.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::contract::{PageSpan, ProgressSink};
use crate::model::MediaItem;

/// Counters of one run. Mutated once per page, read-only after the run completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressState {
    /// One-based index of the last page requested.
    pub page_index: u32,
    pub total: u64,
    pub requested_count: u64,
    pub succeeded_items: u64,
    pub failed_pages: Vec<PageSpan>,
}

/// Owns the [`ProgressState`] of a run and mirrors every change to a sink.
pub struct ProgressTracker<'a> {
    state: ProgressState,
    sink: &'a dyn ProgressSink,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            state: ProgressState::default(),
            sink,
        }
    }

    pub fn start(&self) {
        self.sink.print();
    }

    pub fn set_index(&mut self, index: u32) {
        self.state.page_index = index;
        self.sink.set_index(index);
    }

    pub fn add_download(&mut self, count: u32) {
        self.state.requested_count += u64::from(count);
        self.sink.add_download(count);
    }

    pub fn set_total(&mut self, total: u64) {
        self.state.total = total;
        self.sink.set_total(total);
    }

    pub fn add_success(&mut self, items: &[MediaItem]) {
        self.state.succeeded_items += items.len() as u64;
        self.sink.add_success(items);
    }

    pub fn add_failed(&mut self, span: PageSpan) {
        self.state.failed_pages.push(span);
        self.sink.add_failed(span);
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    /// Finish the run and hand back the final counters.
    pub fn complete(self) -> ProgressState {
        self.sink.complete();
        self.state
    }
}

/// [`ProgressSink`] that reports through `tracing`.
#[derive(Debug, Clone)]
pub struct LogProgressSink {
    module: String,
}

impl LogProgressSink {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
        }
    }
}

impl ProgressSink for LogProgressSink {
    fn print(&self) {
        info!(module = %self.module, "[PROGRESS] Started");
    }

    fn complete(&self) {
        info!(module = %self.module, "[PROGRESS] Completed");
    }

    fn set_index(&self, index: u32) {
        debug!(module = %self.module, page = index, "[PROGRESS] Requesting page");
    }

    fn set_total(&self, total: u64) {
        debug!(module = %self.module, total, "[PROGRESS] Remote total");
    }

    fn add_download(&self, count: u32) {
        debug!(module = %self.module, count, "[PROGRESS] Requested items");
    }

    fn add_success(&self, items: &[MediaItem]) {
        info!(module = %self.module, items = items.len(), "[PROGRESS] Page fetched");
    }

    fn add_failed(&self, span: PageSpan) {
        warn!(
            module = %self.module,
            page = span.page_index + 1,
            page_size = span.page_size,
            "[PROGRESS] Page failed"
        );
    }
}
