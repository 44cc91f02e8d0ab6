#![allow(unused)]

//! # contract: collaborator interfaces consumed by the backup engine
//!
//! The engine (paging, merging, download registration, export) never talks to
//! the network, the filesystem or a UI directly. Each of those concerns is one
//! trait here, so the engine can run against real implementations (see
//! [`crate::local`] and [`crate::fetcher::HttpPageSource`]) or generated mocks.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`; enable the `test-export-mocks`
//!   feature (on by default) to use the `Mock*` types from other crates.
//!
//! ## Error policy
//! - I/O traits return [`crate::error::Result`]. The engine contains each
//!   failure at the smallest unit (one page, one file) and keeps going.
//! - [`ProgressSink`] and [`DownloadQueue`] are fire-and-forget: nothing they
//!   return is consumed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::{automock, predicate::*};

use crate::config::ModuleConfig;
use crate::error::Result;
use crate::model::{Collection, MediaItem};

/// Raw transport for one page of the remote list.
///
/// Returns the response body as text, still wrapped in its callback envelope.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, page_index: u32) -> Result<String>;
}

/// A span of items that a failed page would have covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PageSpan {
    pub page_index: u32,
    pub page_size: u32,
}

/// Display sink for live progress of one run.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ProgressSink: Send + Sync {
    /// The run has started.
    fn print(&self);
    /// The run has finished; nothing else is reported afterwards.
    fn complete(&self);
    /// One-based page currently being requested.
    fn set_index(&self, index: u32);
    fn set_total(&self, total: u64);
    /// `count` more items are being requested.
    fn add_download(&self, count: u32);
    fn add_success(&self, items: &[MediaItem]);
    fn add_failed(&self, span: PageSpan);
}

/// One asset to fetch, handed to the external download queue.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DownloadTask {
    pub url: String,
    /// Directory relative to the output root.
    pub target_dir: String,
    pub filename: String,
    /// Human-readable reference to the item the asset belongs to.
    pub source_ref: String,
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait DownloadQueue: Send + Sync {
    fn enqueue(&self, task: DownloadTask);
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TextWriter: Send + Sync {
    /// Write `content` to `path`, returning the path written.
    async fn write(&self, content: &str, path: &Path) -> Result<PathBuf>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TemplateWriter: Send + Sync {
    /// Render the named template with `data` into `path`.
    async fn render(
        &self,
        template_name: &str,
        data: &serde_json::Value,
        path: &Path,
    ) -> Result<PathBuf>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TreeFolder: Send + Sync {
    /// Create `path` and its parents if missing.
    async fn ensure(&self, path: &Path) -> Result<()>;
}

/// Persists "last backup" state once a run has fully exported.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BackupMarker: Send + Sync {
    async fn record(&self, module: &ModuleConfig, collection: &[MediaItem]) -> Result<()>;
}

/// Storage of the previous run's merged collection.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// The previous snapshot; empty when none exists or it cannot be read.
    async fn load(&self, module: &ModuleConfig) -> Collection;
    async fn save(&self, module: &ModuleConfig, collection: &[MediaItem]) -> Result<()>;
}
